//! Entity routes built over parameterized path segments; handlers resolve the
//! entity (and relation) by name from the model.

use crate::handlers::{
    connect, create, delete as delete_handler, disconnect, list, meta, read, related, replace,
    update,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:entity", get(list).post(create))
        .route("/:entity/meta", post(meta))
        .route(
            "/:entity/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .route(
            "/:entity/:id/:relation",
            get(related)
                .post(connect)
                .patch(replace)
                .delete(disconnect),
        )
        .with_state(state)
}
