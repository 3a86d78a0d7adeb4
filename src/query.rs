//! Filter/sort/pagination arguments parsed from the query string.
//!
//! Every column is an optional equality filter (AND semantics). `skip` and
//! `take` page the result after filtering; `sort_by` names a column with an
//! optional `:asc`/`:desc` suffix. Unknown sort fields are rejected; unknown
//! filter keys are ignored, matching the source binder.

use crate::case::to_snake_case;
use crate::error::AppError;
use crate::schema::EntityDescriptor;
use serde_json::Value;

pub const DEFAULT_TAKE: u32 = 100;
pub const MAX_TAKE: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ListArgs {
    /// (column, value) equality filters, column names already snake_case.
    pub filters: Vec<(String, Value)>,
    pub skip: u32,
    pub take: u32,
    /// Validated sort column; None means order by primary key.
    pub sort: Option<(String, SortDirection)>,
}

impl Default for ListArgs {
    fn default() -> Self {
        ListArgs {
            filters: Vec::new(),
            skip: 0,
            take: DEFAULT_TAKE,
            sort: None,
        }
    }
}

impl ListArgs {
    /// Parse from query-string pairs for one entity. Pairs may repeat; the
    /// last occurrence of skip/take/sort_by wins.
    pub fn from_pairs(
        entity: &EntityDescriptor,
        pairs: &[(String, String)],
    ) -> Result<Self, AppError> {
        let mut args = ListArgs::default();
        for (k, v) in pairs {
            match to_snake_case(k).as_str() {
                "skip" => {
                    args.skip = v
                        .parse()
                        .map_err(|_| AppError::InvalidQuery("skip must be a non-negative integer".into()))?;
                }
                "take" => {
                    let take: u32 = v
                        .parse()
                        .map_err(|_| AppError::InvalidQuery("take must be a positive integer".into()))?;
                    if take == 0 {
                        return Err(AppError::InvalidQuery("take must be a positive integer".into()));
                    }
                    args.take = take.min(MAX_TAKE);
                }
                "sort_by" => {
                    args.sort = Some(parse_sort(entity, v)?);
                }
                col => {
                    if entity.has_column(col) {
                        args.filters.push((col.to_string(), Value::String(v.clone())));
                    }
                }
            }
        }
        Ok(args)
    }

    /// Same args with an extra mandatory filter (used to pre-filter related
    /// rows by the owner's FK).
    pub fn with_filter(mut self, column: &str, value: Value) -> Self {
        self.filters.push((column.to_string(), value));
        self
    }
}

fn parse_sort(entity: &EntityDescriptor, raw: &str) -> Result<(String, SortDirection), AppError> {
    let (field, dir) = match raw.split_once(':') {
        Some((f, "asc")) => (f, SortDirection::Asc),
        Some((f, "desc")) => (f, SortDirection::Desc),
        Some((_, other)) => {
            return Err(AppError::InvalidQuery(format!(
                "sort direction must be asc or desc, got '{}'",
                other
            )))
        }
        None => (raw, SortDirection::Asc),
    };
    let column = to_snake_case(field);
    if !entity.has_column(&column) {
        return Err(AppError::InvalidQuery(format!("unknown sort field '{}'", field)));
    }
    Ok((column, dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::social_model;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_query_is_empty() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let args = ListArgs::from_pairs(tweets, &[]).unwrap();
        assert!(args.filters.is_empty());
        assert_eq!(args.skip, 0);
        assert_eq!(args.take, DEFAULT_TAKE);
        assert!(args.sort.is_none());
    }

    #[test]
    fn camel_case_filters_map_to_columns() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let args = ListArgs::from_pairs(
            tweets,
            &pairs(&[("userId", "u1"), ("content", "hi"), ("bogus", "x")]),
        )
        .unwrap();
        assert_eq!(args.filters.len(), 2);
        assert_eq!(args.filters[0].0, "user_id");
        assert_eq!(args.filters[1].0, "content");
    }

    #[test]
    fn sort_accepts_direction_suffix() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let args =
            ListArgs::from_pairs(tweets, &pairs(&[("sortBy", "createdAt:desc")])).unwrap();
        assert_eq!(args.sort, Some(("created_at".to_string(), SortDirection::Desc)));
    }

    #[test]
    fn unknown_sort_field_is_invalid_query() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let err = ListArgs::from_pairs(tweets, &pairs(&[("sort_by", "popularity")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery(_)));
    }

    #[test]
    fn take_is_capped_and_zero_is_rejected() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        let args = ListArgs::from_pairs(users, &pairs(&[("take", "5000")])).unwrap();
        assert_eq!(args.take, MAX_TAKE);
        let err = ListArgs::from_pairs(users, &pairs(&[("take", "0")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery(_)));
    }

    #[test]
    fn bad_skip_is_invalid_query() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        let err = ListArgs::from_pairs(users, &pairs(&[("skip", "-1")])).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery(_)));
    }
}
