//! Request validation from the descriptor's per-column rules.

use crate::error::AppError;
use crate::schema::ValidationRule;
use serde_json::Value;
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body against per-column rules. Required fields must
    /// be present and non-null. Keys are snake_case column names.
    pub fn validate(
        body: &HashMap<String, Value>,
        rules: &HashMap<&'static str, ValidationRule>,
    ) -> Result<(), AppError> {
        for (col, rule) in rules {
            let val = body.get(*col);
            if rule.required && (val.is_none() || val == Some(&Value::Null)) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PATCH). Required is not
    /// enforced for missing fields.
    pub fn validate_partial(
        body: &HashMap<String, Value>,
        rules: &HashMap<&'static str, ValidationRule>,
    ) -> Result<(), AppError> {
        for (col, v) in body {
            if let Some(rule) = rules.get(col.as_str()) {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.len() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(format) = rule.format {
        validate_format(col, v, format)?;
    }
    Ok(())
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    if format == "email" {
        if let Some(s) = v.as_str() {
            if !s.contains('@') || s.len() < 3 {
                return Err(AppError::Validation(format!("{} must be a valid email", col)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::social_model;
    use serde_json::json;

    fn body(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn create_enforces_required_fields() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        let err = RequestValidator::validate(
            &body(&[("username", json!("alice"))]),
            &users.validation,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        RequestValidator::validate(
            &body(&[
                ("username", json!("alice")),
                ("password", json!("secret")),
                ("roles", json!("user")),
            ]),
            &users.validation,
        )
        .unwrap();
    }

    #[test]
    fn patch_skips_required_but_checks_present_fields() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        RequestValidator::validate_partial(&body(&[]), &tweets.validation).unwrap();
        let long = "x".repeat(1001);
        let err = RequestValidator::validate_partial(
            &body(&[("content", json!(long))]),
            &tweets.validation,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn email_format_is_checked() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        let err = RequestValidator::validate_partial(
            &body(&[("email", json!("not-an-email"))]),
            &users.validation,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
