use super::types::{FieldViolation, LlmError};

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(format!("JSON error: {err}"))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LlmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = wire_field_name(&field);
                errs.iter()
                    .map(|e| FieldViolation {
                        field: field.clone(),
                        message: e
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string()),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        Self::ValidationError(violations)
    }
}

/// Request fields are camelCase on the wire.
fn wire_field_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_camel_cased() {
        assert_eq!(wire_field_name("session_id"), "sessionId");
        assert_eq!(wire_field_name("message"), "message");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: LlmError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, LlmError::ParseError(_)));
    }
}
