use serde_json::Value;

/// One branch of a choice state.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Condition,
    pub next: String,
}

impl Branch {
    pub fn bool_equals(path: impl Into<String>, expected: bool, next: impl Into<String>) -> Self {
        Branch {
            condition: Condition::BooleanEquals {
                path: path.into(),
                expected,
            },
            next: next.into(),
        }
    }

    pub fn string_equals(
        path: impl Into<String>,
        expected: impl Into<String>,
        next: impl Into<String>,
    ) -> Self {
        Branch {
            condition: Condition::StringEquals {
                path: path.into(),
                expected: expected.into(),
            },
            next: next.into(),
        }
    }

    pub fn number_equals(path: impl Into<String>, expected: f64, next: impl Into<String>) -> Self {
        Branch {
            condition: Condition::NumberEquals {
                path: path.into(),
                expected,
            },
            next: next.into(),
        }
    }
}

/// Predicate over the payload, addressed by a `$.field.subfield` path.
/// A missing or differently-typed field never matches.
#[derive(Debug, Clone)]
pub enum Condition {
    BooleanEquals { path: String, expected: bool },
    StringEquals { path: String, expected: String },
    NumberEquals { path: String, expected: f64 },
}

impl Condition {
    pub fn matches(&self, payload: &Value) -> bool {
        match self {
            Condition::BooleanEquals { path, expected } => {
                lookup(payload, path).and_then(Value::as_bool) == Some(*expected)
            }
            Condition::StringEquals { path, expected } => {
                lookup(payload, path).and_then(Value::as_str) == Some(expected.as_str())
            }
            Condition::NumberEquals { path, expected } => {
                lookup(payload, path).and_then(Value::as_f64) == Some(*expected)
            }
        }
    }
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.")?;

    path.split('.')
        .try_fold(payload, |value, segment| value.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_nested_paths() {
        let payload = json!({ "detail": { "status": "COMPLETE" } });
        let condition = Condition::StringEquals {
            path: "$.detail.status".to_string(),
            expected: "COMPLETE".to_string(),
        };

        assert!(condition.matches(&payload));
    }

    #[test]
    fn missing_field_never_matches() {
        let payload = json!({ "enableSns": true });

        let absent = Condition::BooleanEquals {
            path: "$.enableSqs".to_string(),
            expected: false,
        };
        assert!(!absent.matches(&payload));
    }

    #[test]
    fn type_mismatch_never_matches() {
        let payload = json!({ "encodingProfile": "1080" });
        let condition = Condition::NumberEquals {
            path: "$.encodingProfile".to_string(),
            expected: 1080.0,
        };

        assert!(!condition.matches(&payload));
    }
}
