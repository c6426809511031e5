//! The one place backend answers are classified.

use serde_json::{Map, Value};

pub const UNKNOWN_FAILURE: &str = "unknown backend failure";

const MESSAGE_FIELDS: [&str; 4] = ["message", "error", "mensagem", "erro"];

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResult {
    /// An object answer passed through whole, or any non-object, non-array value.
    Data(Value),
    /// A bare array, or an object whose `data` field is an array.
    List(Vec<Value>),
    /// The backend reported failure explicitly.
    Failure { message: String },
}

impl RemoteResult {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items),
            Value::Object(mut map) => {
                if reports_failure(&map) {
                    return Self::Failure {
                        message: failure_message(&map),
                    };
                }
                if let Some(Value::Array(items)) = map.get_mut("data") {
                    return Self::List(std::mem::take(items));
                }
                Self::Data(Value::Object(map))
            }
            other => Self::Data(other),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The interesting part of a `Data` answer: its `data` field when present,
    /// otherwise the whole value.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value.get("data").unwrap_or(value)),
            _ => None,
        }
    }

    /// Looks `name` up on the answer object, then inside its `data` object.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        let Self::Data(value) = self else {
            return None;
        };
        value
            .get(name)
            .or_else(|| value.get("data").and_then(|data| data.get(name)))
            .filter(|found| !found.is_null())
    }

    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Items of a list answer, or of an array found under `name` in a data answer.
    #[must_use]
    pub fn into_items(self, name: &str) -> Option<Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            Self::Data(mut value) => {
                if let Some(Value::Array(items)) = value.get_mut(name) {
                    return Some(std::mem::take(items));
                }
                match value.get_mut("data").and_then(|data| data.get_mut(name)) {
                    Some(Value::Array(items)) => Some(std::mem::take(items)),
                    _ => None,
                }
            }
            Self::Failure { .. } => None,
        }
    }
}

fn reports_failure(map: &Map<String, Value>) -> bool {
    let success_false = match map.get("success") {
        Some(Value::Bool(flag)) => !flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("false"),
        _ => false,
    };
    let status_error = map
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .is_some_and(|status| {
            status.eq_ignore_ascii_case("error") || status.eq_ignore_ascii_case("erro")
        });
    success_false || status_error
}

fn failure_message(map: &Map<String, Value>) -> String {
    MESSAGE_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::Null | Value::String(_) => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| UNKNOWN_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_array_is_a_list() {
        assert_eq!(
            RemoteResult::from_value(json!([{"id": 1}])),
            RemoteResult::List(vec![json!({"id": 1})])
        );
    }

    #[test]
    fn object_with_array_data_is_a_list() {
        assert_eq!(
            RemoteResult::from_value(json!({"success": true, "data": [1, 2]})),
            RemoteResult::List(vec![json!(1), json!(2)])
        );
    }

    #[test]
    fn success_object_passes_through() {
        let value = json!({"success": true, "data": {"id": "7"}, "message": "ok"});
        let result = RemoteResult::from_value(value.clone());
        assert_eq!(result, RemoteResult::Data(value));
        assert_eq!(result.payload(), Some(&json!({"id": "7"})));
        assert_eq!(result.str_field("id"), Some("7"));
        assert_eq!(result.str_field("message"), Some("ok"));
    }

    #[test]
    fn scalar_is_wrapped_as_data() {
        assert_eq!(
            RemoteResult::from_value(json!("salvo")),
            RemoteResult::Data(json!("salvo"))
        );
        assert_eq!(
            RemoteResult::from_value(Value::Null),
            RemoteResult::Data(Value::Null)
        );
    }

    #[test]
    fn explicit_failure_carries_the_first_message_field() {
        assert_eq!(
            RemoteResult::from_value(json!({"success": false, "erro": "Senha inválida"})),
            RemoteResult::Failure {
                message: "Senha inválida".to_string()
            }
        );
        assert_eq!(
            RemoteResult::from_value(json!({"success": "false", "message": "x", "error": "y"})),
            RemoteResult::Failure {
                message: "x".to_string()
            }
        );
        assert_eq!(
            RemoteResult::from_value(json!({"status": "error", "error": {"message": "quota"}})),
            RemoteResult::Failure {
                message: "quota".to_string()
            }
        );
    }

    #[test]
    fn failure_without_message_uses_placeholder() {
        assert_eq!(
            RemoteResult::from_value(json!({"success": false})).failure_message(),
            Some(UNKNOWN_FAILURE)
        );
    }

    #[test]
    fn items_can_live_under_a_named_field() {
        let result = RemoteResult::from_value(json!({"success": true, "demandas": [{"id": 1}]}));
        assert_eq!(result.into_items("demandas"), Some(vec![json!({"id": 1})]));

        let nested =
            RemoteResult::from_value(json!({"data": {"demandas": [{"id": 2}]}}));
        assert_eq!(nested.into_items("demandas"), Some(vec![json!({"id": 2})]));
    }
}
