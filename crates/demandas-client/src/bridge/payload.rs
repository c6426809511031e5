use serde::Serialize;
use serde_json::Value;

use super::BridgeError;

/// Parameter names the bridge itself writes on every call.
pub const RESERVED_PARAMS: [&str; 2] = ["action", "callback"];

/// How a call's arguments travel to the backend.
///
/// Call sites disagree on the encoding: some send the whole payload as one
/// JSON-encoded parameter, others send each field as its own parameter. Each
/// action keeps the encoding it was written against.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    /// Serialized into the single payload parameter (`dados` unless configured).
    Json(Value),
    /// One parameter per field, in insertion order.
    Flattened(Vec<(String, String)>),
}

impl Payload {
    pub fn json<T>(value: &T) -> Result<Self, BridgeError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|error| BridgeError::Encode(error.to_string()))
    }

    /// Flattens a JSON object: strings as-is, numbers and bools in display form,
    /// nested arrays and objects as compact JSON, nulls dropped.
    pub fn flattened<T>(value: &T) -> Result<Self, BridgeError>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(value).map_err(|error| BridgeError::Encode(error.to_string()))?;
        let Value::Object(map) = value else {
            return Err(BridgeError::Encode(
                "flattened payload must be a JSON object".to_string(),
            ));
        };

        let mut fields = Vec::with_capacity(map.len());
        for (key, value) in map {
            check_field_name(&key)?;
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                nested => nested.to_string(),
            };
            fields.push((key, text));
        }
        Ok(Self::Flattened(fields))
    }

    pub(crate) fn into_fields(self, payload_param: &str) -> Result<Vec<(String, String)>, BridgeError> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Json(value) => {
                let encoded = serde_json::to_string(&value)
                    .map_err(|error| BridgeError::Encode(error.to_string()))?;
                Ok(vec![(payload_param.to_string(), encoded)])
            }
            Self::Flattened(fields) => {
                for (key, _) in &fields {
                    check_field_name(key)?;
                }
                Ok(fields)
            }
        }
    }
}

fn check_field_name(key: &str) -> Result<(), BridgeError> {
    if RESERVED_PARAMS.contains(&key) {
        return Err(BridgeError::Encode(format!(
            "`{key}` is reserved by the bridge"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flattening_stringifies_scalars_and_nests_json() {
        let payload = Payload::flattened(&json!({
            "id": 42,
            "ativo": true,
            "titulo": "Reforma",
            "escolas": ["EE Norte", "EE Sul"],
            "observacao": null
        }))
        .expect("flattened");

        assert_eq!(
            payload,
            Payload::Flattened(vec![
                ("id".to_string(), "42".to_string()),
                ("ativo".to_string(), "true".to_string()),
                ("titulo".to_string(), "Reforma".to_string()),
                ("escolas".to_string(), r#"["EE Norte","EE Sul"]"#.to_string()),
            ])
        );
    }

    #[test]
    fn flattening_rejects_reserved_names() {
        let error = Payload::flattened(&json!({"callback": "x"})).expect_err("reserved");
        assert!(matches!(error, BridgeError::Encode(_)));
    }

    #[test]
    fn hand_built_fields_cannot_override_control_parameters() {
        let payload = Payload::Flattened(vec![
            ("id".to_string(), "1".to_string()),
            ("action".to_string(), "login".to_string()),
        ]);
        assert!(matches!(
            payload.into_fields("dados"),
            Err(BridgeError::Encode(_))
        ));
    }

    #[test]
    fn flattening_requires_an_object() {
        assert!(Payload::flattened(&json!([1, 2])).is_err());
    }

    #[test]
    fn json_payload_lands_under_the_configured_parameter() {
        let fields = Payload::json(&json!({"email": "a@b.co"}))
            .expect("json")
            .into_fields("data")
            .expect("fields");
        assert_eq!(
            fields,
            vec![("data".to_string(), r#"{"email":"a@b.co"}"#.to_string())]
        );
    }

    #[test]
    fn empty_payload_has_no_fields() {
        assert!(
            Payload::Empty
                .into_fields("dados")
                .expect("fields")
                .is_empty()
        );
    }
}
