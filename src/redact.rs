use std::collections::BTreeSet;

use serde_json::Value;

use crate::record::Fields;

/// Marker written in place of a masked value.
pub const MASK: &str = "***";

/// Masks configured top-level keys of a data payload.
///
/// Only top-level keys are matched. A sensitive key nested inside another
/// mapping is left as-is unless the enclosing key is itself configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redactor {
    fields: BTreeSet<String>,
}

impl Redactor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Redactor {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Return a copy of `data` with every configured key replaced by
    /// [`MASK`]. `data` itself is left untouched.
    pub fn mask(&self, data: &Fields) -> Fields {
        data.iter()
            .map(|(key, value)| {
                let value = if self.fields.contains(key) {
                    Value::String(MASK.to_string())
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn masks_configured_keys_only() {
        let redactor = Redactor::new(["password", "credit_card_number"]);
        let data = fields(json!({
            "password": "secret",
            "credit_card_number": "1234-5678-9876-5432",
            "x": 1
        }));

        let masked = redactor.mask(&data);

        assert_eq!(masked["password"], json!(MASK));
        assert_eq!(masked["credit_card_number"], json!(MASK));
        assert_eq!(masked["x"], json!(1));
        assert_eq!(data["password"], json!("secret"));
    }

    #[test]
    fn nested_keys_are_not_searched() {
        let redactor = Redactor::new(["password"]);
        let data = fields(json!({ "user": { "password": "hunter2" } }));

        let masked = redactor.mask(&data);

        assert_eq!(masked["user"]["password"], json!("hunter2"));
    }

    #[test]
    fn empty_redactor_is_identity() {
        let data = fields(json!({ "User": { "id": 12345 }, "Operation": "Data Processing" }));
        assert_eq!(Redactor::default().mask(&data), data);
    }
}
