//! Parsed YAML documents and validated payloads.

use serde_json::{Map, Value};

/// Parse a YAML document into a JSON object.
///
/// Empty documents parse to an empty object. The top level must be a mapping.
///
/// # Errors
///
/// Returns a human-readable message if the YAML is malformed or the top
/// level is not a mapping.
pub fn parse_document(content: &str) -> Result<Map<String, Value>, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    let value: Value =
        serde_yaml::from_str(trimmed).map_err(|e| format!("Invalid YAML: {e}"))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(format!(
            "document must be a mapping, found {}",
            type_name(&other)
        )),
    }
}

/// Name of a JSON value's type for diagnostics.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// A validated index document.
///
/// Holds every field of the document, known or not. Known fields have been
/// type-checked against the node kind's schema; unknown fields pass through.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    fields: Map<String, Value>,
}

impl Payload {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String field, if present and a string.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Non-empty string list field. Non-string items are skipped.
    #[must_use]
    pub fn str_list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    /// Explicit sibling order.
    #[must_use]
    pub fn order(&self) -> Option<i64> {
        self.fields.get("order").and_then(Value::as_i64)
    }

    /// Content blocks, empty when absent.
    #[must_use]
    pub fn blocks(&self) -> &[Value] {
        self.fields
            .get("content")
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Attach a pass-through field after validation.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_empty_document() {
        assert!(parse_document("").unwrap().is_empty());
        assert!(parse_document("  \n").unwrap().is_empty());
        assert!(parse_document("~").unwrap().is_empty());
    }

    #[test]
    fn test_parse_mapping() {
        let doc = parse_document("title: Zol\norder: 2\ntags: [a, b]").unwrap();
        assert_eq!(doc["title"], "Zol");
        assert_eq!(doc["order"], 2);
        assert_eq!(doc["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        let err = parse_document("- a\n- b").unwrap_err();
        assert!(err.contains("mapping"), "{err}");
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let err = parse_document("title: [unclosed").unwrap_err();
        assert!(err.starts_with("Invalid YAML"), "{err}");
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::new(
            parse_document(
                "title: Void\norder: 3\ngenres: [ambient, 7, drone]\ncontent:\n  - type: hero",
            )
            .unwrap(),
        );
        assert_eq!(payload.title(), Some("Void"));
        assert_eq!(payload.order(), Some(3));
        assert_eq!(payload.str_list("genres"), vec!["ambient", "drone"]);
        assert_eq!(payload.blocks().len(), 1);
        assert!(Payload::default().blocks().is_empty());
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(&json!(1)), "integer");
        assert_eq!(type_name(&json!(1.5)), "number");
        assert_eq!(type_name(&json!({})), "mapping");
    }
}
