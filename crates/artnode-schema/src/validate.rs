//! Structural checks of documents against a schema.

use serde_json::{Map, Value};

use crate::diagnostic::Diagnostic;
use crate::document::type_name;
use crate::schema::{FieldType, Schema};

/// Check every schema field of `document`, collecting all violations.
///
/// `null` counts as absent. Fields the schema doesn't declare are ignored.
pub(crate) fn check_document(
    path: &str,
    schema: &Schema,
    document: &Map<String, Value>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (name, spec) in schema.fields() {
        match document.get(name) {
            None | Some(Value::Null) => {
                if spec.required {
                    diagnostics.push(Diagnostic::structural(
                        path,
                        "field.required",
                        format!("missing required field '{name}'"),
                    ));
                }
            }
            Some(value) => check_value(path, name, &spec.ty, value, &mut diagnostics),
        }
    }
    diagnostics
}

fn check_value(
    path: &str,
    at: &str,
    ty: &FieldType,
    value: &Value,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let ok = match ty {
        FieldType::Any => true,
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Enum(values) => value
            .as_str()
            .is_some_and(|v| values.iter().any(|allowed| allowed == v)),
        FieldType::Reference => value.as_str().is_some_and(|v| !v.trim().is_empty()),
        FieldType::Mapping => value.is_object(),
        FieldType::List(item) => {
            if let Some(items) = value.as_array() {
                for (i, element) in items.iter().enumerate() {
                    check_value(path, &format!("{at}[{i}]"), item, element, diagnostics);
                }
                true
            } else {
                false
            }
        }
        FieldType::Blocks => {
            if value.is_array() {
                check_blocks(path, at, value, diagnostics);
                true
            } else {
                false
            }
        }
    };

    if !ok {
        diagnostics.push(Diagnostic::structural(
            path,
            "field.type",
            format!(
                "'{at}' must be {}, found {}",
                ty.describe(),
                describe_value(value)
            ),
        ));
    }
}

/// Check a block array: every block is a mapping with a non-empty string
/// `type`. Nested `blocks` arrays are checked the same way. Block contents
/// are otherwise opaque.
fn check_blocks(path: &str, at: &str, value: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(blocks) = value.as_array() else {
        diagnostics.push(Diagnostic::structural(
            path,
            "block.type",
            format!("'{at}' must be a list of blocks, found {}", type_name(value)),
        ));
        return;
    };

    for (i, block) in blocks.iter().enumerate() {
        let here = format!("{at}[{i}]");
        let Some(fields) = block.as_object() else {
            diagnostics.push(Diagnostic::structural(
                path,
                "block.type",
                format!("'{here}' must be a mapping, found {}", type_name(block)),
            ));
            continue;
        };

        let has_type = fields
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.trim().is_empty());
        if !has_type {
            diagnostics.push(Diagnostic::structural(
                path,
                "block.type",
                format!("'{here}' has no string 'type'"),
            ));
        }

        if let Some(nested) = fields.get("blocks") {
            check_blocks(path, &format!("{here}.blocks"), nested, diagnostics);
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => type_name(other).to_owned(),
    }
}
