//! Store block normalization.
//!
//! Store metadata is validated for shape only; nothing here talks to a
//! payment backend. A block that fails validation yields a disabled
//! descriptor plus a diagnostic, and the node itself stays valid.

use std::sync::LazyLock;

use artnode_schema::{Diagnostic, Features};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").unwrap());
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

/// Kind of goods a store block sells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommerceType {
    Digital,
    Physical,
    Bundle,
}

impl CommerceType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "digital" => Some(Self::Digital),
            "physical" => Some(Self::Physical),
            "bundle" => Some(Self::Bundle),
            _ => None,
        }
    }
}

/// Who operates the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreScope {
    #[default]
    Artist,
    Server,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Price {
    /// Decimal amount with at most two fraction digits, e.g. `"12.50"`.
    pub amount: String,
    /// ISO 4217 code, e.g. `"EUR"`.
    pub currency: String,
}

/// Normalized store metadata of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreDescriptor {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub commerce_type: Option<CommerceType>,
    pub scope: StoreScope,
    pub price: Option<Price>,
    pub product_ref: Option<String>,
    pub price_ref: Option<String>,
}

impl StoreDescriptor {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            commerce_type: None,
            scope: StoreScope::default(),
            price: None,
            product_ref: None,
            price_ref: None,
        }
    }
}

/// Normalize the `store` block of the node at `path`.
///
/// Returns `None` when the node declares no store. `features` are the
/// node's effective feature flags; an explicit `store: false` disables the
/// block without a diagnostic.
pub(crate) fn resolve_store(
    path: &str,
    block: Option<&Value>,
    features: &Features,
) -> (Option<StoreDescriptor>, Vec<Diagnostic>) {
    let Some(block) = block else {
        return (None, Vec::new());
    };
    if features.get("store") == Some(&false) {
        return (Some(StoreDescriptor::disabled()), Vec::new());
    }
    let Some(fields) = block.as_object() else {
        return (
            Some(StoreDescriptor::disabled()),
            vec![invalid(path, "store.invalid", "store must be a mapping")],
        );
    };

    let mut diagnostics = Vec::new();
    let descriptor = parse_block(path, fields, &mut diagnostics);
    if diagnostics.is_empty() {
        (Some(descriptor), diagnostics)
    } else {
        tracing::debug!(path, problems = diagnostics.len(), "Store disabled");
        (Some(StoreDescriptor::disabled()), diagnostics)
    }
}

fn parse_block(
    path: &str,
    fields: &Map<String, Value>,
    diagnostics: &mut Vec<Diagnostic>,
) -> StoreDescriptor {
    let enabled = match fields.get("enabled") {
        None => true,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            diagnostics.push(invalid(path, "store.enabled", "'enabled' must be a boolean"));
            false
        }
    };

    let commerce_type = match fields.get("type") {
        None => None,
        Some(value) => {
            let parsed = value.as_str().and_then(CommerceType::parse);
            if parsed.is_none() {
                diagnostics.push(invalid(
                    path,
                    "store.type",
                    format!("type must be one of digital, physical, bundle; got {value}"),
                ));
            }
            parsed
        }
    };

    let scope = match fields.get("scope").map(|v| v.as_str()) {
        None => StoreScope::Artist,
        Some(Some("artist")) => StoreScope::Artist,
        Some(Some("server")) => StoreScope::Server,
        Some(_) => {
            diagnostics.push(invalid(path, "store.scope", "scope must be artist or server"));
            StoreScope::Artist
        }
    };

    let price = fields
        .get("price")
        .and_then(|value| parse_price(path, value, diagnostics));

    StoreDescriptor {
        enabled,
        commerce_type,
        scope,
        price,
        product_ref: string_field(path, fields, "product_ref", diagnostics),
        price_ref: string_field(path, fields, "price_ref", diagnostics),
    }
}

fn parse_price(path: &str, value: &Value, diagnostics: &mut Vec<Diagnostic>) -> Option<Price> {
    let Some(price) = value.as_object() else {
        diagnostics.push(invalid(path, "store.price", "price must be a mapping"));
        return None;
    };

    let amount = match price.get("amount") {
        Some(Value::String(s)) => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let amount = amount.filter(|amount| AMOUNT_RE.is_match(amount));
    if amount.is_none() {
        diagnostics.push(invalid(
            path,
            "store.amount",
            "price.amount must be a non-negative decimal with at most two fraction digits",
        ));
    }

    let currency = price
        .get("currency")
        .and_then(Value::as_str)
        .filter(|currency| CURRENCY_RE.is_match(currency));
    if currency.is_none() {
        diagnostics.push(invalid(
            path,
            "store.currency",
            "price.currency must be three upper-case letters",
        ));
    }

    Some(Price {
        amount: amount?,
        currency: currency?.to_owned(),
    })
}

fn string_field(
    path: &str,
    fields: &Map<String, Value>,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        _ => {
            diagnostics.push(invalid(
                path,
                "store.field",
                format!("'{name}' must be a string"),
            ));
            None
        }
    }
}

fn invalid(path: &str, rule: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::structural(path, rule, message)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn resolve(block: Value) -> (Option<StoreDescriptor>, Vec<Diagnostic>) {
        resolve_store("store/shirt", Some(&block), &Features::new())
    }

    #[test]
    fn test_valid_block() {
        let (store, diagnostics) = resolve(json!({
            "type": "physical",
            "price": {"amount": "25.00", "currency": "EUR"},
            "product_ref": "prod_1",
        }));

        assert!(diagnostics.is_empty());
        assert_eq!(
            store.unwrap(),
            StoreDescriptor {
                enabled: true,
                commerce_type: Some(CommerceType::Physical),
                scope: StoreScope::Artist,
                price: Some(Price {
                    amount: "25.00".to_owned(),
                    currency: "EUR".to_owned(),
                }),
                product_ref: Some("prod_1".to_owned()),
                price_ref: None,
            }
        );
    }

    #[test]
    fn test_numeric_amount_accepted() {
        let (store, diagnostics) = resolve(json!({"price": {"amount": 7, "currency": "USD"}}));
        assert!(diagnostics.is_empty());
        assert_eq!(store.unwrap().price.unwrap().amount, "7");
    }

    #[test]
    fn test_bad_amount_disables() {
        for amount in [json!("-1"), json!("1.234"), json!("ten"), json!(-3)] {
            let (store, diagnostics) =
                resolve(json!({"price": {"amount": amount, "currency": "EUR"}}));
            let store = store.unwrap();
            assert!(!store.enabled, "{amount}");
            assert_eq!(diagnostics[0].rule, "store.amount");
        }
    }

    #[test]
    fn test_bad_amount_and_currency_both_reported() {
        let (store, diagnostics) = resolve(json!({"price": {"amount": "ten", "currency": "eur"}}));

        assert!(!store.unwrap().enabled);
        let rules: Vec<&str> = diagnostics.iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["store.amount", "store.currency"]);
    }

    #[test]
    fn test_bad_currency_and_type() {
        let (store, diagnostics) = resolve(json!({
            "type": "lease",
            "price": {"amount": "1", "currency": "eur"},
        }));

        assert_eq!(store.unwrap(), StoreDescriptor::disabled());
        let rules: Vec<&str> = diagnostics.iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["store.type", "store.currency"]);
    }

    #[test]
    fn test_feature_disabled_without_diagnostic() {
        let mut features = Features::new();
        features.insert("store".to_owned(), false);

        let (store, diagnostics) =
            resolve_store("store/shirt", Some(&json!({"type": "lease"})), &features);

        assert_eq!(store.unwrap(), StoreDescriptor::disabled());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_absent_block() {
        let (store, diagnostics) = resolve_store("pages/about", None, &Features::new());
        assert!(store.is_none());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_serialized_type_key() {
        let (store, _) = resolve(json!({"type": "bundle", "scope": "server"}));
        let value = serde_json::to_value(store.unwrap()).unwrap();
        assert_eq!(value["type"], json!("bundle"));
        assert_eq!(value["scope"], json!("server"));
    }
}
