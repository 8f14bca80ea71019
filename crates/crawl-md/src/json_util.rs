//! Shared JSON helpers used by the exchange adapters.
//!
//! Adapters keep payloads as `serde_json::Value`; these helpers cover the
//! lookups every decoder repeats and turn misses into [`DecodeError`]s.

use crawl_core::error::DecodeError;
use serde_json::Value;

/// Parse a frame or REST body. Text control frames (`"pong"`) are handled by
/// the caller before this.
#[inline]
pub fn parse(bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Required string field.
#[inline]
pub fn str_field<'a>(v: &'a Value, key: &'static str) -> Result<&'a str, DecodeError> {
    v.get(key).and_then(Value::as_str).ok_or(DecodeError::MissingField(key))
}

/// Required array field.
#[inline]
pub fn array_field<'a>(v: &'a Value, key: &'static str) -> Result<&'a Vec<Value>, DecodeError> {
    v.get(key).and_then(Value::as_array).ok_or(DecodeError::MissingField(key))
}

/// String or number field as text (`"123"` and `123` both give `"123"`).
pub fn text_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `v` with `extra` merged in, when `v` is an object. Used to keep envelope
/// fields (e.g. snapshot/delta markers) on per-record payloads.
pub fn with_field(v: &Value, key: &str, extra: Value) -> Value {
    let mut out = v.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.insert(key.to_string(), extra);
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_lookups() {
        let v = json!({"s": "BTCUSDT", "n": 42, "a": [1, 2]});
        assert_eq!(str_field(&v, "s").unwrap(), "BTCUSDT");
        assert!(matches!(str_field(&v, "x"), Err(DecodeError::MissingField("x"))));
        assert_eq!(array_field(&v, "a").unwrap().len(), 2);
        assert_eq!(text_field(&v, "n").as_deref(), Some("42"));
        assert_eq!(text_field(&v, "s").as_deref(), Some("BTCUSDT"));
        assert_eq!(text_field(&v, "a"), None);
    }

    #[test]
    fn merge_field() {
        let v = with_field(&json!({"b": []}), "action", json!("snapshot"));
        assert_eq!(v, json!({"b": [], "action": "snapshot"}));
        assert_eq!(with_field(&json!([1]), "k", json!(1)), json!([1]));
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(parse(b"{"), Err(DecodeError::Json(_))));
    }
}
