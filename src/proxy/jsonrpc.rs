use serde_json::{json, Value};

pub const VERSION: &str = "2.0";

/// Error code for a request the proxy could not forward upstream.
pub const ERROR_UPSTREAM_SEND: i64 = -32001;

/// A request carries a method and an id; notifications have no id.
pub fn is_request(message: &Value) -> bool {
    message.get("method").is_some() && message.get("id").is_some()
}

/// A response carries an id but no method.
pub fn is_response(message: &Value) -> bool {
    message.get("method").is_none()
        && message.get("id").is_some()
        && (message.get("result").is_some() || message.get("error").is_some())
}

pub fn message_id(message: &Value) -> Option<&Value> {
    message.get("id")
}

pub fn message_method(message: &Value) -> Option<&str> {
    message.get("method").and_then(Value::as_str)
}

/// Canonical map key for a request id. String and numeric ids live in
/// distinct key spaces so `"1"` and `1` never collide.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => format!("s:{s}"),
        other => format!("n:{other}"),
    }
}

pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": VERSION,
        "method": method,
    })
}

pub fn error_response(id: Value, code: i64, message: &str, data: Value) -> Value {
    json!({
        "jsonrpc": VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message,
            "data": data,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classification() {
        let req = request(1, "tools/list", json!({}));
        assert!(is_request(&req));
        assert!(!is_response(&req));

        let notif = notification("notifications/initialized");
        assert!(!is_request(&notif));
        assert!(!is_response(&notif));

        let resp = json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        assert!(is_response(&resp));
        assert!(!is_request(&resp));

        let err = error_response(json!(2), ERROR_UPSTREAM_SEND, "boom", Value::Null);
        assert!(is_response(&err));
        assert_eq!(err["error"]["code"], ERROR_UPSTREAM_SEND);
    }

    #[test]
    fn test_id_key_distinguishes_types() {
        assert_ne!(id_key(&json!(1)), id_key(&json!("1")));
        assert_eq!(id_key(&json!(7)), id_key(&json!(7)));
    }
}
