use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};

/// Characters left unescaped inside a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Fill `{name}` placeholders in a resource path template.
///
/// Values are percent-encoded as single path segments. Placeholders without a
/// matching variable are left in place so the caller can detect them.
///
/// ```rust
/// use serde_json::{Map, json};
/// use settle_util::build_path;
///
/// let mut variables = Map::new();
/// variables.insert("datacenter".into(), json!("dc 1"));
/// variables.insert("share".into(), json!(42));
/// let path = build_path("/datacenters/{datacenter}/shares/{share}", &variables);
/// assert_eq!(path, "/datacenters/dc%201/shares/42");
/// ```
pub fn build_path(template: &str, variables: &Map<String, Value>) -> String {
    let mut path = template.to_string();
    for (key, value) in variables {
        let raw = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let encoded = utf8_percent_encode(&raw, SEGMENT).to_string();
        path = path.replace(&format!("{{{key}}}"), &encoded);
    }
    path
}

/// Names of placeholders still present in a path.
pub fn unresolved_placeholders(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        if !name.is_empty() {
            names.push(name);
        }
        rest = &rest[open + close + 1..];
    }
    names
}
