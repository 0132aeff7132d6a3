use serde_json::Value;

/// Reads a dotted path out of a semi-structured event tree.
///
/// Segments index objects by key and arrays by base-10 non-negative integer.
/// Any failed step (missing key, non-numeric index against an array, indexing
/// into a scalar or null) resolves to `None`. A trailing `null` value is
/// returned as-is so callers can distinguish "present but null" from absent.
pub fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
