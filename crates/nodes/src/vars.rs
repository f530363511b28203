//! Dotted/bracket path resolution against the state bag.
//!
//! Path syntax: `$.seg1.seg2[idx].seg3`. Resolution never fails — a missing
//! intermediate, a malformed path, or an out-of-range index all yield `None`
//! ("undefined"), which callers map to whatever null-ish behaviour their
//! contract requires.

use serde_json::{Map, Value};

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parse `$.a.b[0].c` into segments. Returns `None` for malformed paths.
fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let rest = path.strip_prefix('$')?;
    let mut segments = Vec::new();
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i == start {
                    return None;
                }
                segments.push(Segment::Key(chars[start..i].iter().collect()));
            }
            '[' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i == start || i >= chars.len() || chars[i] != ']' {
                    return None;
                }
                let idx: usize = chars[start..i].iter().collect::<String>().parse().ok()?;
                segments.push(Segment::Index(idx));
                i += 1;
            }
            _ => return None,
        }
    }

    Some(segments)
}

/// Resolve a `$.path` expression against `scope`.
///
/// Returns `None` when the path is malformed or any step is missing.
/// The pseudo-key `length` resolves on arrays and strings when no real
/// `"length"` key shadows it, so `$.data.results.length` works the way
/// workflow authors expect.
pub fn resolve_variable(path: &str, scope: &Value) -> Option<Value> {
    let segments = parse_path(path)?;
    let mut current = scope;

    for (pos, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Index(idx) => {
                current = current.get(idx)?;
            }
            Segment::Key(key) => {
                if let Some(next) = current.get(key.as_str()) {
                    current = next;
                } else if key == "length" && pos + 1 == segments.len() {
                    return match current {
                        Value::Array(items) => Some(Value::from(items.len())),
                        Value::String(s) => Some(Value::from(s.chars().count())),
                        _ => None,
                    };
                } else {
                    return None;
                }
            }
        }
    }

    Some(current.clone())
}

/// Build the extended lookup scope: the state bag's own keys plus the run's
/// external input layered under the synthetic `input` key.
pub fn scope_with_input(state: &Value, initial_data: &Value) -> Value {
    let mut scope: Map<String, Value> = match state {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    scope.insert("input".to_string(), initial_data.clone());
    Value::Object(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_keys() {
        let scope = json!({ "data": { "user": { "name": "ada" } } });
        assert_eq!(
            resolve_variable("$.data.user.name", &scope),
            Some(json!("ada"))
        );
    }

    #[test]
    fn resolves_array_indices() {
        let scope = json!({ "items": [{ "id": 7 }, { "id": 8 }] });
        assert_eq!(resolve_variable("$.items[1].id", &scope), Some(json!(8)));
        assert_eq!(resolve_variable("$.items[2].id", &scope), None);
    }

    #[test]
    fn missing_intermediate_is_undefined() {
        let scope = json!({ "a": 1 });
        assert_eq!(resolve_variable("$.b.c", &scope), None);
        assert_eq!(resolve_variable("$.a.b", &scope), None);
    }

    #[test]
    fn malformed_paths_are_undefined() {
        let scope = json!({ "a": 1 });
        assert_eq!(resolve_variable("data.a", &scope), None);
        assert_eq!(resolve_variable("$.a[", &scope), None);
        assert_eq!(resolve_variable("$..a", &scope), None);
    }

    #[test]
    fn length_pseudo_key_on_arrays_and_strings() {
        let scope = json!({ "results": [1, 2, 3], "name": "ada", "n": 5 });
        assert_eq!(resolve_variable("$.results.length", &scope), Some(json!(3)));
        assert_eq!(resolve_variable("$.name.length", &scope), Some(json!(3)));
        assert_eq!(resolve_variable("$.n.length", &scope), None);
    }

    #[test]
    fn real_length_key_shadows_pseudo_key() {
        let scope = json!({ "obj": { "length": "custom" } });
        assert_eq!(
            resolve_variable("$.obj.length", &scope),
            Some(json!("custom"))
        );
    }

    #[test]
    fn bare_root_resolves_to_scope() {
        let scope = json!({ "a": 1 });
        assert_eq!(resolve_variable("$", &scope), Some(scope));
    }

    #[test]
    fn scope_layers_input_under_synthetic_key() {
        let state = json!({ "x": 1 });
        let scope = scope_with_input(&state, &json!({ "y": 2 }));
        assert_eq!(resolve_variable("$.x", &scope), Some(json!(1)));
        assert_eq!(resolve_variable("$.input.y", &scope), Some(json!(2)));
    }
}
