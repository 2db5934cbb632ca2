//! Dotted-path resolution over serialized task JSON
//!
//! Route conditions and rule attribute predicates address values inside a
//! task/message by paths like `messages[-1].parts[0].content`. Resolution is
//! total: an out-of-range index or missing key yields `None`, never an error.

use serde_json::Value;

/// Resolve a dotted path against a JSON value.
///
/// Supports object keys separated by `.` and bracket indices on arrays,
/// including negative (from-the-end) indices.
///
/// # Examples
/// ```
/// use agentmesh::orchestrator::path::resolve_path;
/// use serde_json::json;
///
/// let v = json!({"messages": [{"content": "a"}, {"content": "b"}]});
/// assert_eq!(
///     resolve_path(&v, "messages[-1].content"),
///     Some(&json!("b"))
/// );
/// assert_eq!(resolve_path(&v, "messages[5].content"), None);
/// ```
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        let (key, indices) = parse_segment(segment)?;
        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }
        for idx in indices {
            current = index_array(current, idx)?;
        }
    }
    Some(current)
}

/// Split a segment like `parts[0][1]` into its key and bracket indices.
/// Returns `None` for malformed brackets.
fn parse_segment(segment: &str) -> Option<(&str, Vec<i64>)> {
    let bracket = match segment.find('[') {
        Some(pos) => pos,
        None => return Some((segment, Vec::new())),
    };

    let key = &segment[..bracket];
    let mut indices = Vec::new();
    let mut rest = &segment[bracket..];

    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return None;
        }
        let close = rest.find(']')?;
        let idx: i64 = rest[1..close].trim().parse().ok()?;
        indices.push(idx);
        rest = &rest[close + 1..];
    }

    Some((key, indices))
}

fn index_array(value: &Value, idx: i64) -> Option<&Value> {
    let arr = value.as_array()?;
    let len = arr.len() as i64;
    let effective = if idx < 0 { len + idx } else { idx };
    if effective < 0 || effective >= len {
        return None;
    }
    arr.get(effective as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_json() -> Value {
        json!({
            "id": "t-1",
            "state": "completed",
            "messages": [
                {"role": "user", "parts": [{"type": "text", "content": "question"}]},
                {"role": "agent", "parts": [{"type": "text", "content": "research the topic"}]}
            ]
        })
    }

    #[test]
    fn test_simple_key() {
        let v = task_json();
        assert_eq!(resolve_path(&v, "state"), Some(&json!("completed")));
    }

    #[test]
    fn test_negative_index_resolves_last_message() {
        let v = task_json();
        assert_eq!(
            resolve_path(&v, "messages[-1].parts[0].content"),
            Some(&json!("research the topic"))
        );
    }

    #[test]
    fn test_positive_index() {
        let v = task_json();
        assert_eq!(
            resolve_path(&v, "messages[0].role"),
            Some(&json!("user"))
        );
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        let v = task_json();
        assert_eq!(resolve_path(&v, "messages[7].role"), None);
        assert_eq!(resolve_path(&v, "messages[-3].role"), None);
    }

    #[test]
    fn test_missing_key_is_none() {
        let v = task_json();
        assert_eq!(resolve_path(&v, "nope.deeper"), None);
        assert_eq!(resolve_path(&v, "messages[0].missing"), None);
    }

    #[test]
    fn test_index_into_non_array_is_none() {
        let v = task_json();
        assert_eq!(resolve_path(&v, "state[0]"), None);
    }

    #[test]
    fn test_chained_brackets() {
        let v = json!({"grid": [[1, 2], [3, 4]]});
        assert_eq!(resolve_path(&v, "grid[1][0]"), Some(&json!(3)));
        assert_eq!(resolve_path(&v, "grid[-1][-1]"), Some(&json!(4)));
    }

    #[test]
    fn test_malformed_path_is_none() {
        let v = task_json();
        assert_eq!(resolve_path(&v, "messages[abc].role"), None);
        assert_eq!(resolve_path(&v, "messages[0.role"), None);
        assert_eq!(resolve_path(&v, ""), None);
        assert_eq!(resolve_path(&v, "messages..role"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Resolution is total: arbitrary path strings never panic.
            #[test]
            fn resolve_never_panics(path in "[a-z\\[\\]0-9.\\-]{0,40}") {
                let v = task_json();
                let _ = resolve_path(&v, &path);
            }

            // Negative indices agree with len+idx for in-range offsets.
            #[test]
            fn negative_index_matches_positive(len in 1usize..8, back in 1usize..8) {
                prop_assume!(back <= len);
                let arr: Vec<Value> = (0..len).map(|i| json!(i)).collect();
                let v = json!({ "xs": arr });
                let neg = resolve_path(&v, &format!("xs[-{back}]"));
                let pos = resolve_path(&v, &format!("xs[{}]", len - back));
                prop_assert_eq!(neg, pos);
            }
        }
    }
}
