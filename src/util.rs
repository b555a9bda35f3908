use serde_json::Value;

/// Merges `b` into `a`, extending arrays and recursing into objects. Used
/// to fold the pages of a continued query into one response-shaped value.
pub fn merge_values(a: &mut Value, b: Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge_values(a.entry(k).or_insert(Value::Null), v);
            }
        }
        (Value::Array(a), Value::Array(b)) => a.extend(b),
        (a, b) => *a = b,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::merge_values;

    #[test]
    fn objects_recurse_and_arrays_extend() {
        let mut a = json!({
            "query": {"pages": [{"pageid": 1}], "normalized": [{"from": "a", "to": "A"}]}
        });
        merge_values(
            &mut a,
            json!({"query": {"pages": [{"pageid": 2}]}, "batchcomplete": true}),
        );
        assert_eq!(
            a,
            json!({
                "query": {
                    "pages": [{"pageid": 1}, {"pageid": 2}],
                    "normalized": [{"from": "a", "to": "A"}]
                },
                "batchcomplete": true
            })
        );
    }

    #[test]
    fn scalars_take_the_newer_value() {
        let mut a = json!({"continue": {"rvcontinue": "x"}});
        merge_values(&mut a, json!({"continue": {"rvcontinue": "y"}}));
        assert_eq!(a, json!({"continue": {"rvcontinue": "y"}}));
    }
}
