//! Placeholder substitution (§4.6): the templating primitive shared by the
//! HTTP, file, condition, database, and LLM executors. Replaces literal
//! `{k}` in string leaves with the stringified value of the input
//! mapping's field `k`, recursing through mappings and sequences.

use wireflow_types::{Value, ValueMap};

/// Substitute `{k}` placeholders in every string leaf of `value`, recursing
/// through arrays and objects. `input` supplies the replacement fields;
/// keys with no match in `input` are left untouched.
pub fn substitute(value: &Value, input: &ValueMap) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, input)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute(item, input)).collect())
        }
        Value::Object(map) => {
            let mut out = ValueMap::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, input));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Substitute `{k}` placeholders directly in a string.
pub fn substitute_str(template: &str, input: &ValueMap) -> String {
    let mut out = template.to_string();
    for (key, value) in input {
        let needle = format!("{{{key}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &value.stringify());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ValueMap {
        let mut m = ValueMap::new();
        m.insert("name".to_string(), Value::String("ada".to_string()));
        m.insert("count".to_string(), Value::Integer(3));
        m
    }

    #[test]
    fn replaces_known_keys_and_leaves_unknown_alone() {
        let out = substitute_str("hello {name}, you have {count}, and {missing}", &input());
        assert_eq!(out, "hello ada, you have 3, and {missing}");
    }

    #[test]
    fn recurses_through_arrays_and_objects() {
        let mut nested = ValueMap::new();
        nested.insert("greeting".to_string(), Value::String("hi {name}".to_string()));
        let value = Value::Array(vec![Value::Object(nested)]);
        let result = substitute(&value, &input());
        let Value::Array(items) = &result else { panic!("expected array") };
        let Value::Object(obj) = &items[0] else { panic!("expected object") };
        assert_eq!(obj.get("greeting"), Some(&Value::String("hi ada".to_string())));
    }

    #[test]
    fn idempotent_when_no_placeholder_keys_present() {
        let plain = "no templated fields here".to_string();
        let once = substitute_str(&plain, &input());
        let twice = substitute_str(&once, &input());
        assert_eq!(once, twice);
        assert_eq!(once, plain);
    }
}
