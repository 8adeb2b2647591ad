//! Field projection
//!
//! CDMI clients may ask for a subset of an entity with a query string such
//! as `objectID;metadata;children:0-4`. Only the named top-level fields are
//! returned, and `children:lo-hi` narrows the child listing to an inclusive
//! index range.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Apply a projection query to a serialized entity
pub fn filter_fields(json: &Value, query: &str) -> Result<Value> {
    let Value::Object(object) = json else {
        return Ok(json.clone());
    };
    let fields: Vec<&str> = query.split(';').filter(|f| !f.is_empty()).collect();

    let mut filtered: Map<String, Value> = object
        .iter()
        .filter(|(name, _)| fields.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let range = fields.iter().find_map(|f| f.strip_prefix("children:"));
    if let (Some(range), Some(children)) = (range, object.get("children").and_then(Value::as_array))
    {
        filtered.insert("children".to_string(), Value::Array(select(children, range)?));
    }

    Ok(Value::Object(filtered))
}

fn select(children: &[Value], range: &str) -> Result<Vec<Value>> {
    let parse = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| Error::Malformed(format!("invalid children range: {}", range)))
    };

    let (start, stop) = match range.split_once('-') {
        Some((start, stop)) => (parse(start)?, parse(stop)?),
        None => {
            let index = parse(range)?;
            (index, index)
        }
    };

    if stop >= children.len() {
        debug!(range = %range, len = children.len(), "Requested children range out of bounds");
    }
    Ok(children
        .iter()
        .enumerate()
        .filter(|(i, _)| *i >= start && *i <= stop)
        .map(|(_, child)| child.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn capability() -> Value {
        json!({
            "objectType": "application/cdmi-capability",
            "objectID": "ID",
            "objectName": "newProfile",
            "parentURI": "/cdmi_capabilities",
            "metadata": {},
            "children": ["a", "b", "c", "d"],
            "childrenrange": "0-3"
        })
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(filter_fields(&capability(), "").unwrap(), json!({}));
    }

    #[test]
    fn test_selected_fields() {
        let filtered = filter_fields(&capability(), "objectID;metadata;objectName").unwrap();
        assert_eq!(
            filtered,
            json!({"objectID": "ID", "metadata": {}, "objectName": "newProfile"})
        );

        // Field names are case sensitive
        assert_eq!(filter_fields(&capability(), "objectId").unwrap(), json!({}));
    }

    #[test]
    fn test_children_range() {
        let filtered = filter_fields(&capability(), "children:1-2").unwrap();
        assert_eq!(filtered, json!({"children": ["b", "c"]}));

        let filtered = filter_fields(&capability(), "objectName;children:3").unwrap();
        assert_eq!(filtered, json!({"objectName": "newProfile", "children": ["d"]}));

        // Indexes past the end are dropped
        let filtered = filter_fields(&capability(), "children:2-10").unwrap();
        assert_eq!(filtered, json!({"children": ["c", "d"]}));

        let filtered = filter_fields(&capability(), "children").unwrap();
        assert_eq!(filtered["children"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_bad_range() {
        assert_matches!(
            filter_fields(&capability(), "children:x-2"),
            Err(Error::Malformed(_))
        );
        // Without a child listing the range is not evaluated
        assert_eq!(
            filter_fields(&json!({"value": "v"}), "children:x").unwrap(),
            json!({})
        );
    }
}
