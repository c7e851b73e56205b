use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Types that can be requested as OpenAI structured output.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Strict-mode `json_schema` for this type: every object closed, every
    /// property required, nested types inlined.
    fn openai_schema() -> Value {
        let Ok(Value::Object(mut root)) = serde_json::to_value(schema_for!(Self)) else {
            return Value::Object(Map::new());
        };
        root.remove("$schema");
        let definitions = root.remove("definitions").unwrap_or(Value::Null);

        let mut value = Value::Object(root);
        strict(&mut value, &definitions);
        value
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// One pass over the schema tree. A `$ref` is replaced by its definition
/// before the replacement itself is visited.
fn strict(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|path| path.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name));
            if let Some(def) = target {
                *value = def.clone();
                return strict(value, definitions);
            }

            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".into(), Value::Bool(false));
                let keys = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(keys) = keys {
                    map.insert("required".into(), Value::Array(keys));
                }
            }
            map.values_mut().for_each(|v| strict(v, definitions));
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strict(v, definitions)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Item {
        title: String,
        date: Option<String>,
        score: u8,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Reply {
        score: u8,
        explanation: String,
        #[serde(default)]
        items: Vec<Item>,
    }

    #[test]
    fn nullable_and_defaulted_fields_are_required() {
        let schema = Reply::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required.len(), 3);
        assert!(required.contains(&"items"));

        let item = &schema["properties"]["items"]["items"];
        let item_required = item["required"].as_array().unwrap();
        assert!(item_required.contains(&Value::String("date".into())));
    }

    #[test]
    fn nested_items_are_inlined_and_closed() {
        let schema = Reply::openai_schema();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));

        let item = &schema["properties"]["items"]["items"];
        assert!(item.get("$ref").is_none());
        assert_eq!(item["type"], Value::String("object".into()));
        assert_eq!(item["additionalProperties"], Value::Bool(false));
    }
}
