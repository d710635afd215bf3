//! Row-level encode/decode.
//!
//! Entity rows carry the identity, primitive fields, and flattened embedded
//! values of one entity. Junction rows reify one collection element each,
//! alongside the owning key and any ordering/key column. Decoding is guided
//! by the analyzed shape rather than by splitting column names, so field
//! names containing underscores cannot mis-nest.

use serde_json::Value as JsonValue;

use crate::analyzer::{CollectionField, CollectionKind, ElementKind, EntityNode, ValueNode};
use crate::core::{ScalarType, StoreError, StoreResult};
use crate::schema::{MAP_KEY_COLUMN, POSITION_COLUMN, VALUE_COLUMN};

use super::{JsonMap, flatten, join_prefix};

/// Encodes one entity's own row: identity, primitives, flattened values.
/// Owned entities and collections live in their own tables and are not part
/// of this row.
pub fn entity_row(node: &EntityNode, entity: &JsonMap) -> JsonMap {
    let mut row = JsonMap::new();

    if let Some(id) = entity.get(&node.identity.name) {
        row.insert(node.identity.name.clone(), id.clone());
    }

    for primitive in &node.primitives {
        row.insert(
            primitive.name.clone(),
            entity.get(&primitive.name).cloned().unwrap_or(JsonValue::Null),
        );
    }

    for value_field in &node.values {
        if let Some(JsonValue::Object(inner)) = entity.get(&value_field.name) {
            for (column, cell) in flatten(&value_field.name, inner) {
                row.insert(column, cell);
            }
        }
        // absent or null values contribute nothing; their columns stay NULL
    }

    row
}

/// Inverse of [`entity_row`] over a decoded row map.
pub fn decode_entity_row(node: &EntityNode, row: &JsonMap) -> JsonMap {
    let mut entity = JsonMap::new();

    entity.insert(
        node.identity.name.clone(),
        row.get(&node.identity.name).cloned().unwrap_or(JsonValue::Null),
    );

    for primitive in &node.primitives {
        entity.insert(
            primitive.name.clone(),
            row.get(&primitive.name).cloned().unwrap_or(JsonValue::Null),
        );
    }

    for value_field in &node.values {
        entity.insert(
            value_field.name.clone(),
            decode_value_columns(&value_field.name, &value_field.node, row),
        );
    }

    entity
}

/// Rebuilds one embedded value from its prefixed columns. A value whose
/// columns are all NULL decodes to `null`, which is how an absent optional
/// value comes back.
pub fn decode_value_columns(prefix: &str, node: &ValueNode, row: &JsonMap) -> JsonValue {
    let mut map = JsonMap::new();
    let mut all_null = true;

    for primitive in &node.primitives {
        let cell = row
            .get(&join_prefix(prefix, &primitive.name))
            .cloned()
            .unwrap_or(JsonValue::Null);
        if !cell.is_null() {
            all_null = false;
        }
        map.insert(primitive.name.clone(), cell);
    }

    for value_field in &node.values {
        let inner = decode_value_columns(
            &join_prefix(prefix, &value_field.name),
            &value_field.node,
            row,
        );
        if !inner.is_null() {
            all_null = false;
        }
        map.insert(value_field.name.clone(), inner);
    }

    if all_null && !map.is_empty() {
        JsonValue::Null
    } else {
        JsonValue::Object(map)
    }
}

/// Encodes a collection field into junction/element rows. Lists emit an
/// ascending `position`, maps a typed `map_key`, sets neither. A `null`
/// collection encodes as no rows.
pub fn collection_rows(
    field: &CollectionField,
    fk_column: &str,
    parent_id: &JsonValue,
    items: &JsonValue,
) -> StoreResult<Vec<JsonMap>> {
    match field.descriptor.kind {
        CollectionKind::List | CollectionKind::Set => {
            let elements = match items {
                JsonValue::Null => return Ok(Vec::new()),
                JsonValue::Array(elements) => elements,
                other => {
                    return Err(StoreError::Serialization(format!(
                        "collection field '{}' must serialize to an array, got {}",
                        field.name,
                        json_kind(other)
                    )));
                }
            };

            let mut rows = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let mut row = JsonMap::new();
                row.insert(fk_column.to_string(), parent_id.clone());
                if field.descriptor.kind == CollectionKind::List {
                    row.insert(POSITION_COLUMN.to_string(), JsonValue::from(index as i64));
                }
                element_into_row(field, element, &mut row)?;
                rows.push(row);
            }
            Ok(rows)
        }
        CollectionKind::Map => {
            let entries = match items {
                JsonValue::Null => return Ok(Vec::new()),
                JsonValue::Object(entries) => entries,
                other => {
                    return Err(StoreError::Serialization(format!(
                        "map field '{}' must serialize to an object, got {}",
                        field.name,
                        json_kind(other)
                    )));
                }
            };

            let key_type = field.descriptor.key_type.unwrap_or(ScalarType::String);
            let mut rows = Vec::with_capacity(entries.len());
            for (key, element) in entries {
                let mut row = JsonMap::new();
                row.insert(fk_column.to_string(), parent_id.clone());
                row.insert(MAP_KEY_COLUMN.to_string(), map_key_to_json(&field.name, key, key_type)?);
                element_into_row(field, element, &mut row)?;
                rows.push(row);
            }
            Ok(rows)
        }
    }
}

/// Decodes junction/element rows back into the collection's map
/// representation: an array for lists and sets, an object for maps.
pub fn collection_from_rows(
    field: &CollectionField,
    rows: &[JsonMap],
) -> StoreResult<JsonValue> {
    match field.descriptor.kind {
        CollectionKind::List | CollectionKind::Set => {
            let mut elements = Vec::with_capacity(rows.len());
            for row in rows {
                elements.push(element_from_row(field, row)?);
            }
            Ok(JsonValue::Array(elements))
        }
        CollectionKind::Map => {
            let mut entries = JsonMap::new();
            for row in rows {
                let key = row.get(MAP_KEY_COLUMN).cloned().unwrap_or(JsonValue::Null);
                entries.insert(json_key_to_string(&key), element_from_row(field, row)?);
            }
            Ok(JsonValue::Object(entries))
        }
    }
}

fn element_into_row(
    field: &CollectionField,
    element: &JsonValue,
    row: &mut JsonMap,
) -> StoreResult<()> {
    match &field.descriptor.element_kind {
        ElementKind::Primitive(_) => {
            row.insert(VALUE_COLUMN.to_string(), element.clone());
            Ok(())
        }
        ElementKind::Value(_) => {
            let inner = element.as_object().ok_or_else(|| element_shape_error(field, element))?;
            for (column, cell) in flatten("", inner) {
                row.insert(column, cell);
            }
            Ok(())
        }
        ElementKind::Entity(_) => {
            let node = entity_element(field)?;
            let inner = element.as_object().ok_or_else(|| element_shape_error(field, element))?;
            for (column, cell) in entity_row(node, inner) {
                row.insert(column, cell);
            }
            Ok(())
        }
    }
}

fn element_from_row(field: &CollectionField, row: &JsonMap) -> StoreResult<JsonValue> {
    match &field.descriptor.element_kind {
        ElementKind::Primitive(_) => Ok(row.get(VALUE_COLUMN).cloned().unwrap_or(JsonValue::Null)),
        ElementKind::Value(_) => {
            let node = field
                .value_element
                .as_ref()
                .ok_or_else(|| missing_shape(field))?;
            let decoded = decode_value_columns("", node, row);
            // an element row always represents a present element
            Ok(match decoded {
                JsonValue::Null => JsonValue::Object(JsonMap::new()),
                other => other,
            })
        }
        ElementKind::Entity(_) => {
            let node = entity_element(field)?;
            Ok(JsonValue::Object(decode_entity_row(node, row)))
        }
    }
}

fn entity_element(field: &CollectionField) -> StoreResult<&EntityNode> {
    field
        .entity_element
        .as_deref()
        .ok_or_else(|| missing_shape(field))
}

fn missing_shape(field: &CollectionField) -> StoreError {
    StoreError::Serialization(format!(
        "collection field '{}' has no analyzed element shape",
        field.name
    ))
}

fn element_shape_error(field: &CollectionField, element: &JsonValue) -> StoreError {
    StoreError::Serialization(format!(
        "element of collection field '{}' must serialize to an object, got {}",
        field.name,
        json_kind(element)
    ))
}

pub(crate) fn map_key_to_json(field: &str, key: &str, key_type: ScalarType) -> StoreResult<JsonValue> {
    match key_type {
        ScalarType::Int => key.parse::<i64>().map(JsonValue::from).map_err(|_| {
            StoreError::Serialization(format!(
                "map key '{}' of field '{}' is not an integer",
                key, field
            ))
        }),
        ScalarType::Double => key.parse::<f64>().map(JsonValue::from).map_err(|_| {
            StoreError::Serialization(format!(
                "map key '{}' of field '{}' is not a number",
                key, field
            ))
        }),
        ScalarType::Bool => match key {
            "true" => Ok(JsonValue::Bool(true)),
            "false" => Ok(JsonValue::Bool(false)),
            _ => Err(StoreError::Serialization(format!(
                "map key '{}' of field '{}' is not a boolean",
                key, field
            ))),
        },
        ScalarType::String | ScalarType::DateTime | ScalarType::Uuid => {
            Ok(JsonValue::String(key.to_string()))
        }
    }
}

fn json_key_to_string(key: &JsonValue) -> String {
    match key {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CollectionDescriptor;
    use crate::analyzer::PrimitiveField;
    use serde_json::json;

    fn money_node() -> ValueNode {
        ValueNode {
            type_name: "Money".to_string(),
            primitives: vec![
                PrimitiveField {
                    name: "amount".to_string(),
                    scalar: ScalarType::Double,
                    nullable: false,
                },
                PrimitiveField {
                    name: "currency".to_string(),
                    scalar: ScalarType::String,
                    nullable: false,
                },
            ],
            values: Vec::new(),
        }
    }

    fn tags_field() -> CollectionField {
        CollectionField {
            name: "tags".to_string(),
            descriptor: CollectionDescriptor {
                kind: CollectionKind::Set,
                element_kind: ElementKind::Primitive(ScalarType::String),
                key_type: None,
            },
            value_element: None,
            entity_element: None,
        }
    }

    #[test]
    fn test_primitive_set_rows() {
        let field = tags_field();
        let rows =
            collection_rows(&field, "order_id", &json!("o-1"), &json!(["a", "b"])).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("order_id"), Some(&json!("o-1")));
        assert_eq!(rows[0].get("value"), Some(&json!("a")));
        assert!(!rows[0].contains_key("position"));

        let back = collection_from_rows(&field, &rows).unwrap();
        assert_eq!(back, json!(["a", "b"]));
    }

    #[test]
    fn test_list_rows_carry_position() {
        let mut field = tags_field();
        field.descriptor.kind = CollectionKind::List;

        let rows =
            collection_rows(&field, "order_id", &json!("o-1"), &json!(["x", "y", "z"])).unwrap();
        let positions: Vec<_> = rows
            .iter()
            .map(|row| row.get("position").cloned().unwrap())
            .collect();
        assert_eq!(positions, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_map_of_values_rows() {
        let field = CollectionField {
            name: "prices".to_string(),
            descriptor: CollectionDescriptor {
                kind: CollectionKind::Map,
                element_kind: ElementKind::Value("Money".to_string()),
                key_type: Some(ScalarType::String),
            },
            value_element: Some(money_node()),
            entity_element: None,
        };

        let items = json!({ "retail": { "amount": 10.0, "currency": "USD" } });
        let rows = collection_rows(&field, "product_id", &json!("p-1"), &items).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("map_key"), Some(&json!("retail")));
        assert_eq!(rows[0].get("amount"), Some(&json!(10.0)));
        assert_eq!(rows[0].get("currency"), Some(&json!("USD")));

        let back = collection_from_rows(&field, &rows).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_integer_map_keys_are_typed() {
        let field = CollectionField {
            name: "slots".to_string(),
            descriptor: CollectionDescriptor {
                kind: CollectionKind::Map,
                element_kind: ElementKind::Primitive(ScalarType::String),
                key_type: Some(ScalarType::Int),
            },
            value_element: None,
            entity_element: None,
        };

        let rows =
            collection_rows(&field, "day_id", &json!("d-1"), &json!({ "3": "open" })).unwrap();
        assert_eq!(rows[0].get("map_key"), Some(&json!(3)));

        let back = collection_from_rows(&field, &rows).unwrap();
        assert_eq!(back, json!({ "3": "open" }));
    }

    #[test]
    fn test_null_collection_is_empty() {
        let rows =
            collection_rows(&tags_field(), "order_id", &json!("o-1"), &JsonValue::Null).unwrap();
        assert!(rows.is_empty());
    }
}
