//! Domain record ↔ graph element conversion.
//!
//! Records go through their serde JSON form. Declared property types drive
//! the coercions at both ends: temporal text is validated and canonicalized,
//! `Json` properties are stored as JSON text, and numeric or textual values
//! returned by the server are coerced back to the declared type.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::element::value::{parse_date, parse_date_time, parse_time};
use crate::element::{
    ElementId, GraphElement, IdType, Value, CLASSNAME_PROPERTY, GRAPH_PROPERTY,
};
use crate::error::{MapperError, Result};
use crate::result::{json_type, JsonMap};
use crate::schema::{
    EndpointRef, EndpointSchema, EntityKind, EntitySchema, GraphEntity, PropertyType,
    SchemaRegistry,
};

/// Serde-backed converter between domain records and graph elements.
#[derive(Clone)]
pub struct MappingConverter {
    registry: Arc<SchemaRegistry>,
}

impl MappingConverter {
    /// Converter resolving graph members through `registry`.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Converts a record into an element shaped by `schema`.
    pub fn write<T: GraphEntity>(&self, entity: &T, schema: &EntitySchema) -> Result<GraphElement> {
        let json = serde_json::to_value(entity)
            .map_err(|err| MapperError::conversion(schema.type_name(), err))?;
        self.write_json(&json, schema)
    }

    /// Converts the JSON form of a record into an element.
    pub fn write_json(&self, json: &JsonValue, schema: &EntitySchema) -> Result<GraphElement> {
        let JsonValue::Object(fields) = json else {
            return Err(MapperError::conversion(
                schema.type_name(),
                format!("expected a record, found {}", json_type(json)),
            ));
        };
        let mut element = GraphElement::from_schema(schema);
        let id_name = schema.id_field().name.as_str();
        if let Some(raw) = fields.get(id_name).filter(|raw| !raw.is_null()) {
            element.set_id(write_id(schema.type_name(), raw)?)?;
        }
        match schema.kind() {
            EntityKind::Vertex => {
                self.write_properties(fields, schema, &mut element, &[id_name])?;
            }
            EntityKind::Edge => {
                let (from, to) = edge_endpoints(schema)?;
                let from_id = write_endpoint(schema, from, fields.get(&from.field))?;
                let to_id = write_endpoint(schema, to, fields.get(&to.field))?;
                element.set_endpoints(from_id, to_id)?;
                self.write_properties(
                    fields,
                    schema,
                    &mut element,
                    &[id_name, from.field.as_str(), to.field.as_str()],
                )?;
            }
            EntityKind::Graph => {
                for field in [schema.vertex_set(), schema.edge_set()].into_iter().flatten() {
                    for item in member_items(schema, fields.get(field))? {
                        element.push_member(self.write_member(item, schema)?)?;
                    }
                }
            }
        }
        Ok(element)
    }

    fn write_properties(
        &self,
        fields: &JsonMap,
        schema: &EntitySchema,
        element: &mut GraphElement,
        skip: &[&str],
    ) -> Result<()> {
        for (key, raw) in fields {
            if raw.is_null() || skip.contains(&key.as_str()) {
                continue;
            }
            element.set_property(key.clone(), write_value(key, raw, schema.property_type(key))?);
        }
        element.set_property(CLASSNAME_PROPERTY, schema.type_name());
        Ok(())
    }

    fn write_member(&self, item: &JsonValue, graph: &EntitySchema) -> Result<GraphElement> {
        let (tag, inner) = match item {
            JsonValue::Object(tagged) if tagged.len() == 1 => {
                tagged.iter().next().ok_or_else(|| {
                    MapperError::conversion(graph.type_name(), "empty graph member")
                })?
            }
            other => {
                return Err(MapperError::conversion(
                    graph.type_name(),
                    format!(
                        "graph members must be externally tagged records, found {}",
                        json_type(other)
                    ),
                ))
            }
        };
        let schema = self.member_schema(graph, tag)?;
        let mut member = self.write_json(inner, &schema)?;
        member.set_property(GRAPH_PROPERTY, graph.label());
        Ok(member)
    }

    fn member_schema(&self, graph: &EntitySchema, type_name: &str) -> Result<Arc<EntitySchema>> {
        graph
            .members()
            .iter()
            .find(|member| member.type_name() == type_name)
            .cloned()
            .or_else(|| self.registry.get(type_name))
            .ok_or_else(|| {
                MapperError::conversion(
                    graph.type_name(),
                    format!("'{type_name}' is not a registered graph member"),
                )
            })
    }

    /// Converts an element into the JSON form of a record of `schema`.
    ///
    /// Edge endpoints declared as nested vertices are left `null`; they are
    /// resolved by the caller, except inside graphs where the member vertex
    /// is at hand.
    pub fn to_json_object(&self, element: &GraphElement, schema: &EntitySchema) -> Result<JsonMap> {
        let mut object = JsonMap::new();
        if schema.has_id_field() {
            let id = match element.id() {
                Some(id) => read_id(schema.type_name(), id, schema.id_field().id_type)?,
                None => JsonValue::Null,
            };
            object.insert(schema.id_field().name.clone(), id);
        }
        match schema.kind() {
            EntityKind::Vertex | EntityKind::Edge => {
                for (key, value) in element.properties() {
                    if key == CLASSNAME_PROPERTY || key == GRAPH_PROPERTY {
                        continue;
                    }
                    object.insert(key.clone(), read_value(key, value, schema.property_type(key))?);
                }
                if schema.kind() == EntityKind::Edge {
                    let (from, to) = edge_endpoints(schema)?;
                    let (from_id, to_id) = element.endpoints().unwrap_or((None, None));
                    for (endpoint, id) in [(from, from_id), (to, to_id)] {
                        let value = match (&endpoint.target, id) {
                            (EndpointRef::Id(id_type), Some(id)) => {
                                read_id(schema.type_name(), id, *id_type)?
                            }
                            _ => JsonValue::Null,
                        };
                        object.insert(endpoint.field.clone(), value);
                    }
                }
            }
            EntityKind::Graph => {
                let vertices = element
                    .vertices()
                    .iter()
                    .map(|vertex| self.tagged_member(vertex, element, schema))
                    .collect::<Result<Vec<_>>>()?;
                let edges = element
                    .edges()
                    .iter()
                    .map(|edge| self.tagged_member(edge, element, schema))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(field) = schema.vertex_set() {
                    object.insert(field.to_owned(), JsonValue::Array(vertices));
                }
                if let Some(field) = schema.edge_set() {
                    object.insert(field.to_owned(), JsonValue::Array(edges));
                }
            }
        }
        Ok(object)
    }

    fn tagged_member(
        &self,
        member: &GraphElement,
        graph: &GraphElement,
        graph_schema: &EntitySchema,
    ) -> Result<JsonValue> {
        let schema = self.member_schema(graph_schema, member.type_name())?;
        let mut object = self.to_json_object(member, &schema)?;
        if let (Some((from, to)), Some((from_id, to_id))) = (schema.endpoints(), member.endpoints()) {
            for (endpoint, id) in [(from, from_id), (to, to_id)] {
                let EndpointRef::Vertex(vertex_schema) = &endpoint.target else {
                    continue;
                };
                let vertex = id.and_then(|id| graph.vertices().iter().find(|v| v.id() == Some(id)));
                let value = match vertex {
                    Some(vertex) => JsonValue::Object(self.to_json_object(vertex, vertex_schema)?),
                    None => JsonValue::Null,
                };
                object.insert(endpoint.field.clone(), value);
            }
        }
        let mut tagged = JsonMap::new();
        tagged.insert(schema.type_name().to_owned(), JsonValue::Object(object));
        Ok(JsonValue::Object(tagged))
    }

    /// Deserializes a record from its JSON form.
    pub fn finish<T: DeserializeOwned>(&self, object: JsonMap, schema: &EntitySchema) -> Result<T> {
        serde_json::from_value(JsonValue::Object(object))
            .map_err(|err| MapperError::conversion(schema.type_name(), err))
    }

    /// Converts an element straight into a record.
    pub fn read<T: GraphEntity>(&self, element: &GraphElement, schema: &EntitySchema) -> Result<T> {
        let object = self.to_json_object(element, schema)?;
        self.finish(object, schema)
    }
}

/// Deserializes a raw query value, coercing between text and scalars when
/// the direct conversion fails.
pub fn convert_to_type<R: DeserializeOwned>(value: JsonValue) -> Result<R> {
    let first_error = match serde_json::from_value::<R>(value.clone()) {
        Ok(converted) => return Ok(converted),
        Err(err) => err,
    };
    let fallback = match &value {
        JsonValue::String(text) => serde_json::from_str::<JsonValue>(text.trim()).ok(),
        JsonValue::Number(_) | JsonValue::Bool(_) => Some(JsonValue::String(value.to_string())),
        _ => None,
    };
    fallback
        .and_then(|candidate| serde_json::from_value::<R>(candidate).ok())
        .ok_or_else(|| MapperError::conversion(std::any::type_name::<R>(), first_error))
}

fn edge_endpoints(schema: &EntitySchema) -> Result<(&EndpointSchema, &EndpointSchema)> {
    schema.endpoints().ok_or_else(|| {
        MapperError::ConfigurationError(format!(
            "edge '{}' has no from/to fields",
            schema.type_name()
        ))
    })
}

fn write_id(type_name: &str, raw: &JsonValue) -> Result<ElementId> {
    match raw {
        JsonValue::String(s) => Ok(ElementId::String(s.clone())),
        JsonValue::Number(n) if n.is_i64() => Ok(ElementId::Long(n.as_i64().unwrap_or_default())),
        other => Err(MapperError::InvalidIdType {
            type_name: type_name.to_owned(),
            found: json_type(other).to_owned(),
        }),
    }
}

fn write_endpoint(
    schema: &EntitySchema,
    endpoint: &EndpointSchema,
    raw: Option<&JsonValue>,
) -> Result<Option<ElementId>> {
    match (raw, &endpoint.target) {
        (None | Some(JsonValue::Null), _) => Ok(None),
        (Some(JsonValue::Object(vertex)), EndpointRef::Vertex(vertex_schema)) => vertex
            .get(&vertex_schema.id_field().name)
            .filter(|id| !id.is_null())
            .map(|id| write_id(vertex_schema.type_name(), id))
            .transpose(),
        (Some(raw), _) => write_id(schema.type_name(), raw).map(Some),
    }
}

fn member_items<'a>(schema: &EntitySchema, raw: Option<&'a JsonValue>) -> Result<&'a [JsonValue]> {
    match raw {
        None | Some(JsonValue::Null) => Ok(&[]),
        Some(JsonValue::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(MapperError::conversion(
            schema.type_name(),
            format!("graph member sets must be lists, found {}", json_type(other)),
        )),
    }
}

fn read_id(type_name: &str, id: &ElementId, id_type: IdType) -> Result<JsonValue> {
    let invalid = |found: &str| MapperError::InvalidIdType {
        type_name: type_name.to_owned(),
        found: found.to_owned(),
    };
    match (id_type, id) {
        (IdType::String, id) => Ok(JsonValue::String(id.to_string())),
        (IdType::Long, ElementId::Long(i)) => Ok((*i).into()),
        (IdType::Long, ElementId::String(s)) => s
            .parse::<i64>()
            .map(Into::into)
            .map_err(|_| invalid("non-numeric string")),
        (IdType::Integer, id) => {
            let wide = match id {
                ElementId::Long(i) => *i,
                ElementId::String(s) => s.parse::<i64>().map_err(|_| invalid("non-numeric string"))?,
            };
            i32::try_from(wide)
                .map(Into::into)
                .map_err(|_| invalid("long outside integer range"))
        }
    }
}

fn write_value(key: &str, raw: &JsonValue, ty: Option<PropertyType>) -> Result<Value> {
    let expect_text = || {
        raw.as_str().ok_or_else(|| MapperError::InvalidPropertyValue {
            property: key.to_owned(),
            reason: format!("temporal values must be ISO text, found {}", json_type(raw)),
        })
    };
    match ty {
        Some(PropertyType::LocalDate) => Ok(Value::Date(parse_date(key, expect_text()?)?)),
        Some(PropertyType::LocalTime) => Ok(Value::Time(parse_time(key, expect_text()?)?)),
        Some(PropertyType::LocalDateTime) => {
            Ok(Value::DateTime(parse_date_time(key, expect_text()?)?))
        }
        Some(PropertyType::Json) => Ok(Value::String(raw.to_string())),
        Some(PropertyType::Date) => match raw.as_i64() {
            Some(millis) => Ok(Value::Int(millis)),
            None => Err(MapperError::InvalidPropertyValue {
                property: key.to_owned(),
                reason: "dates are stored as epoch milliseconds".into(),
            }),
        },
        _ => Ok(Value::from_json(raw)),
    }
}

fn read_value(key: &str, value: &Value, ty: Option<PropertyType>) -> Result<JsonValue> {
    let coerced = match (ty, value) {
        (_, Value::Null) => Value::Null,
        (Some(PropertyType::Json), Value::String(text)) => {
            return serde_json::from_str(text).map_err(|err| MapperError::InvalidPropertyValue {
                property: key.to_owned(),
                reason: format!("stored JSON does not parse: {err}"),
            })
        }
        (Some(PropertyType::LocalDate), Value::String(text)) => Value::Date(parse_date(key, text)?),
        (Some(PropertyType::LocalTime), Value::String(text)) => Value::Time(parse_time(key, text)?),
        (Some(PropertyType::LocalDateTime), Value::String(text)) => {
            Value::DateTime(parse_date_time(key, text)?)
        }
        (Some(PropertyType::Integer | PropertyType::Long | PropertyType::Date), Value::Float(f))
            if f.fract() == 0.0 =>
        {
            Value::Int(*f as i64)
        }
        (Some(PropertyType::Integer | PropertyType::Long), Value::String(text)) => {
            match text.trim().parse::<i64>() {
                Ok(parsed) => Value::Int(parsed),
                Err(_) => value.clone(),
            }
        }
        (Some(PropertyType::Double), Value::String(text)) => match text.trim().parse::<f64>() {
            Ok(parsed) => Value::Float(parsed),
            Err(_) => value.clone(),
        },
        (Some(PropertyType::Boolean), Value::String(text)) => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        (Some(PropertyType::String), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            Value::String(value.to_text().unwrap_or_default())
        }
        _ => value.clone(),
    };
    Ok(coerced.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: Option<String>,
        name: String,
        age: i32,
        born: String,
        tags: Vec<String>,
    }

    impl GraphEntity for Person {
        fn schema() -> EntitySchema {
            EntitySchema::vertex("Person")
                .label("person")
                .generated_id("id", IdType::String)
                .property("age", PropertyType::Integer)
                .property("born", PropertyType::LocalDate)
                .property("tags", PropertyType::Json)
                .build()
        }
    }

    fn converter() -> MappingConverter {
        MappingConverter::new(Arc::new(SchemaRegistry::new()))
    }

    fn ann() -> Person {
        Person {
            id: None,
            name: "Ann".into(),
            age: 34,
            born: "1990-04-02".into(),
            tags: vec!["ops".into(), "rust".into()],
        }
    }

    #[test]
    fn write_types_declared_properties() {
        let element = converter().write(&ann(), &Person::schema()).expect("write");
        assert!(element.id().is_none());
        assert_eq!(element.property("age"), Some(&Value::Int(34)));
        assert_eq!(
            element.property("born"),
            Some(&Value::Date(time::macros::date!(1990 - 04 - 02)))
        );
        assert_eq!(element.property("tags"), Some(&Value::from("[\"ops\",\"rust\"]")));
        assert_eq!(element.property(CLASSNAME_PROPERTY), Some(&Value::from("Person")));
    }

    #[test]
    fn read_restores_the_record_with_its_id() {
        let converter = converter();
        let schema = Person::schema();
        let mut element = converter.write(&ann(), &schema).expect("write");
        element.set_id(ElementId::Long(4112)).expect("id");
        let person: Person = converter.read(&element, &schema).expect("read");
        assert_eq!(person, Person { id: Some("4112".into()), ..ann() });
    }

    #[test]
    fn unsupported_ids_and_bad_temporal_text_fail() {
        let schema = Person::schema();
        let err = converter()
            .write_json(&json!({"id": 1.5, "name": "x"}), &schema)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidIdType");

        let err = converter()
            .write_json(&json!({"name": "x", "born": "yesterday"}), &schema)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPropertyValue");
    }

    #[test]
    fn integer_ids_must_fit() {
        let err = read_id("T", &ElementId::Long(i64::MAX), IdType::Integer).unwrap_err();
        assert_eq!(err.code(), "InvalidIdType");
        assert_eq!(read_id("T", &ElementId::from("12"), IdType::Long).expect("long"), json!(12));
    }

    #[test]
    fn raw_values_coerce_between_text_and_numbers() {
        let n: i64 = convert_to_type(json!("42")).expect("text to number");
        assert_eq!(n, 42);
        let s: String = convert_to_type(json!(7)).expect("number to text");
        assert_eq!(s, "7");
        let b: bool = convert_to_type(json!("true")).expect("text to bool");
        assert!(b);
        assert!(convert_to_type::<i64>(json!({"a": 1})).is_err());
    }
}
