//! Wire result normalization.
//!
//! Servers answer element lookups in one of two shapes: a structured map
//! (`id`, `label`, `type`, `properties`, plus `inV`/`outV` for edges) or a
//! typed, detached element handle. [`ResultReader`] accepts both and fills a
//! [`GraphElement`]; anything else is a [`MapperError::UnexpectedResultShape`].

use serde_json::{json, Map, Value as JsonValue};

use crate::element::{ElementId, GraphElement, Value, CLASSNAME_PROPERTY};
use crate::error::{MapperError, Result};
use crate::schema::SchemaRegistry;

/// JSON object as decoded from the wire.
pub type JsonMap = Map<String, JsonValue>;

const KEY_ID: &str = "id";
const KEY_LABEL: &str = "label";
const KEY_TYPE: &str = "type";
const KEY_PROPERTIES: &str = "properties";
const KEY_VALUE: &str = "value";
const KEY_IN_VERTEX: &str = "inV";
const KEY_OUT_VERTEX: &str = "outV";
const TYPE_VERTEX: &str = "vertex";
const TYPE_EDGE: &str = "edge";

/// One row returned by the server for a statement.
#[derive(Clone, Debug, PartialEq)]
pub enum GremlinResult {
    /// Structured-map shape.
    Map(JsonMap),
    /// Detached element handle.
    Detached(DetachedElement),
    /// Any other payload (counts, value maps, raw query rows).
    Scalar(JsonValue),
}

impl GremlinResult {
    /// Runtime type of the payload, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            GremlinResult::Map(_) => "map",
            GremlinResult::Detached(element) => match element.kind {
                DetachedKind::Vertex => "detached vertex",
                DetachedKind::Edge { .. } => "detached edge",
            },
            GremlinResult::Scalar(value) => json_type(value),
        }
    }

    /// Element kind carried by the row, when it is an element at all.
    pub fn element_kind(&self) -> Option<&'static str> {
        match self {
            GremlinResult::Map(map) => match map.get(KEY_TYPE).and_then(JsonValue::as_str) {
                Some(TYPE_VERTEX) => Some(TYPE_VERTEX),
                Some(TYPE_EDGE) => Some(TYPE_EDGE),
                _ => None,
            },
            GremlinResult::Detached(element) => Some(element.kind_name()),
            GremlinResult::Scalar(_) => None,
        }
    }

    /// Integer payload of a scalar row.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GremlinResult::Scalar(JsonValue::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// JSON view of the row; detached elements use the structured-map layout.
    pub fn to_json(&self) -> JsonValue {
        match self {
            GremlinResult::Map(map) => JsonValue::Object(map.clone()),
            GremlinResult::Detached(element) => element.to_json(),
            GremlinResult::Scalar(value) => value.clone(),
        }
    }
}

/// Variant of a detached element.
#[derive(Clone, Debug, PartialEq)]
pub enum DetachedKind {
    /// Detached vertex.
    Vertex,
    /// Detached edge with its endpoint ids.
    Edge {
        /// Outgoing vertex id.
        out_vertex: ElementId,
        /// Incoming vertex id.
        in_vertex: ElementId,
    },
}

/// Element handle decoded from a typed payload.
#[derive(Clone, Debug, PartialEq)]
pub struct DetachedElement {
    id: ElementId,
    label: String,
    kind: DetachedKind,
    properties: Vec<(String, Value)>,
}

impl DetachedElement {
    /// Detached vertex without properties.
    pub fn vertex(id: impl Into<ElementId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DetachedKind::Vertex,
            properties: Vec::new(),
        }
    }

    /// Detached edge without properties.
    pub fn edge(
        id: impl Into<ElementId>,
        label: impl Into<String>,
        out_vertex: impl Into<ElementId>,
        in_vertex: impl Into<ElementId>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DetachedKind::Edge {
                out_vertex: out_vertex.into(),
                in_vertex: in_vertex.into(),
            },
            properties: Vec::new(),
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Element id.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Element label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Element variant.
    pub fn kind(&self) -> &DetachedKind {
        &self.kind
    }

    /// `vertex` or `edge`.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DetachedKind::Vertex => TYPE_VERTEX,
            DetachedKind::Edge { .. } => TYPE_EDGE,
        }
    }

    /// Properties in wire order.
    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    fn to_json(&self) -> JsonValue {
        match &self.kind {
            DetachedKind::Vertex => {
                let properties: JsonMap = self
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), json!([{ "value": v.to_json() }])))
                    .collect();
                json!({
                    "id": self.id.to_json(),
                    "label": self.label,
                    "type": TYPE_VERTEX,
                    "properties": properties,
                })
            }
            DetachedKind::Edge {
                out_vertex,
                in_vertex,
            } => {
                let properties: JsonMap = self
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                json!({
                    "id": self.id.to_json(),
                    "label": self.label,
                    "type": TYPE_EDGE,
                    "outV": out_vertex.to_json(),
                    "inV": in_vertex.to_json(),
                    "properties": properties,
                })
            }
        }
    }
}

/// Fills graph elements from wire results.
pub struct ResultReader<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ResultReader<'a> {
    /// Reader resolving `_classname` through `registry`.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Reads `results` into `element` according to its variant.
    ///
    /// Vertices and edges require exactly one row. Graphs accept any number
    /// of rows and route each one by its kind.
    pub fn read(&self, results: &[GremlinResult], element: &mut GraphElement) -> Result<()> {
        if element.is_graph() {
            return self.read_graph(results, element);
        }
        let [result] = results else {
            return Err(MapperError::shape(
                format!("{} rows", results.len()),
                format!("{} read expects exactly one result", element.kind_name()),
            ));
        };
        if element.is_vertex() {
            self.read_vertex(result, element)
        } else {
            self.read_edge(result, element)
        }
    }

    /// Reads the single numeric row of a count statement.
    pub fn read_count(results: &[GremlinResult]) -> Result<u64> {
        match results {
            [] => Ok(0),
            [row] => row
                .as_i64()
                .and_then(|count| u64::try_from(count).ok())
                .ok_or_else(|| MapperError::shape(row.type_name(), "count must be a non-negative integer")),
            rows => Err(MapperError::shape(
                format!("{} rows", rows.len()),
                "count expects a single row",
            )),
        }
    }

    fn read_graph(&self, results: &[GremlinResult], graph: &mut GraphElement) -> Result<()> {
        for result in results {
            let mut member = match result.element_kind() {
                Some(TYPE_VERTEX) => GraphElement::vertex(""),
                Some(TYPE_EDGE) => GraphElement::edge(""),
                _ => {
                    return Err(MapperError::shape(
                        result.type_name(),
                        "graph results must be vertices or edges",
                    ))
                }
            };
            self.read(std::slice::from_ref(result), &mut member)?;
            graph.push_member(member)?;
        }
        Ok(())
    }

    fn read_vertex(&self, result: &GremlinResult, element: &mut GraphElement) -> Result<()> {
        match result {
            GremlinResult::Detached(detached) => self.read_detached(detached, element, TYPE_VERTEX),
            GremlinResult::Map(map) => {
                validate_map(map, TYPE_VERTEX, &[KEY_ID, KEY_LABEL, KEY_TYPE, KEY_PROPERTIES])?;
                let properties = map
                    .get(KEY_PROPERTIES)
                    .and_then(JsonValue::as_object)
                    .ok_or_else(|| MapperError::shape("map", "vertex properties must be a map"))?;
                for (key, value) in properties {
                    element.set_property(key.clone(), unwrap_vertex_property(key, value)?);
                }
                read_identity(map, element)?;
                self.resolve_schema(element);
                Ok(())
            }
            GremlinResult::Scalar(_) => Err(MapperError::shape(
                result.type_name(),
                "vertex result must be a map or a detached vertex",
            )),
        }
    }

    fn read_edge(&self, result: &GremlinResult, element: &mut GraphElement) -> Result<()> {
        match result {
            GremlinResult::Detached(detached) => self.read_detached(detached, element, TYPE_EDGE),
            GremlinResult::Map(map) => {
                validate_map(
                    map,
                    TYPE_EDGE,
                    &[KEY_ID, KEY_LABEL, KEY_TYPE, KEY_IN_VERTEX, KEY_OUT_VERTEX],
                )?;
                match map.get(KEY_PROPERTIES) {
                    None | Some(JsonValue::Null) => {}
                    Some(JsonValue::Object(properties)) => {
                        for (key, value) in properties {
                            element.set_property(key.clone(), Value::from_json(value));
                        }
                    }
                    Some(other) => {
                        return Err(MapperError::shape(
                            json_type(other),
                            "edge properties must be a map",
                        ))
                    }
                }
                let out_vertex = wire_id(map, KEY_OUT_VERTEX)?;
                let in_vertex = wire_id(map, KEY_IN_VERTEX)?;
                element.set_endpoints(Some(out_vertex), Some(in_vertex))?;
                read_identity(map, element)?;
                self.resolve_schema(element);
                Ok(())
            }
            GremlinResult::Scalar(_) => Err(MapperError::shape(
                result.type_name(),
                "edge result must be a map or a detached edge",
            )),
        }
    }

    fn read_detached(
        &self,
        detached: &DetachedElement,
        element: &mut GraphElement,
        expected: &str,
    ) -> Result<()> {
        if detached.kind_name() != expected {
            return Err(MapperError::shape(
                format!("detached {}", detached.kind_name()),
                format!("expected a {expected}"),
            ));
        }
        element.set_id(detached.id.clone())?;
        element.set_label(detached.label.clone());
        for (key, value) in &detached.properties {
            element.set_property(key.clone(), value.clone());
        }
        if let DetachedKind::Edge {
            out_vertex,
            in_vertex,
        } = &detached.kind
        {
            element.set_endpoints(Some(out_vertex.clone()), Some(in_vertex.clone()))?;
        }
        self.resolve_schema(element);
        Ok(())
    }

    fn resolve_schema(&self, element: &mut GraphElement) {
        let Some(Value::String(type_name)) = element.property(CLASSNAME_PROPERTY).cloned() else {
            return;
        };
        match self.registry.get(&type_name) {
            Some(schema) => element.adopt_schema(&schema),
            None => tracing::warn!(type_name = %type_name, "no schema registered for result origin type"),
        }
    }
}

fn validate_map(map: &JsonMap, expected: &str, required: &[&str]) -> Result<()> {
    if let Some(missing) = required.iter().find(|key| !map.contains_key(**key)) {
        return Err(MapperError::shape(
            "map",
            format!("{expected} result should contain '{missing}'"),
        ));
    }
    match map.get(KEY_TYPE).and_then(JsonValue::as_str) {
        Some(found) if found == expected => Ok(()),
        found => Err(MapperError::shape(
            "map",
            format!("must be {expected} type, found {}", found.unwrap_or("non-string type")),
        )),
    }
}

fn read_identity(map: &JsonMap, element: &mut GraphElement) -> Result<()> {
    let label = map
        .get(KEY_LABEL)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| MapperError::shape("map", "label must be a string"))?;
    element.set_label(label);
    element.set_id(wire_id(map, KEY_ID)?)
}

fn wire_id(map: &JsonMap, key: &str) -> Result<ElementId> {
    map.get(key)
        .and_then(ElementId::from_json)
        .ok_or_else(|| MapperError::shape("map", format!("'{key}' is not a string or integer id")))
}

fn unwrap_vertex_property(key: &str, value: &JsonValue) -> Result<Value> {
    let JsonValue::Array(values) = value else {
        return Err(MapperError::shape(
            json_type(value),
            format!("vertex property '{key}' should be a list"),
        ));
    };
    let [single] = values.as_slice() else {
        return Err(MapperError::shape(
            format!("list of {}", values.len()),
            format!("vertex property '{key}' should hold exactly one value"),
        ));
    };
    single
        .get(KEY_VALUE)
        .map(Value::from_json)
        .ok_or_else(|| MapperError::shape(json_type(single), format!("vertex property '{key}' has no value")))
}

/// JSON type name used in shape errors.
pub(crate) fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "map",
    }
}
