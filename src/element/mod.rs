//! In-memory graph element model.
//!
//! A [`GraphElement`] is the intermediate form every domain record passes
//! through on its way to and from the server. Elements are built fresh for a
//! single template call and dropped when it returns.

#![forbid(unsafe_code)]

pub mod value;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::{MapperError, Result};
use crate::schema::{EntityKind, EntitySchema};

pub use value::Value;

/// Property holding the domain type name of a persisted vertex or edge.
pub const CLASSNAME_PROPERTY: &str = "_classname";
/// Property tagging vertices and edges written as members of a graph entity.
pub const GRAPH_PROPERTY: &str = "_graph";

/// Identifier of a persisted vertex or edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    /// Textual id.
    String(String),
    /// Numeric id (integer and long ids share this representation).
    Long(i64),
}

impl ElementId {
    /// Normalizes an id as it appears on the wire.
    ///
    /// Accepts plain strings and integers plus the wrapped forms some
    /// providers emit: GraphSON `{"@type": .., "@value": ..}` and JanusGraph
    /// relation identifiers `{"relationId": ".."}`.
    pub fn from_json(value: &JsonValue) -> Option<ElementId> {
        match value {
            JsonValue::String(s) => Some(ElementId::String(s.clone())),
            JsonValue::Number(n) => n.as_i64().map(ElementId::Long),
            JsonValue::Object(map) => {
                if let Some(inner) = map.get("@value") {
                    return ElementId::from_json(inner);
                }
                map.get("relationId").and_then(ElementId::from_json)
            }
            _ => None,
        }
    }

    /// Validates an id supplied as a property value.
    pub fn from_value(type_name: &str, value: &Value) -> Result<ElementId> {
        match value {
            Value::String(s) => Ok(ElementId::String(s.clone())),
            Value::Int(i) => Ok(ElementId::Long(*i)),
            other => Err(MapperError::InvalidIdType {
                type_name: type_name.to_owned(),
                found: other.type_name().to_owned(),
            }),
        }
    }

    /// JSON form of the id.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ElementId::String(s) => JsonValue::String(s.clone()),
            ElementId::Long(i) => JsonValue::Number((*i).into()),
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::String(s) => f.write_str(s),
            ElementId::Long(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId::String(value.to_owned())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        ElementId::String(value)
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        ElementId::Long(value)
    }
}

impl From<i32> for ElementId {
    fn from(value: i32) -> Self {
        ElementId::Long(i64::from(value))
    }
}

/// Declared type of a domain id field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdType {
    /// `String` ids.
    #[default]
    String,
    /// 32-bit integer ids.
    Integer,
    /// 64-bit integer ids.
    Long,
}

/// Describes the domain field that supplies and receives the element id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdField {
    /// Field name on the domain record.
    pub name: String,
    /// Declared id type.
    pub id_type: IdType,
    /// Whether the server assigns the id at insert time.
    pub generated: bool,
}

impl Default for IdField {
    fn default() -> Self {
        Self {
            name: "id".to_owned(),
            id_type: IdType::String,
            generated: false,
        }
    }
}

/// Variant-specific payload of a [`GraphElement`].
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    /// A single vertex.
    Vertex,
    /// A single edge and its endpoint vertex ids.
    Edge {
        /// Outgoing ("from") vertex id.
        from: Option<ElementId>,
        /// Incoming ("to") vertex id.
        to: Option<ElementId>,
    },
    /// A whole graph: a vertex set and an edge set.
    Graph {
        /// Member vertices.
        vertices: Vec<GraphElement>,
        /// Member edges.
        edges: Vec<GraphElement>,
    },
}

impl ElementKind {
    /// Lower-case variant name.
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge { .. } => "edge",
            ElementKind::Graph { .. } => "graph",
        }
    }
}

/// Intermediate representation of one domain record.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphElement {
    kind: ElementKind,
    id: Option<ElementId>,
    id_field: IdField,
    label: String,
    type_name: String,
    properties: BTreeMap<String, Value>,
}

impl GraphElement {
    fn with_kind(kind: ElementKind, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            kind,
            id: None,
            id_field: IdField::default(),
            type_name: label.clone(),
            label,
            properties: BTreeMap::new(),
        }
    }

    /// New vertex element with the given label.
    pub fn vertex(label: impl Into<String>) -> Self {
        Self::with_kind(ElementKind::Vertex, label)
    }

    /// New edge element with the given label and no endpoints.
    pub fn edge(label: impl Into<String>) -> Self {
        Self::with_kind(ElementKind::Edge { from: None, to: None }, label)
    }

    /// New empty graph element.
    pub fn graph(label: impl Into<String>) -> Self {
        Self::with_kind(
            ElementKind::Graph {
                vertices: Vec::new(),
                edges: Vec::new(),
            },
            label,
        )
    }

    /// Empty element shaped after a schema: kind, label, type and id field.
    pub fn from_schema(schema: &EntitySchema) -> Self {
        let mut element = match schema.kind() {
            EntityKind::Vertex => Self::vertex(schema.label()),
            EntityKind::Edge => Self::edge(schema.label()),
            EntityKind::Graph => Self::graph(schema.label()),
        };
        element.type_name = schema.type_name().to_owned();
        element.id_field = schema.id_field().clone();
        element
    }

    /// Element variant payload.
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Lower-case variant name (`vertex`, `edge`, `graph`).
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Returns `true` for vertices.
    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, ElementKind::Vertex)
    }

    /// Returns `true` for edges.
    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ElementKind::Edge { .. })
    }

    /// Returns `true` for graphs.
    pub fn is_graph(&self) -> bool {
        matches!(self.kind, ElementKind::Graph { .. })
    }

    /// Current id, if any.
    pub fn id(&self) -> Option<&ElementId> {
        self.id.as_ref()
    }

    /// Assigns the id.
    ///
    /// Re-assigning the same id is accepted; a different id is rejected
    /// because ids are immutable once set.
    pub fn set_id(&mut self, id: ElementId) -> Result<()> {
        match &self.id {
            Some(current) if *current != id => Err(MapperError::invalid_id_config(
                &self.type_name,
                format!("id already set to {current}, refusing to change it to {id}"),
            )),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Id field descriptor.
    pub fn id_field(&self) -> &IdField {
        &self.id_field
    }

    /// Replaces the id field descriptor.
    pub fn set_id_field(&mut self, id_field: IdField) {
        self.id_field = id_field;
    }

    /// Element label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replaces the label.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Domain type name the element was built for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Re-targets the element at another schema after `_classname` resolution.
    pub fn adopt_schema(&mut self, schema: &EntitySchema) {
        self.type_name = schema.type_name().to_owned();
        self.id_field = schema.id_field().clone();
    }

    /// Properties ordered by name.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Looks up one property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets (or replaces) a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Removes a property, returning its old value.
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Edge endpoints; `None` for non-edges.
    pub fn endpoints(&self) -> Option<(Option<&ElementId>, Option<&ElementId>)> {
        match &self.kind {
            ElementKind::Edge { from, to } => Some((from.as_ref(), to.as_ref())),
            _ => None,
        }
    }

    /// Sets both endpoints of an edge.
    pub fn set_endpoints(&mut self, from: Option<ElementId>, to: Option<ElementId>) -> Result<()> {
        match &mut self.kind {
            ElementKind::Edge {
                from: current_from,
                to: current_to,
            } => {
                *current_from = from;
                *current_to = to;
                Ok(())
            }
            other => Err(MapperError::UnexpectedEntityVariant {
                operation: "set_endpoints",
                variant: other.name(),
                type_name: self.type_name.clone(),
            }),
        }
    }

    /// Both endpoint ids of an edge, failing when either is missing.
    pub fn require_endpoints(&self) -> Result<(&ElementId, &ElementId)> {
        match self.endpoints() {
            Some((Some(from), Some(to))) => Ok((from, to)),
            Some(_) => Err(MapperError::invalid_id_config(
                &self.type_name,
                "edge requires both endpoint vertex ids",
            )),
            None => Err(MapperError::UnexpectedEntityVariant {
                operation: "require_endpoints",
                variant: self.kind_name(),
                type_name: self.type_name.clone(),
            }),
        }
    }

    /// Member vertices of a graph (empty for other variants).
    pub fn vertices(&self) -> &[GraphElement] {
        match &self.kind {
            ElementKind::Graph { vertices, .. } => vertices,
            _ => &[],
        }
    }

    /// Member edges of a graph (empty for other variants).
    pub fn edges(&self) -> &[GraphElement] {
        match &self.kind {
            ElementKind::Graph { edges, .. } => edges,
            _ => &[],
        }
    }

    /// Mutable access to graph edges.
    pub fn edges_mut(&mut self) -> &mut [GraphElement] {
        match &mut self.kind {
            ElementKind::Graph { edges, .. } => edges,
            _ => &mut [],
        }
    }

    /// Appends a member to a graph, routing it by kind.
    pub fn push_member(&mut self, member: GraphElement) -> Result<()> {
        let variant = self.kind.name();
        let ElementKind::Graph { vertices, edges } = &mut self.kind else {
            return Err(MapperError::UnexpectedEntityVariant {
                operation: "push_member",
                variant,
                type_name: self.type_name.clone(),
            });
        };
        match member.kind {
            ElementKind::Vertex => vertices.push(member),
            ElementKind::Edge { .. } => edges.push(member),
            ElementKind::Graph { .. } => {
                return Err(MapperError::UnexpectedEntityVariant {
                    operation: "push_member",
                    variant: "graph",
                    type_name: member.type_name,
                })
            }
        }
        Ok(())
    }

    /// Returns `true` when a graph has neither vertices nor edges.
    pub fn is_empty_graph(&self) -> bool {
        self.vertices().is_empty() && self.edges().is_empty()
    }
}
