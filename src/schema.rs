//! Entity schema descriptors.
//!
//! Each domain type that can be persisted describes itself with an
//! [`EntitySchema`]: its kind, label, id field, typed properties and, for
//! edges and graphs, the fields that carry endpoints or members. The
//! [`SchemaRegistry`] keeps those descriptors by type name so results can be
//! routed back to the right type through the `_classname` property.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::element::{IdField, IdType};
use crate::error::{MapperError, Result};

/// Which element variant a domain type maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// Maps to a vertex.
    Vertex,
    /// Maps to an edge.
    Edge,
    /// Maps to a whole graph of vertices and edges.
    Graph,
}

impl EntityKind {
    /// Lower-case variant name.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Vertex => "vertex",
            EntityKind::Edge => "edge",
            EntityKind::Graph => "graph",
        }
    }
}

/// Declared target type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    /// UTF-8 text.
    String,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean flag.
    Boolean,
    /// Instant stored as epoch milliseconds.
    Date,
    /// ISO local date text.
    LocalDate,
    /// ISO local time text.
    LocalTime,
    /// ISO local date-time text.
    LocalDateTime,
    /// Nested structure stored as JSON text.
    Json,
}

/// One declared property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertySchema {
    /// Field name on the domain record, also the property key.
    pub name: String,
    /// Declared target type.
    pub ty: PropertyType,
}

/// What an edge endpoint field holds.
#[derive(Clone, Debug)]
pub enum EndpointRef {
    /// The bare id of the endpoint vertex.
    Id(IdType),
    /// A nested vertex record, resolved by id when the edge is read.
    Vertex(Arc<EntitySchema>),
}

/// Endpoint field of an edge type.
#[derive(Clone, Debug)]
pub struct EndpointSchema {
    /// Field name on the domain record.
    pub field: String,
    /// What the field holds.
    pub target: EndpointRef,
}

/// Persisted shape of a domain type.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    type_name: String,
    label: String,
    kind: EntityKind,
    id: IdField,
    properties: Vec<PropertySchema>,
    from: Option<EndpointSchema>,
    to: Option<EndpointSchema>,
    vertex_set: Option<String>,
    edge_set: Option<String>,
    members: Vec<Arc<EntitySchema>>,
}

impl EntitySchema {
    /// Starts a vertex schema for `type_name`.
    pub fn vertex(type_name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(type_name, EntityKind::Vertex)
    }

    /// Starts an edge schema for `type_name`.
    pub fn edge(type_name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(type_name, EntityKind::Edge)
    }

    /// Starts a graph schema for `type_name`.
    pub fn graph(type_name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(type_name, EntityKind::Graph)
    }

    /// Domain type name, written as `_classname`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Element label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Element variant.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Id field descriptor.
    pub fn id_field(&self) -> &IdField {
        &self.id
    }

    /// Returns `true` when the id field is non-empty.
    pub fn has_id_field(&self) -> bool {
        !self.id.name.is_empty()
    }

    /// Returns `true` for graph schemas.
    pub fn is_graph(&self) -> bool {
        self.kind == EntityKind::Graph
    }

    /// Declared properties.
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Declared type of a property, if any.
    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        self.properties.iter().find(|p| p.name == name).map(|p| p.ty)
    }

    /// Endpoint fields of an edge schema.
    pub fn endpoints(&self) -> Option<(&EndpointSchema, &EndpointSchema)> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    /// Field holding the vertex collection of a graph schema.
    pub fn vertex_set(&self) -> Option<&str> {
        self.vertex_set.as_deref()
    }

    /// Field holding the edge collection of a graph schema.
    pub fn edge_set(&self) -> Option<&str> {
        self.edge_set.as_deref()
    }

    /// Member schemas of a graph schema.
    pub fn members(&self) -> &[Arc<EntitySchema>] {
        &self.members
    }

    fn validate(&self) -> Result<()> {
        if self.type_name.is_empty() {
            return Err(MapperError::ConfigurationError(
                "entity schema requires a type name".into(),
            ));
        }
        match self.kind {
            EntityKind::Edge => {
                let (from, to) = self.endpoints().ok_or_else(|| {
                    MapperError::ConfigurationError(format!(
                        "edge '{}' must declare exactly one from and one to field",
                        self.type_name
                    ))
                })?;
                if from.field == to.field {
                    return Err(MapperError::ConfigurationError(format!(
                        "edge '{}' uses '{}' for both endpoints",
                        self.type_name, from.field
                    )));
                }
            }
            EntityKind::Graph => {
                if self.vertex_set.is_none() || self.edge_set.is_none() {
                    return Err(MapperError::ConfigurationError(format!(
                        "graph '{}' must declare a vertex set and an edge set",
                        self.type_name
                    )));
                }
                if let Some(nested) = self.members.iter().find(|m| m.is_graph()) {
                    return Err(MapperError::ConfigurationError(format!(
                        "graph '{}' cannot contain graph '{}'",
                        self.type_name, nested.type_name
                    )));
                }
            }
            EntityKind::Vertex => {}
        }
        Ok(())
    }
}

/// Builder for [`EntitySchema`].
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    fn new(type_name: impl Into<String>, kind: EntityKind) -> Self {
        let type_name = type_name.into();
        Self {
            schema: EntitySchema {
                label: type_name.clone(),
                type_name,
                kind,
                id: IdField::default(),
                properties: Vec::new(),
                from: None,
                to: None,
                vertex_set: None,
                edge_set: None,
                members: Vec::new(),
            },
        }
    }

    /// Overrides the label (defaults to the type name).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.schema.label = label.into();
        self
    }

    /// Declares a user-supplied id field.
    pub fn id(mut self, name: impl Into<String>, id_type: IdType) -> Self {
        self.schema.id = IdField {
            name: name.into(),
            id_type,
            generated: false,
        };
        self
    }

    /// Declares a server-generated id field.
    pub fn generated_id(mut self, name: impl Into<String>, id_type: IdType) -> Self {
        self.schema.id = IdField {
            name: name.into(),
            id_type,
            generated: true,
        };
        self
    }

    /// Declares a typed property.
    pub fn property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.schema.properties.push(PropertySchema {
            name: name.into(),
            ty,
        });
        self
    }

    /// Declares the "from" endpoint as a bare vertex id.
    pub fn from_id(mut self, field: impl Into<String>, id_type: IdType) -> Self {
        self.schema.from = Some(EndpointSchema {
            field: field.into(),
            target: EndpointRef::Id(id_type),
        });
        self
    }

    /// Declares the "to" endpoint as a bare vertex id.
    pub fn to_id(mut self, field: impl Into<String>, id_type: IdType) -> Self {
        self.schema.to = Some(EndpointSchema {
            field: field.into(),
            target: EndpointRef::Id(id_type),
        });
        self
    }

    /// Declares the "from" endpoint as a nested vertex record.
    pub fn from_vertex(mut self, field: impl Into<String>, vertex: EntitySchema) -> Self {
        self.schema.from = Some(EndpointSchema {
            field: field.into(),
            target: EndpointRef::Vertex(Arc::new(vertex)),
        });
        self
    }

    /// Declares the "to" endpoint as a nested vertex record.
    pub fn to_vertex(mut self, field: impl Into<String>, vertex: EntitySchema) -> Self {
        self.schema.to = Some(EndpointSchema {
            field: field.into(),
            target: EndpointRef::Vertex(Arc::new(vertex)),
        });
        self
    }

    /// Names the field holding a graph's vertices.
    pub fn vertex_set(mut self, field: impl Into<String>) -> Self {
        self.schema.vertex_set = Some(field.into());
        self
    }

    /// Names the field holding a graph's edges.
    pub fn edge_set(mut self, field: impl Into<String>) -> Self {
        self.schema.edge_set = Some(field.into());
        self
    }

    /// Registers a vertex or edge type that may appear inside a graph.
    pub fn member(mut self, schema: EntitySchema) -> Self {
        self.schema.members.push(Arc::new(schema));
        self
    }

    /// Finishes the schema.
    pub fn build(self) -> EntitySchema {
        self.schema
    }
}

/// Ties a serde-mappable domain type to its schema.
pub trait GraphEntity: Serialize + DeserializeOwned + Send + Sync {
    /// Persisted shape of the type.
    fn schema() -> EntitySchema;
}

/// Thread-safe lookup of schemas by domain type name.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<EntitySchema>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a schema together with the schemas it nests.
    pub fn register(&self, schema: EntitySchema) -> Result<Arc<EntitySchema>> {
        self.insert(Arc::new(schema))
    }

    fn insert(&self, schema: Arc<EntitySchema>) -> Result<Arc<EntitySchema>> {
        schema.validate()?;
        for member in &schema.members {
            self.insert(Arc::clone(member))?;
        }
        if let Some((from, to)) = schema.endpoints() {
            for endpoint in [from, to] {
                if let EndpointRef::Vertex(vertex) = &endpoint.target {
                    self.insert(Arc::clone(vertex))?;
                }
            }
        }
        self.schemas
            .write()
            .insert(schema.type_name.clone(), Arc::clone(&schema));
        tracing::trace!(type_name = %schema.type_name, kind = schema.kind.name(), "registered schema");
        Ok(schema)
    }

    /// Returns the registered schema of `T`, registering it on first use.
    pub fn ensure<T: GraphEntity>(&self) -> Result<Arc<EntitySchema>> {
        let schema = T::schema();
        if let Some(existing) = self.get(&schema.type_name) {
            return Ok(existing);
        }
        self.register(schema)
    }

    /// Looks up a schema by type name.
    pub fn get(&self, type_name: &str) -> Option<Arc<EntitySchema>> {
        self.schemas.read().get(type_name).cloned()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
