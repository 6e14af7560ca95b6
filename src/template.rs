//! Repository-style operations over a Gremlin server.
//!
//! [`GremlinTemplate`] ties the pieces together: records go through the
//! [`MappingConverter`], the [`ScriptGenerator`] produces the statements, the
//! shared client runs them and the [`ResultReader`] turns rows back into
//! elements. Each call owns the elements it builds; nothing is cached.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::client::{dispatch, dispatch_batch, GremlinClient, GremlinFactory};
use crate::convert::{convert_to_type, MappingConverter};
use crate::element::{ElementId, GraphElement};
use crate::error::{MapperError, Result};
use crate::query::{
    bind_parameters, derive_count_query, paginate, GremlinQuery, Page, Pageable, QueryFindScriptGenerator,
    QueryParameters,
};
use crate::result::{GremlinResult, JsonMap, ResultReader};
use crate::schema::{EndpointRef, EntityKind, EntitySchema, GraphEntity, SchemaRegistry};
use crate::script::{ScriptGenerator, ScriptOperation, ScriptPlan};

/// Entry point for persisting and querying mapped records.
#[derive(Clone)]
pub struct GremlinTemplate {
    factory: Arc<GremlinFactory>,
    registry: Arc<SchemaRegistry>,
    converter: MappingConverter,
}

impl GremlinTemplate {
    /// Template with an empty schema registry.
    pub fn new(factory: Arc<GremlinFactory>) -> Self {
        Self::with_registry(factory, Arc::new(SchemaRegistry::new()))
    }

    /// Template sharing an existing schema registry.
    pub fn with_registry(factory: Arc<GremlinFactory>, registry: Arc<SchemaRegistry>) -> Self {
        let converter = MappingConverter::new(Arc::clone(&registry));
        Self {
            factory,
            registry,
            converter,
        }
    }

    /// Connection factory backing this template.
    pub fn factory(&self) -> &Arc<GremlinFactory> {
        &self.factory
    }

    /// Schemas known to this template.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Converter used for records.
    pub fn converter(&self) -> &MappingConverter {
        &self.converter
    }

    // ---- writes ----------------------------------------------------------

    /// Persists a new record and returns it as stored.
    ///
    /// Graph records are written in two phases: every vertex first, then
    /// every edge, with edge endpoints rewritten to the ids the server
    /// echoed for the vertices.
    pub async fn insert<T: GraphEntity>(&self, entity: &T) -> Result<T> {
        let schema = self.registry.ensure::<T>()?;
        let element = self.converter.write(entity, &schema)?;
        debug!(type_name = schema.type_name(), kind = schema.kind().name(), "template.insert");
        let client = self.factory.client()?;
        if element.is_graph() {
            return self.insert_graph(client.as_ref(), element, &schema).await;
        }
        let plan = ScriptGenerator::generate(ScriptOperation::Insert, &element)?;
        let rows = dispatch(client.as_ref(), plan).await?;
        self.recover(client.as_ref(), &rows, &schema).await
    }

    async fn insert_graph<T: GraphEntity>(
        &self,
        client: &dyn GremlinClient,
        mut graph: GraphElement,
        schema: &EntitySchema,
    ) -> Result<T> {
        if graph.is_empty_graph() {
            return self.converter.read(&graph, schema);
        }

        let vertex_batch = ScriptGenerator::graph_vertex_batch(ScriptOperation::Insert, &graph)?;
        let vertex_rows = dispatch_batch(client, vertex_batch).await?;

        let reader = ResultReader::new(&self.registry);
        let mut assigned: HashMap<ElementId, ElementId> = HashMap::new();
        for (vertex, rows) in graph.vertices().iter().zip(&vertex_rows) {
            let Some(written) = vertex.id() else {
                continue;
            };
            let mut echoed = GraphElement::vertex("");
            reader.read(rows, &mut echoed)?;
            if let Some(stored) = echoed.id() {
                assigned.insert(written.clone(), stored.clone());
            }
        }
        trace!(vertices = vertex_rows.len(), remapped = assigned.len(), "template.insert_graph.vertices");

        for edge in graph.edges_mut() {
            let (from, to) = {
                let (from, to) = edge.require_endpoints()?;
                let resolve = |id: &ElementId| assigned.get(id).cloned().unwrap_or_else(|| id.clone());
                (resolve(from), resolve(to))
            };
            edge.set_endpoints(Some(from), Some(to))?;
        }

        let edge_batch = ScriptGenerator::graph_edge_batch(ScriptOperation::Insert, &graph)?;
        let edge_rows = dispatch_batch(client, edge_batch).await?;

        let rows: Vec<GremlinResult> = vertex_rows.into_iter().chain(edge_rows).flatten().collect();
        let mut stored = GraphElement::from_schema(schema);
        reader.read(&rows, &mut stored)?;
        self.converter.read(&stored, schema)
    }

    /// Rewrites an existing record.
    ///
    /// Vertices and edges must carry an id that resolves on the server;
    /// otherwise the call fails with
    /// [`MapperError::UpdateOfNonexistentEntity`] and nothing is written.
    pub async fn update<T: GraphEntity>(&self, entity: T) -> Result<T> {
        let schema = self.registry.ensure::<T>()?;
        let element = self.converter.write(&entity, &schema)?;
        debug!(type_name = schema.type_name(), "template.update");
        let client = self.factory.client()?;
        if !element.is_graph() {
            let exists = self.stored_unmoved(client.as_ref(), &element, &schema).await?;
            if !exists {
                return Err(MapperError::UpdateOfNonexistentEntity {
                    type_name: schema.type_name().to_owned(),
                    id: element
                        .id()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "<none>".to_owned()),
                });
            }
        }
        self.write_update(client.as_ref(), &element).await?;
        Ok(entity)
    }

    /// Inserts or updates depending on what the server already holds.
    ///
    /// Graph records are inserted while no element carries their graph tag.
    pub async fn save<T: GraphEntity>(&self, entity: T) -> Result<T> {
        let schema = self.registry.ensure::<T>()?;
        let element = self.converter.write(&entity, &schema)?;
        let client = self.factory.client()?;
        let insert = if element.is_graph() {
            self.graph_is_empty(client.as_ref(), &element).await?
        } else {
            !self.stored_unmoved(client.as_ref(), &element, &schema).await?
        };
        debug!(type_name = schema.type_name(), insert, "template.save");
        if insert {
            return self.insert(&entity).await;
        }
        self.write_update(client.as_ref(), &element).await?;
        Ok(entity)
    }

    async fn write_update(&self, client: &dyn GremlinClient, element: &GraphElement) -> Result<()> {
        let plan = ScriptGenerator::generate(ScriptOperation::Update, element)?;
        dispatch(client, plan).await?;
        Ok(())
    }

    // ---- reads -----------------------------------------------------------

    /// Looks a vertex or edge up by id.
    pub async fn find_by_id<T: GraphEntity>(&self, id: impl Into<ElementId>) -> Result<Option<T>> {
        let schema = self.registry.ensure::<T>()?;
        reject_graph(&schema, ScriptOperation::FindById)?;
        let client = self.factory.client()?;
        let rows = self.find_rows(client.as_ref(), id.into(), &schema).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        self.recover(client.as_ref(), &rows, &schema).await.map(Some)
    }

    /// Like [`GremlinTemplate::find_by_id`], for vertex types only.
    pub async fn find_vertex_by_id<T: GraphEntity>(&self, id: impl Into<ElementId>) -> Result<Option<T>> {
        self.require_kind::<T>(EntityKind::Vertex, "find_vertex_by_id")?;
        self.find_by_id(id).await
    }

    /// Like [`GremlinTemplate::find_by_id`], for edge types only.
    pub async fn find_edge_by_id<T: GraphEntity>(&self, id: impl Into<ElementId>) -> Result<Option<T>> {
        self.require_kind::<T>(EntityKind::Edge, "find_edge_by_id")?;
        self.find_by_id(id).await
    }

    /// Every stored record carrying the label of `T`.
    pub async fn find_all<T: GraphEntity>(&self) -> Result<Vec<T>> {
        let schema = self.registry.ensure::<T>()?;
        reject_graph(&schema, ScriptOperation::FindAll)?;
        let plan = ScriptGenerator::generate(ScriptOperation::FindAll, &GraphElement::from_schema(&schema))?;
        self.run_and_recover(plan, &schema).await
    }

    /// Runs a criteria or raw find against the schema of `T`.
    pub async fn find<T: GraphEntity>(&self, query: &GremlinQuery) -> Result<Vec<T>> {
        let schema = self.registry.ensure::<T>()?;
        let plan = QueryFindScriptGenerator::new(&schema).generate(query)?;
        self.run_and_recover(plan, &schema).await
    }

    /// Returns `true` when a record of `T` with `id` exists.
    pub async fn exists_by_id<T: GraphEntity>(&self, id: impl Into<ElementId>) -> Result<bool> {
        let schema = self.registry.ensure::<T>()?;
        reject_graph(&schema, ScriptOperation::FindById)?;
        let client = self.factory.client()?;
        self.exists(client.as_ref(), id.into(), &schema).await
    }

    /// Returns `true` while no element is tagged with the graph label of `T`.
    pub async fn is_empty_graph<T: GraphEntity>(&self) -> Result<bool> {
        let schema = self.registry.ensure::<T>()?;
        let client = self.factory.client()?;
        self.graph_is_empty(client.as_ref(), &GraphElement::from_schema(&schema))
            .await
    }

    async fn graph_is_empty(&self, client: &dyn GremlinClient, graph: &GraphElement) -> Result<bool> {
        let plan = ScriptGenerator::generate(ScriptOperation::IsEmpty, graph)?;
        Ok(dispatch(client, plan).await?.is_empty())
    }

    // ---- deletes ---------------------------------------------------------

    /// Removes the vertex or edge with `id`; absent ids are ignored.
    pub async fn delete_by_id<T: GraphEntity>(&self, id: impl Into<ElementId>) -> Result<()> {
        let schema = self.registry.ensure::<T>()?;
        reject_graph(&schema, ScriptOperation::DeleteById)?;
        let mut element = GraphElement::from_schema(&schema);
        element.set_id(id.into())?;
        self.run(ScriptGenerator::generate(ScriptOperation::DeleteById, &element)?)
            .await
            .map(drop)
    }

    /// Drops every edge, then every vertex.
    pub async fn delete_all(&self) -> Result<()> {
        debug!("template.delete_all");
        self.delete_all_by_kind(EntityKind::Graph).await
    }

    /// Drops every vertex or every edge regardless of label; `Graph` wipes
    /// the whole store.
    pub async fn delete_all_by_kind(&self, kind: EntityKind) -> Result<()> {
        let (op, element) = match kind {
            EntityKind::Vertex => (ScriptOperation::DeleteAllByLabel, GraphElement::vertex("")),
            EntityKind::Edge => (ScriptOperation::DeleteAllByLabel, GraphElement::edge("")),
            EntityKind::Graph => (ScriptOperation::DeleteAllGraph, GraphElement::graph("")),
        };
        self.run(ScriptGenerator::generate(op, &element)?).await.map(drop)
    }

    /// Drops every element carrying the label of `T`.
    pub async fn delete_all_by_label<T: GraphEntity>(&self) -> Result<()> {
        let schema = self.registry.ensure::<T>()?;
        let op = if schema.is_graph() {
            ScriptOperation::DeleteAllGraph
        } else {
            ScriptOperation::DeleteAllByLabel
        };
        let plan = ScriptGenerator::generate(op, &GraphElement::from_schema(&schema))?;
        self.run(plan).await.map(drop)
    }

    /// Drops every element written from `T`, leaving other types sharing the
    /// label untouched.
    pub async fn delete_all_by_class<T: GraphEntity>(&self) -> Result<()> {
        let schema = self.registry.ensure::<T>()?;
        let op = if schema.is_graph() {
            ScriptOperation::DeleteAllGraph
        } else {
            ScriptOperation::DeleteAllByClass
        };
        let plan = ScriptGenerator::generate(op, &GraphElement::from_schema(&schema))?;
        self.run(plan).await.map(drop)
    }

    // ---- counts ----------------------------------------------------------

    /// Number of vertices in the store.
    pub async fn vertex_count(&self) -> Result<u64> {
        self.count_element(&GraphElement::vertex("")).await
    }

    /// Number of edges in the store.
    pub async fn edge_count(&self) -> Result<u64> {
        self.count_element(&GraphElement::edge("")).await
    }

    /// Number of elements carrying the label of `T`.
    pub async fn count<T: GraphEntity>(&self) -> Result<u64> {
        let schema = self.registry.ensure::<T>()?;
        reject_graph(&schema, ScriptOperation::Count)?;
        self.count_element(&GraphElement::from_schema(&schema)).await
    }

    async fn count_element(&self, element: &GraphElement) -> Result<u64> {
        let rows = self
            .run(ScriptGenerator::generate(ScriptOperation::Count, element)?)
            .await?;
        ResultReader::read_count(&rows)
    }

    // ---- raw queries -----------------------------------------------------

    /// First row of `query`, as JSON.
    pub async fn query_for_object(&self, query: &str) -> Result<Option<JsonValue>> {
        debug!(%query, "template.query_for_object");
        let rows = self.run(ScriptPlan::single(query)).await?;
        Ok(rows.first().map(GremlinResult::to_json))
    }

    /// Every row of `query`, as JSON.
    pub async fn query_for_list(&self, query: &str) -> Result<Vec<JsonValue>> {
        debug!(%query, "template.query_for_list");
        let rows = self.run(ScriptPlan::single(query)).await?;
        Ok(rows.iter().map(GremlinResult::to_json).collect())
    }

    /// Rows `[offset, offset + limit)` of `query`.
    pub async fn query_for_list_range(&self, query: &str, offset: usize, limit: usize) -> Result<Vec<JsonValue>> {
        self.query_for_list(&paginate(query, offset, limit)).await
    }

    /// One page of `query` plus the total reported by its derived count
    /// query.
    pub async fn query_for_page(&self, query: &str, pageable: Pageable) -> Result<Page<JsonValue>> {
        let content = self
            .query_for_list_range(query, pageable.offset(), pageable.size())
            .await?;
        let total = self.page_total(query).await?;
        Ok(Page::new(content, pageable, total))
    }

    /// First row of `query`, converted to `R`.
    pub async fn query_for_object_as<R: DeserializeOwned>(&self, query: &str) -> Result<Option<R>> {
        match self.query_for_object(query).await? {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => convert_to_type(value).map(Some),
        }
    }

    /// Every row of `query`, converted to `R`.
    pub async fn query_for_list_as<R: DeserializeOwned>(&self, query: &str) -> Result<Vec<R>> {
        self.query_for_list(query)
            .await?
            .into_iter()
            .map(convert_to_type)
            .collect()
    }

    /// Rows `[offset, offset + limit)` of `query`, converted to `R`.
    pub async fn query_for_list_range_as<R: DeserializeOwned>(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<R>> {
        self.query_for_list_as(&paginate(query, offset, limit)).await
    }

    /// One page of `query`, converted to `R`.
    pub async fn query_for_page_as<R: DeserializeOwned>(&self, query: &str, pageable: Pageable) -> Result<Page<R>> {
        let content = self
            .query_for_list_range_as(query, pageable.offset(), pageable.size())
            .await?;
        let total = self.page_total(query).await?;
        Ok(Page::new(content, pageable, total))
    }

    /// Binds `:name` tokens in `template` and returns every row.
    pub async fn query_with_params(&self, template: &str, params: &QueryParameters) -> Result<Vec<JsonValue>> {
        self.query_for_list(&bind_parameters(template, params)).await
    }

    async fn page_total(&self, query: &str) -> Result<u64> {
        let count_query = derive_count_query(query);
        let total = self
            .query_for_object(&count_query)
            .await?
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        trace!(%count_query, total, "template.page_total");
        Ok(total)
    }

    // ---- internals -------------------------------------------------------

    async fn run(&self, plan: ScriptPlan) -> Result<Vec<GremlinResult>> {
        let client = self.factory.client()?;
        dispatch(client.as_ref(), plan).await
    }

    async fn run_and_recover<T: DeserializeOwned>(&self, plan: ScriptPlan, schema: &EntitySchema) -> Result<Vec<T>> {
        let client = self.factory.client()?;
        let rows = dispatch(client.as_ref(), plan).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.recover(client.as_ref(), std::slice::from_ref(row), schema).await?);
        }
        Ok(records)
    }

    async fn find_rows(
        &self,
        client: &dyn GremlinClient,
        id: ElementId,
        schema: &EntitySchema,
    ) -> Result<Vec<GremlinResult>> {
        let mut element = GraphElement::from_schema(schema);
        element.set_id(id)?;
        dispatch(client, ScriptGenerator::generate(ScriptOperation::FindById, &element)?).await
    }

    async fn exists(&self, client: &dyn GremlinClient, id: ElementId, schema: &EntitySchema) -> Result<bool> {
        Ok(!self.find_rows(client, id, schema).await?.is_empty())
    }

    /// Returns `true` when `element` is stored under its id.
    ///
    /// An edge whose endpoints differ from the stored ones is rejected:
    /// updates rewrite properties only and cannot reattach an edge.
    async fn stored_unmoved(
        &self,
        client: &dyn GremlinClient,
        element: &GraphElement,
        schema: &EntitySchema,
    ) -> Result<bool> {
        let Some(id) = element.id() else {
            return Ok(false);
        };
        let rows = self.find_rows(client, id.clone(), schema).await?;
        if rows.is_empty() {
            return Ok(false);
        }
        let Some((from, to)) = element.endpoints() else {
            return Ok(true);
        };
        let mut stored = GraphElement::from_schema(schema);
        ResultReader::new(&self.registry).read(&rows, &mut stored)?;
        let Some((stored_from, stored_to)) = stored.endpoints() else {
            return Ok(true);
        };
        if same_endpoint(from, stored_from) && same_endpoint(to, stored_to) {
            return Ok(true);
        }
        debug!(type_name = schema.type_name(), %id, "template.update.endpoints_changed");
        Err(MapperError::invalid_id_config(
            schema.type_name(),
            format!(
                "edge {id} is stored as {} -> {}; endpoints cannot change to {} -> {}",
                endpoint_text(stored_from),
                endpoint_text(stored_to),
                endpoint_text(from),
                endpoint_text(to)
            ),
        ))
    }

    /// Reads one record from `rows`, completing nested edge endpoints.
    async fn recover<T: DeserializeOwned>(
        &self,
        client: &dyn GremlinClient,
        rows: &[GremlinResult],
        schema: &EntitySchema,
    ) -> Result<T> {
        let mut element = GraphElement::from_schema(schema);
        ResultReader::new(&self.registry).read(rows, &mut element)?;
        let mut object = self.converter.to_json_object(&element, schema)?;
        if schema.kind() == EntityKind::Edge {
            self.complete_edge(client, &element, schema, &mut object).await?;
        }
        self.converter.finish(object, schema)
    }

    /// Fills endpoint fields declared as nested vertices by looking the
    /// vertices up.
    async fn complete_edge(
        &self,
        client: &dyn GremlinClient,
        edge: &GraphElement,
        schema: &EntitySchema,
        object: &mut JsonMap,
    ) -> Result<()> {
        let (Some((from, to)), Some((from_id, to_id))) = (schema.endpoints(), edge.endpoints()) else {
            return Ok(());
        };
        let lookup = |target: &EndpointRef, id: Option<&ElementId>| {
            let request = match (target, id) {
                (EndpointRef::Vertex(vertex), Some(id)) => Some((Arc::clone(vertex), id.clone())),
                _ => None,
            };
            async move {
                match request {
                    Some((vertex, id)) => self.vertex_json(client, id, &vertex).await.map(Some),
                    None => Ok(None),
                }
            }
        };
        let (from_value, to_value) =
            futures::future::try_join(lookup(&from.target, from_id), lookup(&to.target, to_id)).await?;
        for (endpoint, value) in [(from, from_value), (to, to_value)] {
            if let Some(value) = value {
                object.insert(endpoint.field.clone(), value);
            }
        }
        Ok(())
    }

    async fn vertex_json(&self, client: &dyn GremlinClient, id: ElementId, schema: &EntitySchema) -> Result<JsonValue> {
        let rows = self.find_rows(client, id, schema).await?;
        if rows.is_empty() {
            return Ok(JsonValue::Null);
        }
        let mut vertex = GraphElement::from_schema(schema);
        ResultReader::new(&self.registry).read(&rows, &mut vertex)?;
        self.converter
            .to_json_object(&vertex, schema)
            .map(JsonValue::Object)
    }

    fn require_kind<T: GraphEntity>(&self, expected: EntityKind, operation: &'static str) -> Result<()> {
        let schema = self.registry.ensure::<T>()?;
        if schema.kind() == expected {
            return Ok(());
        }
        Err(MapperError::UnexpectedEntityVariant {
            operation,
            variant: schema.kind().name(),
            type_name: schema.type_name().to_owned(),
        })
    }
}

fn reject_graph(schema: &EntitySchema, op: ScriptOperation) -> Result<()> {
    if schema.is_graph() {
        return Err(MapperError::UnexpectedEntityVariant {
            operation: op.name(),
            variant: EntityKind::Graph.name(),
            type_name: schema.type_name().to_owned(),
        });
    }
    Ok(())
}

/// An endpoint left unset on the record keeps the stored one.
fn same_endpoint(written: Option<&ElementId>, stored: Option<&ElementId>) -> bool {
    match (written, stored) {
        (None, _) => true,
        (Some(written), Some(stored)) => written.to_string() == stored.to_string(),
        (Some(_), None) => false,
    }
}

fn endpoint_text(id: Option<&ElementId>) -> String {
    id.map(ToString::to_string).unwrap_or_else(|| "<none>".to_owned())
}
