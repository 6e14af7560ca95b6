//! Script generation: CRUD intents to ordered Gremlin statement batches.
//!
//! Generation is pure. A [`ScriptPlan`] is a sequence of [`StatementBatch`]es;
//! batches run in order while the statements of one batch are independent of
//! each other and may run concurrently.

pub mod literal;

use crate::element::{ElementId, ElementKind, GraphElement, CLASSNAME_PROPERTY, GRAPH_PROPERTY};
use crate::error::{MapperError, Result};

use literal::quote;

/// Persistence intent a script is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptOperation {
    /// Create the element.
    Insert,
    /// Replace the element's properties.
    Update,
    /// Fetch one element by id.
    FindById,
    /// Fetch every element with the element's label.
    FindAll,
    /// Drop one element by id.
    DeleteById,
    /// Drop every element with the label (every element when unlabeled).
    DeleteAllByLabel,
    /// Drop every element with the label and origin type.
    DeleteAllByClass,
    /// Drop every edge, then every vertex.
    DeleteAllGraph,
    /// Count elements with the label (all elements when unlabeled).
    Count,
    /// Probe whether any vertex of a graph entity exists.
    IsEmpty,
}

impl ScriptOperation {
    /// Operation name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            ScriptOperation::Insert => "insert",
            ScriptOperation::Update => "update",
            ScriptOperation::FindById => "find_by_id",
            ScriptOperation::FindAll => "find_all",
            ScriptOperation::DeleteById => "delete_by_id",
            ScriptOperation::DeleteAllByLabel => "delete_all_by_label",
            ScriptOperation::DeleteAllByClass => "delete_all_by_class",
            ScriptOperation::DeleteAllGraph => "delete_all",
            ScriptOperation::Count => "count",
            ScriptOperation::IsEmpty => "is_empty_graph",
        }
    }
}

/// Statements that do not depend on each other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<String>,
}

impl StatementBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch holding one statement.
    pub fn single(statement: impl Into<String>) -> Self {
        Self {
            statements: vec![statement.into()],
        }
    }

    /// Appends a statement.
    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Statements in submission order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` when the batch holds no statement.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl FromIterator<String> for StatementBatch {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for StatementBatch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.into_iter()
    }
}

/// Ordered batches; consumed once by dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptPlan {
    batches: Vec<StatementBatch>,
}

impl ScriptPlan {
    /// Empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan with a single statement.
    pub fn single(statement: impl Into<String>) -> Self {
        Self {
            batches: vec![StatementBatch::single(statement)],
        }
    }

    /// Appends a batch; empty batches are skipped.
    pub fn push_batch(&mut self, batch: StatementBatch) {
        if !batch.is_empty() {
            self.batches.push(batch);
        }
    }

    /// Batches in execution order.
    pub fn batches(&self) -> &[StatementBatch] {
        &self.batches
    }

    /// Every statement, flattened in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.batches
            .iter()
            .flat_map(|batch| batch.statements().iter().map(String::as_str))
    }

    /// Returns `true` when there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl IntoIterator for ScriptPlan {
    type Item = StatementBatch;
    type IntoIter = std::vec::IntoIter<StatementBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}

/// Turns an element and an operation into a [`ScriptPlan`].
pub struct ScriptGenerator;

impl ScriptGenerator {
    /// Generates the plan for `op` against `element`.
    pub fn generate(op: ScriptOperation, element: &GraphElement) -> Result<ScriptPlan> {
        if op == ScriptOperation::DeleteAllGraph {
            let mut plan = ScriptPlan::new();
            plan.push_batch(StatementBatch::single("g.E().drop()"));
            plan.push_batch(StatementBatch::single("g.V().drop()"));
            return Ok(plan);
        }
        match element.kind() {
            ElementKind::Graph { .. } => Self::generate_graph(op, element),
            _ => Ok(ScriptPlan::single(Self::statement(op, element)?)),
        }
    }

    /// Vertex phase of a graph insert or update.
    pub fn graph_vertex_batch(op: ScriptOperation, graph: &GraphElement) -> Result<StatementBatch> {
        Self::require_graph(op, graph)?;
        graph
            .vertices()
            .iter()
            .map(|vertex| Self::member_statement(op, graph, vertex))
            .collect()
    }

    /// Edge phase of a graph insert or update.
    pub fn graph_edge_batch(op: ScriptOperation, graph: &GraphElement) -> Result<StatementBatch> {
        Self::require_graph(op, graph)?;
        graph
            .edges()
            .iter()
            .map(|edge| Self::member_statement(op, graph, edge))
            .collect()
    }

    fn generate_graph(op: ScriptOperation, graph: &GraphElement) -> Result<ScriptPlan> {
        match op {
            ScriptOperation::Insert | ScriptOperation::Update => {
                let mut plan = ScriptPlan::new();
                plan.push_batch(Self::graph_vertex_batch(op, graph)?);
                plan.push_batch(Self::graph_edge_batch(op, graph)?);
                Ok(plan)
            }
            ScriptOperation::IsEmpty => Ok(ScriptPlan::single(format!(
                "g.V().has({}, {}).limit(1)",
                quote(GRAPH_PROPERTY),
                quote(graph.label())
            ))),
            other => Err(unsupported(other, graph)),
        }
    }

    fn require_graph(op: ScriptOperation, graph: &GraphElement) -> Result<()> {
        if graph.is_graph() {
            Ok(())
        } else {
            Err(unsupported(op, graph))
        }
    }

    fn member_statement(
        op: ScriptOperation,
        graph: &GraphElement,
        member: &GraphElement,
    ) -> Result<String> {
        match op {
            ScriptOperation::Insert => Self::insert(member),
            ScriptOperation::Update => Self::update(member),
            other => Err(unsupported(other, graph)),
        }
    }

    fn statement(op: ScriptOperation, element: &GraphElement) -> Result<String> {
        let source = source(element);
        match op {
            ScriptOperation::Insert => {
                if element.id().is_some() && element.id_field().generated {
                    return Err(MapperError::invalid_id_config(
                        element.type_name(),
                        format!(
                            "field '{}' is server generated and must be empty before insert",
                            element.id_field().name
                        ),
                    ));
                }
                Self::insert(element)
            }
            ScriptOperation::Update => Self::update(element),
            ScriptOperation::FindById => Ok(format!(
                "{source}({}).hasLabel({})",
                literal::id(require_id(op, element)?),
                quote(element.label())
            )),
            ScriptOperation::FindAll => {
                Ok(format!("{source}().hasLabel({})", quote(element.label())))
            }
            ScriptOperation::DeleteById => Ok(format!(
                "{source}({}).drop()",
                literal::id(require_id(op, element)?)
            )),
            ScriptOperation::DeleteAllByLabel => {
                Ok(format!("{source}(){}.drop()", label_filter(element)))
            }
            ScriptOperation::DeleteAllByClass => Ok(format!(
                "{source}(){}.has({}, {}).drop()",
                label_filter(element),
                quote(CLASSNAME_PROPERTY),
                quote(element.type_name())
            )),
            ScriptOperation::Count => Ok(format!("{source}(){}.count()", label_filter(element))),
            ScriptOperation::IsEmpty | ScriptOperation::DeleteAllGraph => {
                Err(unsupported(op, element))
            }
        }
    }

    fn insert(element: &GraphElement) -> Result<String> {
        let mut script = match element.kind() {
            ElementKind::Vertex => format!("g.addV({})", quote(element.label())),
            ElementKind::Edge { .. } => {
                let (from, to) = element.require_endpoints()?;
                format!(
                    "g.V({}).as('from').V({}).as('to').addE({}).from('from').to('to')",
                    literal::id(from),
                    literal::id(to),
                    quote(element.label())
                )
            }
            ElementKind::Graph { .. } => return Err(unsupported(ScriptOperation::Insert, element)),
        };
        if let Some(id) = element.id() {
            script.push_str(&format!(".property(T.id, {})", literal::id(id)));
        }
        append_properties(&mut script, element)?;
        Ok(script)
    }

    fn update(element: &GraphElement) -> Result<String> {
        let id = literal::id(require_id(ScriptOperation::Update, element)?);
        // Endpoints are fixed once an edge exists; only its properties change.
        let mut script = match element.kind() {
            ElementKind::Vertex => format!("g.V({id})"),
            ElementKind::Edge { .. } => format!("g.E({id})"),
            ElementKind::Graph { .. } => return Err(unsupported(ScriptOperation::Update, element)),
        };
        script.push_str(".sideEffect(__.properties().drop())");
        append_properties(&mut script, element)?;
        Ok(script)
    }
}

fn source(element: &GraphElement) -> &'static str {
    if element.is_edge() {
        "g.E"
    } else {
        "g.V"
    }
}

fn label_filter(element: &GraphElement) -> String {
    if element.label().is_empty() {
        String::new()
    } else {
        format!(".hasLabel({})", quote(element.label()))
    }
}

fn require_id(op: ScriptOperation, element: &GraphElement) -> Result<&ElementId> {
    element.id().ok_or_else(|| {
        MapperError::invalid_id_config(
            element.type_name(),
            format!("{} requires an id", op.name()),
        )
    })
}

fn append_properties(script: &mut String, element: &GraphElement) -> Result<()> {
    for (key, value) in element.properties() {
        if value.is_null() {
            continue;
        }
        script.push_str(&literal::property_step(key, value)?);
    }
    Ok(())
}

fn unsupported(op: ScriptOperation, element: &GraphElement) -> MapperError {
    MapperError::UnexpectedEntityVariant {
        operation: op.name(),
        variant: element.kind_name(),
        type_name: element.type_name().to_owned(),
    }
}
