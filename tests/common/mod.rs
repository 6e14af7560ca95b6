//! In-memory Gremlin server and sample domain types shared by the
//! integration tests.
//!
//! `MemoryGraph` parses the traversal text it receives (the subset the
//! mapper emits plus `valueMap`, `range` and `limit`) and runs it against a
//! small vertex/edge store, so tests observe the statements exactly as a
//! server would.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use gremlin_mapper::result::{DetachedElement, GremlinResult, JsonMap};
use gremlin_mapper::schema::EntitySchema;
use gremlin_mapper::{
    ElementId, GraphEntity, GremlinClient, GremlinFactory, GremlinTemplate, IdType, MapperError,
    PropertyType, Value,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

// ---- sample domain ---------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<String>,
    pub name: String,
    pub age: i32,
    pub born: String,
    pub tags: Vec<String>,
}

impl GraphEntity for Person {
    fn schema() -> EntitySchema {
        EntitySchema::vertex("Person")
            .label("person")
            .generated_id("id", IdType::String)
            .property("name", PropertyType::String)
            .property("age", PropertyType::Integer)
            .property("born", PropertyType::LocalDate)
            .property("tags", PropertyType::Json)
            .build()
    }
}

pub fn person(name: &str, age: i32) -> Person {
    Person {
        id: None,
        name: name.to_owned(),
        age,
        born: "1990-04-02".to_owned(),
        tags: vec!["ops".to_owned(), "it's \\ fine".to_owned()],
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub stars: i64,
}

impl GraphEntity for Project {
    fn schema() -> EntitySchema {
        EntitySchema::vertex("Project")
            .label("project")
            .id("id", IdType::String)
            .property("name", PropertyType::String)
            .property("stars", PropertyType::Long)
            .build()
    }
}

pub fn project(id: &str, stars: i64) -> Project {
    Project {
        id: id.to_owned(),
        name: format!("project-{id}"),
        stars,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Depends {
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub scope: String,
}

impl GraphEntity for Depends {
    fn schema() -> EntitySchema {
        EntitySchema::edge("Depends")
            .label("depends")
            .generated_id("id", IdType::String)
            .from_id("from", IdType::String)
            .to_id("to", IdType::String)
            .property("scope", PropertyType::String)
            .build()
    }
}

pub fn depends(from: &str, to: &str) -> Depends {
    Depends {
        id: None,
        from: from.to_owned(),
        to: to.to_owned(),
        scope: "runtime".to_owned(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contributes {
    pub id: Option<String>,
    pub person: Person,
    pub project: Project,
    pub commits: i64,
}

impl GraphEntity for Contributes {
    fn schema() -> EntitySchema {
        EntitySchema::edge("Contributes")
            .label("contributes")
            .generated_id("id", IdType::String)
            .from_vertex("person", Person::schema())
            .to_vertex("project", Project::schema())
            .property("commits", PropertyType::Long)
            .build()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetworkVertex {
    Project(Project),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetworkEdge {
    Depends(Depends),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub vertices: Vec<NetworkVertex>,
    pub edges: Vec<NetworkEdge>,
}

impl GraphEntity for Network {
    fn schema() -> EntitySchema {
        EntitySchema::graph("Network")
            .label("network")
            .vertex_set("vertices")
            .edge_set("edges")
            .member(Project::schema())
            .member(Depends::schema())
            .build()
    }
}

/// Three projects, `a -> b -> c`.
pub fn chain_network() -> Network {
    Network {
        vertices: ["a", "b", "c"]
            .iter()
            .map(|id| NetworkVertex::Project(project(id, 10)))
            .collect(),
        edges: vec![
            NetworkEdge::Depends(depends("a", "b")),
            NetworkEdge::Depends(depends("b", "c")),
        ],
    }
}

pub fn template_over(graph: &Arc<MemoryGraph>) -> GremlinTemplate {
    let client: Arc<dyn GremlinClient> = graph.clone();
    GremlinTemplate::new(Arc::new(GremlinFactory::from_client(client)))
}

// ---- traversal text --------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Ident(String),
    Call(String, Vec<Arg>),
    Traversal(Vec<Step>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub name: String,
    pub args: Vec<Arg>,
}

/// Parses `g.step(args)...` into steps.
pub fn parse(statement: &str) -> Result<Vec<Step>, String> {
    let mut parser = Parser {
        chars: statement.chars().collect(),
        pos: 0,
    };
    let root = parser.ident()?;
    if root != "g" {
        return Err(format!("traversal must start at g, found '{root}'"));
    }
    let steps = parser.steps()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(format!("trailing input at {}", parser.pos));
    }
    Ok(steps)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        self.skip_ws();
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{ch}' at {}", self.pos))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected identifier at {start}"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn steps(&mut self) -> Result<Vec<Step>, String> {
        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('.') {
                return Ok(steps);
            }
            self.pos += 1;
            let name = self.ident()?;
            let args = self.args()?;
            steps.push(Step { name, args });
        }
    }

    fn args(&mut self) -> Result<Vec<Arg>, String> {
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                other => return Err(format!("unexpected {other:?} in argument list")),
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, String> {
        self.skip_ws();
        match self.peek() {
            None => Err("unexpected end of input".to_owned()),
            Some('\'') => self.string().map(Arg::Str),
            Some(c) if c.is_ascii_digit() || c == '-' => self.number(),
            Some(_) => {
                let name = self.ident()?;
                match name.as_str() {
                    "null" => return Ok(Arg::Null),
                    "true" => return Ok(Arg::Bool(true)),
                    "false" => return Ok(Arg::Bool(false)),
                    "__" => return self.steps().map(Arg::Traversal),
                    _ => {}
                }
                self.skip_ws();
                match self.peek() {
                    Some('(') => {
                        let mut call = Arg::Call(name, self.args()?);
                        for step in self.steps()? {
                            let mut args = vec![call];
                            args.extend(step.args);
                            call = Arg::Call(step.name, args);
                        }
                        Ok(call)
                    }
                    Some('.') => {
                        self.pos += 1;
                        let member = self.ident()?;
                        Ok(Arg::Ident(format!("{name}.{member}")))
                    }
                    _ => Ok(Arg::Ident(name)),
                }
            }
        }
    }

    fn string(&mut self) -> Result<String, String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err("unterminated string".to_owned()),
                Some('\\') => {
                    let escaped = self
                        .chars
                        .get(self.pos + 1)
                        .copied()
                        .ok_or_else(|| "dangling escape".to_owned())?;
                    out.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        other => other,
                    });
                    self.pos += 2;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\n' | '\r') => return Err("line break inside a quoted literal".to_owned()),
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<Arg, String> {
        let start = self.pos;
        self.pos += 1;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.contains(|c| matches!(c, '.' | 'e' | 'E')) {
            text.parse().map(Arg::Float).map_err(|e| format!("{text}: {e}"))
        } else {
            text.parse().map(Arg::Int).map_err(|e| format!("{text}: {e}"))
        }
    }
}

fn value_maps(store: &Store, items: &[Item]) -> Vec<GremlinResult> {
    items
        .iter()
        .filter_map(|item| store.get(item))
        .map(|stored| {
            let mut map = JsonMap::new();
            map.insert("id".to_owned(), stored.id.to_json());
            map.insert("label".to_owned(), json!(stored.label));
            for (key, value) in &stored.properties {
                map.insert(key.clone(), json!([value.to_json()]));
            }
            GremlinResult::Map(map)
        })
        .collect()
}

fn arg_value(arg: &Arg) -> Result<Value, String> {
    match arg {
        Arg::Str(s) => Ok(Value::String(s.clone())),
        Arg::Int(i) => Ok(Value::Int(*i)),
        Arg::Float(f) => Ok(Value::Float(*f)),
        Arg::Bool(b) => Ok(Value::Bool(*b)),
        Arg::Null => Ok(Value::Null),
        other => Err(format!("{other:?} is not a literal")),
    }
}

fn arg_id(arg: &Arg) -> Result<ElementId, String> {
    match arg {
        Arg::Str(s) => Ok(ElementId::String(s.clone())),
        Arg::Int(i) => Ok(ElementId::Long(*i)),
        other => Err(format!("{other:?} is not an id")),
    }
}

fn str_arg(step: &Step, index: usize) -> Result<String, String> {
    match step.args.get(index) {
        Some(Arg::Str(s)) => Ok(s.clone()),
        other => Err(format!("{}: expected string argument, found {other:?}", step.name)),
    }
}

fn int_arg(step: &Step, index: usize) -> Result<usize, String> {
    match step.args.get(index) {
        Some(Arg::Int(i)) if *i >= 0 => Ok(*i as usize),
        other => Err(format!("{}: expected count, found {other:?}", step.name)),
    }
}

// ---- store -----------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Vertex,
    Edge,
}

#[derive(Clone, Debug)]
struct Stored {
    id: ElementId,
    label: String,
    properties: BTreeMap<String, Value>,
    endpoints: Option<(ElementId, ElementId)>,
}

#[derive(Clone, Debug, PartialEq)]
struct Item {
    kind: Kind,
    id: ElementId,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    vertices: Vec<Stored>,
    edges: Vec<Stored>,
}

/// Servers coerce id literals, so `'7'` and `7` address the same element.
fn same_id(a: &ElementId, b: &ElementId) -> bool {
    a.to_string() == b.to_string()
}

impl Store {
    fn list(&self, kind: Kind) -> &Vec<Stored> {
        match kind {
            Kind::Vertex => &self.vertices,
            Kind::Edge => &self.edges,
        }
    }

    fn list_mut(&mut self, kind: Kind) -> &mut Vec<Stored> {
        match kind {
            Kind::Vertex => &mut self.vertices,
            Kind::Edge => &mut self.edges,
        }
    }

    fn get(&self, item: &Item) -> Option<&Stored> {
        self.list(item.kind).iter().find(|s| same_id(&s.id, &item.id))
    }

    fn get_mut(&mut self, item: &Item) -> Option<&mut Stored> {
        self.list_mut(item.kind)
            .iter_mut()
            .find(|s| same_id(&s.id, &item.id))
    }

    fn allocate(&mut self) -> ElementId {
        self.next_id += 1;
        ElementId::Long(self.next_id)
    }

    fn create(&mut self, kind: Kind, label: String, endpoints: Option<(ElementId, ElementId)>) -> Item {
        let id = self.allocate();
        self.list_mut(kind).push(Stored {
            id: id.clone(),
            label,
            properties: BTreeMap::new(),
            endpoints,
        });
        Item { kind, id }
    }

    fn remove(&mut self, item: &Item) {
        self.list_mut(item.kind).retain(|s| !same_id(&s.id, &item.id));
        if item.kind == Kind::Vertex {
            self.edges.retain(|e| {
                e.endpoints
                    .as_ref()
                    .map_or(true, |(out, inv)| !same_id(out, &item.id) && !same_id(inv, &item.id))
            });
        }
    }
}

// ---- server ----------------------------------------------------------------

/// Statement-interpreting fake of a Gremlin server.
#[derive(Default)]
pub struct MemoryGraph {
    store: Mutex<Store>,
    log: Mutex<Vec<String>>,
    canned: Mutex<Vec<(String, Vec<GremlinResult>)>>,
    failures: Mutex<Vec<String>>,
    reassign_ids: bool,
    detached: bool,
}

enum Flow {
    Items(Vec<Item>),
    Rows(Vec<GremlinResult>),
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignores `T.id` steps and always assigns numeric ids.
    pub fn reassigning_ids(mut self) -> Self {
        self.reassign_ids = true;
        self
    }

    /// Answers element lookups with detached elements instead of maps.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Answers `statement` with `rows` instead of interpreting it.
    pub fn respond(&self, statement: &str, rows: Vec<GremlinResult>) {
        self.canned.lock().push((statement.to_owned(), rows));
    }

    /// Fails every statement containing `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.failures.lock().push(fragment.to_owned());
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn vertex_total(&self) -> usize {
        self.store.lock().vertices.len()
    }

    pub fn edge_total(&self) -> usize {
        self.store.lock().edges.len()
    }

    fn execute(&self, store: &mut Store, steps: &[Step]) -> Result<Vec<GremlinResult>, String> {
        match self.pipeline(store, Vec::new(), false, steps)? {
            Flow::Rows(rows) => Ok(rows),
            Flow::Items(items) => Ok(items
                .iter()
                .filter_map(|item| store.get(item).map(|stored| self.row(item.kind, stored)))
                .collect()),
        }
    }

    fn pipeline(
        &self,
        store: &mut Store,
        mut items: Vec<Item>,
        mut started: bool,
        steps: &[Step],
    ) -> Result<Flow, String> {
        let mut aliases: HashMap<String, Item> = HashMap::new();
        let mut value_map = false;
        for step in steps {
            match step.name.as_str() {
                "V" | "E" => {
                    let kind = if step.name == "V" { Kind::Vertex } else { Kind::Edge };
                    if started && items.is_empty() {
                        continue;
                    }
                    items = if step.args.is_empty() {
                        store
                            .list(kind)
                            .iter()
                            .map(|s| Item { kind, id: s.id.clone() })
                            .collect()
                    } else {
                        let mut found = Vec::new();
                        for arg in &step.args {
                            let item = Item { kind, id: arg_id(arg)? };
                            if let Some(stored) = store.get(&item) {
                                found.push(Item { kind, id: stored.id.clone() });
                            }
                        }
                        found
                    };
                    started = true;
                }
                "addV" => {
                    items = vec![store.create(Kind::Vertex, str_arg(step, 0)?, None)];
                    started = true;
                }
                "as" => {
                    if let Some(first) = items.first() {
                        aliases.insert(str_arg(step, 0)?, first.clone());
                    }
                }
                "addE" => {
                    let Some(current) = items.first().cloned() else {
                        continue;
                    };
                    let placeholder = Some((current.id.clone(), current.id.clone()));
                    items = vec![store.create(Kind::Edge, str_arg(step, 0)?, placeholder)];
                }
                "from" | "to" => {
                    if items.is_empty() {
                        continue;
                    }
                    let alias = str_arg(step, 0)?;
                    let target = aliases
                        .get(&alias)
                        .cloned()
                        .ok_or_else(|| format!("unknown step label '{alias}'"))?;
                    for item in &items {
                        let stored = store.get_mut(item).ok_or("edge vanished")?;
                        if let Some((out, inv)) = stored.endpoints.as_mut() {
                            if step.name == "from" {
                                *out = target.id.clone();
                            } else {
                                *inv = target.id.clone();
                            }
                        }
                    }
                }
                "property" => {
                    if step.args.first() == Some(&Arg::Ident("T.id".to_owned())) {
                        let supplied = arg_id(step.args.get(1).ok_or("T.id without value")?)?;
                        if self.reassign_ids {
                            continue;
                        }
                        for item in &mut items {
                            let rekeyed = Item { kind: item.kind, id: supplied.clone() };
                            if store.get(&rekeyed).is_some() {
                                return Err(format!("element with id {supplied} already exists"));
                            }
                            let stored = store.get_mut(item).ok_or("element vanished")?;
                            stored.id = supplied.clone();
                            item.id = supplied.clone();
                        }
                    } else {
                        let key = str_arg(step, 0)?;
                        let value = arg_value(step.args.get(1).ok_or("property without value")?)?;
                        for item in &items {
                            if let Some(stored) = store.get_mut(item) {
                                stored.properties.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
                "hasLabel" => {
                    let label = str_arg(step, 0)?;
                    items.retain(|item| store.get(item).is_some_and(|s| s.label == label));
                }
                "has" => {
                    let key = str_arg(step, 0)?;
                    let predicate = step.args.get(1).cloned();
                    let mut kept = Vec::new();
                    for item in items {
                        let Some(stored) = store.get(&item) else {
                            continue;
                        };
                        let keep = match (&predicate, stored.properties.get(&key)) {
                            (None, found) => found.is_some(),
                            (Some(_), None) => false,
                            (Some(predicate), Some(value)) => test(predicate, value)?,
                        };
                        if keep {
                            kept.push(item);
                        }
                    }
                    items = kept;
                }
                "hasId" => {
                    let ids = step.args.iter().map(arg_id).collect::<Result<Vec<_>, _>>()?;
                    items.retain(|item| ids.iter().any(|id| same_id(id, &item.id)));
                }
                "outV" | "inV" => {
                    let mut next = Vec::new();
                    for item in &items {
                        if let Some((out, inv)) = store.get(item).and_then(|s| s.endpoints.clone()) {
                            let id = if step.name == "outV" { out } else { inv };
                            next.push(Item { kind: Kind::Vertex, id });
                        }
                    }
                    items = next;
                }
                "where" | "and" | "or" | "not" => {
                    let mut kept = Vec::new();
                    for item in items {
                        let mut hits = Vec::new();
                        for arg in &step.args {
                            let Arg::Traversal(sub) = arg else {
                                return Err(format!("{} expects anonymous traversals", step.name));
                            };
                            let flow = self.pipeline(store, vec![item.clone()], true, sub)?;
                            hits.push(matches!(flow, Flow::Items(found) if !found.is_empty()));
                        }
                        let keep = match step.name.as_str() {
                            "or" => hits.iter().any(|hit| *hit),
                            "not" => !hits.iter().any(|hit| *hit),
                            _ => hits.iter().all(|hit| *hit),
                        };
                        if keep {
                            kept.push(item);
                        }
                    }
                    items = kept;
                }
                "sideEffect" => {
                    let clears = matches!(
                        step.args.as_slice(),
                        [Arg::Traversal(sub)]
                            if sub.iter().map(|s| s.name.as_str()).eq(["properties", "drop"])
                    );
                    if !clears {
                        return Err("only sideEffect(__.properties().drop()) is supported".to_owned());
                    }
                    for item in &items {
                        if let Some(stored) = store.get_mut(item) {
                            stored.properties.clear();
                        }
                    }
                }
                "drop" => {
                    for item in &items {
                        store.remove(item);
                    }
                    return Ok(Flow::Rows(Vec::new()));
                }
                "count" => {
                    return Ok(Flow::Rows(vec![GremlinResult::Scalar(json!(items.len()))]));
                }
                "limit" => items.truncate(int_arg(step, 0)?),
                "range" => {
                    let low = int_arg(step, 0)?.min(items.len());
                    let high = int_arg(step, 1)?.clamp(low, items.len());
                    items = items[low..high].to_vec();
                }
                "valueMap" => value_map = true,
                other => return Err(format!("unsupported step '{other}'")),
            }
        }
        if value_map {
            return Ok(Flow::Rows(value_maps(store, &items)));
        }
        Ok(Flow::Items(items))
    }

    fn row(&self, kind: Kind, stored: &Stored) -> GremlinResult {
        if self.detached {
            let element = match (kind, &stored.endpoints) {
                (Kind::Edge, Some((out, inv))) => {
                    DetachedElement::edge(stored.id.clone(), stored.label.clone(), out.clone(), inv.clone())
                }
                _ => DetachedElement::vertex(stored.id.clone(), stored.label.clone()),
            };
            let element = stored
                .properties
                .iter()
                .fold(element, |element, (k, v)| element.with_property(k.clone(), v.clone()));
            return GremlinResult::Detached(element);
        }
        let mut map = JsonMap::new();
        map.insert("id".to_owned(), stored.id.to_json());
        map.insert("label".to_owned(), json!(stored.label));
        match (kind, &stored.endpoints) {
            (Kind::Edge, Some((out, inv))) => {
                let properties: JsonMap = stored
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                map.insert("type".to_owned(), json!("edge"));
                map.insert("outV".to_owned(), out.to_json());
                map.insert("inV".to_owned(), inv.to_json());
                map.insert("properties".to_owned(), JsonValue::Object(properties));
            }
            _ => {
                let properties: JsonMap = stored
                    .properties
                    .iter()
                    .enumerate()
                    .map(|(n, (k, v))| (k.clone(), json!([{ "id": n, "value": v.to_json() }])))
                    .collect();
                map.insert("type".to_owned(), json!("vertex"));
                map.insert("properties".to_owned(), JsonValue::Object(properties));
            }
        }
        GremlinResult::Map(map)
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn test(predicate: &Arg, value: &Value) -> Result<bool, String> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let Arg::Call(name, args) = predicate else {
        return Ok(compare(value, &arg_value(predicate)?) == Some(Equal));
    };
    let operand = |index: usize| -> Result<Value, String> {
        arg_value(args.get(index).ok_or_else(|| format!("{name} without operand"))?)
    };
    Ok(match name.as_str() {
        "neq" => compare(value, &operand(0)?) != Some(Equal),
        "lt" => compare(value, &operand(0)?) == Some(Less),
        "lte" => matches!(compare(value, &operand(0)?), Some(Less | Equal)),
        "gt" => compare(value, &operand(0)?) == Some(Greater),
        "gte" => matches!(compare(value, &operand(0)?), Some(Greater | Equal)),
        "within" => {
            let mut any = false;
            for arg in args {
                any |= compare(value, &arg_value(arg)?) == Some(Equal);
            }
            any
        }
        "and" => {
            let mut all = true;
            for arg in args {
                all &= test(arg, value)?;
            }
            all
        }
        other => return Err(format!("unsupported predicate '{other}'")),
    })
}

#[async_trait]
impl GremlinClient for MemoryGraph {
    async fn submit(&self, statement: &str) -> gremlin_mapper::Result<Vec<GremlinResult>> {
        self.log.lock().push(statement.to_owned());
        if self.failures.lock().iter().any(|f| statement.contains(f.as_str())) {
            return Err(MapperError::execution(statement, "injected failure"));
        }
        if let Some((_, rows)) = self.canned.lock().iter().find(|(s, _)| s == statement) {
            return Ok(rows.clone());
        }
        let steps = parse(statement).map_err(|e| MapperError::execution(statement, e))?;
        let mut store = self.store.lock();
        self.execute(&mut store, &steps)
            .map_err(|e| MapperError::execution(statement, e))
    }
}
