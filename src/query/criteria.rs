//! Criteria trees and their compilation into `has(...)` filter steps.

use std::mem;

use crate::element::Value;
use crate::error::{MapperError, Result};
use crate::schema::{EntityKind, EntitySchema};
use crate::script::literal::{property_value, quote};
use crate::script::ScriptPlan;

use super::GremlinQuery;

/// Boolean filter over element properties.
#[derive(Clone, Debug, PartialEq)]
pub enum Criteria {
    /// `property == value`.
    Eq {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `property != value`.
    Ne {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `property < value`.
    Lt {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `property <= value`.
    Le {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `property > value`.
    Gt {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `property >= value`.
    Ge {
        /// Property key.
        property: String,
        /// Comparison literal.
        value: Value,
    },
    /// `low <= property <= high`.
    Between {
        /// Property key.
        property: String,
        /// Inclusive lower bound.
        low: Value,
        /// Inclusive upper bound.
        high: Value,
    },
    /// `property` is one of `values`.
    In {
        /// Property key.
        property: String,
        /// Candidate literals.
        values: Vec<Value>,
    },
    /// `property` is present.
    Exists {
        /// Property key.
        property: String,
    },
    /// Every child holds.
    And(Vec<Criteria>),
    /// At least one child holds.
    Or(Vec<Criteria>),
    /// The child does not hold.
    Not(Box<Criteria>),
}

impl Criteria {
    /// Builds a criteria tree; several predicates at the top level are ANDed.
    pub fn build<F>(build: F) -> Result<Criteria>
    where
        F: FnOnce(&mut CriteriaBuilder),
    {
        CriteriaBuilder::build_group(Mode::And, build)
    }

    /// Renders the tree as one anonymous filter step (no leading dot).
    pub fn to_step(&self) -> Result<String> {
        let has = |property: &str, predicate: Option<String>| match predicate {
            Some(predicate) => format!("has({}, {predicate})", quote(property)),
            None => format!("has({})", quote(property)),
        };
        let compare = |property: &str, op: &str, value: &Value| -> Result<String> {
            Ok(has(
                property,
                Some(format!("{op}({})", property_value(property, value)?)),
            ))
        };
        match self {
            Criteria::Eq { property, value } => {
                Ok(has(property, Some(property_value(property, value)?)))
            }
            Criteria::Ne { property, value } => compare(property, "neq", value),
            Criteria::Lt { property, value } => compare(property, "lt", value),
            Criteria::Le { property, value } => compare(property, "lte", value),
            Criteria::Gt { property, value } => compare(property, "gt", value),
            Criteria::Ge { property, value } => compare(property, "gte", value),
            Criteria::Between {
                property,
                low,
                high,
            } => Ok(has(
                property,
                Some(format!(
                    "gte({}).and(lte({}))",
                    property_value(property, low)?,
                    property_value(property, high)?
                )),
            )),
            Criteria::In { property, values } => {
                let rendered = values
                    .iter()
                    .map(|value| property_value(property, value))
                    .collect::<Result<Vec<_>>>()?;
                Ok(has(property, Some(format!("within({})", rendered.join(", ")))))
            }
            Criteria::Exists { property } => Ok(has(property, None)),
            Criteria::And(children) => Ok(format!("and({})", anonymous(children)?)),
            Criteria::Or(children) => Ok(format!("or({})", anonymous(children)?)),
            Criteria::Not(child) => Ok(format!("not(__.{})", child.to_step()?)),
        }
    }
}

fn anonymous(children: &[Criteria]) -> Result<String> {
    Ok(children
        .iter()
        .map(|child| child.to_step().map(|step| format!("__.{step}")))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    And,
    Or,
}

/// Accumulates predicates; the first error sticks and later calls are no-ops.
pub struct CriteriaBuilder {
    mode: Mode,
    exprs: Vec<Criteria>,
    error: Option<MapperError>,
}

impl CriteriaBuilder {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            exprs: Vec::new(),
            error: None,
        }
    }

    fn build_group<F>(mode: Mode, build: F) -> Result<Criteria>
    where
        F: FnOnce(&mut CriteriaBuilder),
    {
        let mut nested = CriteriaBuilder::with_mode(mode);
        build(&mut nested);
        if let Some(err) = nested.error {
            return Err(err);
        }
        match nested.exprs.len() {
            0 => Err(MapperError::InvalidCriteria(
                "criteria group must emit at least one predicate",
            )),
            1 => Ok(nested.exprs.remove(0)),
            _ => Ok(match nested.mode {
                Mode::And => Criteria::And(nested.exprs),
                Mode::Or => Criteria::Or(nested.exprs),
            }),
        }
    }

    fn push(&mut self, expr: Criteria) -> &mut Self {
        if self.error.is_none() {
            self.exprs.push(expr);
        }
        self
    }

    fn record_error(&mut self, err: MapperError) -> &mut Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    /// `property == value`.
    pub fn eq<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Eq {
            property: property.into(),
            value: value.into(),
        })
    }

    /// `property != value`.
    pub fn ne<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Ne {
            property: property.into(),
            value: value.into(),
        })
    }

    /// `property < value`.
    pub fn lt<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Lt {
            property: property.into(),
            value: value.into(),
        })
    }

    /// `property <= value`.
    pub fn le<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Le {
            property: property.into(),
            value: value.into(),
        })
    }

    /// `property > value`.
    pub fn gt<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Gt {
            property: property.into(),
            value: value.into(),
        })
    }

    /// `property >= value`.
    pub fn ge<P: Into<String>, V: Into<Value>>(&mut self, property: P, value: V) -> &mut Self {
        self.push(Criteria::Ge {
            property: property.into(),
            value: value.into(),
        })
    }

    /// Inclusive range on both bounds.
    pub fn between<P, L, H>(&mut self, property: P, low: L, high: H) -> &mut Self
    where
        P: Into<String>,
        L: Into<Value>,
        H: Into<Value>,
    {
        self.push(Criteria::Between {
            property: property.into(),
            low: low.into(),
            high: high.into(),
        })
    }

    /// Membership in a non-empty, homogeneous literal set.
    pub fn in_list<P, I, V>(&mut self, property: P, values: I) -> &mut Self
    where
        P: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if self.error.is_some() {
            return self;
        }
        let collected: Vec<Value> = values.into_iter().map(Into::into).collect();
        let Some(first) = collected.first() else {
            return self.record_error(MapperError::InvalidCriteria(
                "in_list requires at least one value",
            ));
        };
        let first_tag = mem::discriminant(first);
        if !collected.iter().all(|v| mem::discriminant(v) == first_tag) {
            return self.record_error(MapperError::InvalidCriteria(
                "in_list requires all values to share the same type",
            ));
        }
        self.push(Criteria::In {
            property: property.into(),
            values: collected,
        })
    }

    /// Property key is present.
    pub fn exists<P: Into<String>>(&mut self, property: P) -> &mut Self {
        self.push(Criteria::Exists {
            property: property.into(),
        })
    }

    /// Nested group combined with AND.
    pub fn and_group<F: FnOnce(&mut CriteriaBuilder)>(&mut self, build: F) -> &mut Self {
        match Self::build_group(Mode::And, build) {
            Ok(expr) => self.push(expr),
            Err(err) => self.record_error(err),
        }
    }

    /// Nested group combined with OR.
    pub fn or_group<F: FnOnce(&mut CriteriaBuilder)>(&mut self, build: F) -> &mut Self {
        match Self::build_group(Mode::Or, build) {
            Ok(expr) => self.push(expr),
            Err(err) => self.record_error(err),
        }
    }

    /// Nested AND group, negated.
    pub fn not_group<F: FnOnce(&mut CriteriaBuilder)>(&mut self, build: F) -> &mut Self {
        match Self::build_group(Mode::And, build) {
            Ok(expr) => self.push(Criteria::Not(Box::new(expr))),
            Err(err) => self.record_error(err),
        }
    }
}

/// Compiles queries against one entity schema.
pub struct QueryFindScriptGenerator<'a> {
    schema: &'a EntitySchema,
}

impl<'a> QueryFindScriptGenerator<'a> {
    /// Generator for elements of `schema`.
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    /// One-statement plan for `query`; raw text is forwarded verbatim.
    pub fn generate(&self, query: &GremlinQuery) -> Result<ScriptPlan> {
        match query {
            GremlinQuery::Raw(statement) => Ok(ScriptPlan::single(statement.clone())),
            GremlinQuery::Criteria(criteria) => {
                let source = match self.schema.kind() {
                    EntityKind::Vertex => "g.V()",
                    EntityKind::Edge => "g.E()",
                    EntityKind::Graph => {
                        return Err(MapperError::UnexpectedEntityVariant {
                            operation: "find",
                            variant: "graph",
                            type_name: self.schema.type_name().to_owned(),
                        })
                    }
                };
                let mut script = format!("{source}.hasLabel({})", quote(self.schema.label()));
                match criteria {
                    Criteria::And(children) => {
                        for child in children {
                            script.push('.');
                            script.push_str(&child.to_step()?);
                        }
                    }
                    other => {
                        script.push('.');
                        script.push_str(&other.to_step()?);
                    }
                }
                Ok(ScriptPlan::single(script))
            }
        }
    }
}
