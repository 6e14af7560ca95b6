//! Named-parameter binding for string-based queries.
//!
//! Templates reference parameters as `:name`. Each parameter is keyed by its
//! declared name and by `p<index>`. Tokens that match no parameter bind
//! `null`.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::element::Value;
use crate::script::literal::value_text;

use super::GremlinQuery;

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r":([a-zA-Z0-9_]+)").expect("parameter token pattern"))
}

/// Ordered parameter values with optional declared names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParameters {
    params: Vec<(Option<String>, Value)>,
}

impl QueryParameters {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unnamed parameter, addressable only as `p<index>`.
    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.params.push((None, value.into()));
        self
    }

    /// Appends a named parameter.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((Some(name.into()), value.into()));
        self
    }

    /// Value bound to `token`, if any.
    ///
    /// Declared names win; every parameter, named or not, is also reachable
    /// as `p<index>`.
    pub fn lookup(&self, token: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(name, _)| name.as_deref() == Some(token))
            .or_else(|| {
                let index = token.strip_prefix('p')?.parse::<usize>().ok()?;
                self.params.get(index)
            })
            .map(|(_, value)| value)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Renders a parameter value: `null`, bare numbers and booleans, and
/// single-quoted text for everything else.
pub fn serialize_parameter(value: &Value) -> String {
    value_text(value)
}

/// Replaces every `:name` token in `template` with its serialized value.
///
/// Tokens are matched on the raw text, quoted literals included: a template
/// containing `'10:30'` has its `:30` rewritten like any other token.
pub fn bind_parameters(template: &str, params: &QueryParameters) -> String {
    token_regex()
        .replace_all(template, |caps: &Captures<'_>| match params.lookup(&caps[1]) {
            Some(value) => serialize_parameter(value),
            None => serialize_parameter(&Value::Null),
        })
        .into_owned()
}

/// Query text paired with the names of the arguments it is called with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringBasedQuery {
    template: String,
    parameter_names: Vec<Option<String>>,
}

impl StringBasedQuery {
    /// Query over `template` with no declared parameters yet.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            parameter_names: Vec::new(),
        }
    }

    /// Declares the next argument under `name`.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.parameter_names.push(Some(name.into()));
        self
    }

    /// Declares the next argument as positional (`p<index>`).
    pub fn positional(mut self) -> Self {
        self.parameter_names.push(None);
        self
    }

    /// Raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Binds call arguments in declaration order.
    ///
    /// Arguments beyond the declared names are treated as positional.
    pub fn bind<I, V>(&self, args: I) -> GremlinQuery
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let params = args
            .into_iter()
            .enumerate()
            .fold(QueryParameters::new(), |params, (index, value)| {
                match self.parameter_names.get(index).cloned().flatten() {
                    Some(name) => params.named(name, value),
                    None => params.positional(value),
                }
            });
        GremlinQuery::Raw(bind_parameters(&self.template, &params))
    }
}
