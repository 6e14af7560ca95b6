#![forbid(unsafe_code)]

//! Query subsystem.
//!
//! Covers criteria-based finds, string queries with named parameters and the
//! range/count rewriting used for paged raw queries.

/// Criteria trees and their compilation into filter steps.
///
/// Provides a fluent builder in the same shape as the predicate builders used
/// elsewhere in the crate.
pub mod criteria;

/// Paging helpers: range restriction, count derivation and page metadata.
pub mod page;

/// `:name` parameter binding for string-based queries.
pub mod template;

pub use criteria::{Criteria, CriteriaBuilder, QueryFindScriptGenerator};
pub use page::{derive_count_query, paginate, Page, Pageable};
pub use template::{bind_parameters, QueryParameters, StringBasedQuery};

/// A find query: a criteria tree or verbatim statement text.
#[derive(Clone, Debug, PartialEq)]
pub enum GremlinQuery {
    /// Compiled against the target schema.
    Criteria(Criteria),
    /// Forwarded as written.
    Raw(String),
}

impl From<Criteria> for GremlinQuery {
    fn from(criteria: Criteria) -> Self {
        GremlinQuery::Criteria(criteria)
    }
}

impl From<String> for GremlinQuery {
    fn from(statement: String) -> Self {
        GremlinQuery::Raw(statement)
    }
}

impl From<&str> for GremlinQuery {
    fn from(statement: &str) -> Self {
        GremlinQuery::Raw(statement.to_owned())
    }
}
