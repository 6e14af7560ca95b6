//! Object-to-graph mapping over Gremlin servers.
//!
//! Typed records are described by an [`EntitySchema`] and mapped onto
//! vertices, edges or whole graphs. The [`GremlinTemplate`] generates the
//! traversal scripts to persist and look them up, dispatches them through a
//! shared [`GremlinClient`] and reads the server's rows back into records.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gremlin_mapper::{
//!     EntitySchema, GraphEntity, GremlinConfig, GremlinFactory, GremlinTemplate, IdType,
//!     PropertyType,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     id: Option<String>,
//!     name: String,
//! }
//!
//! impl GraphEntity for Person {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::vertex("Person")
//!             .generated_id("id", IdType::String)
//!             .property("name", PropertyType::String)
//!             .build()
//!     }
//! }
//!
//! # async fn run() -> gremlin_mapper::Result<()> {
//! let factory = GremlinFactory::new(GremlinConfig::load(None)?)?;
//! let template = GremlinTemplate::new(Arc::new(factory));
//! let stored = template.insert(&Person { id: None, name: "ada".into() }).await?;
//! let found: Option<Person> = template.find_by_id(stored.id.clone().unwrap_or_default()).await?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod convert;
pub mod element;
pub mod error;
pub mod query;
pub mod result;
pub mod schema;
pub mod script;
pub mod telemetry;
pub mod template;

pub use client::{GremlinClient, GremlinConfig, GremlinFactory, Serializer};
#[cfg(feature = "http")]
pub use client::HttpGremlinClient;
pub use convert::MappingConverter;
pub use element::{ElementId, GraphElement, IdField, IdType, Value};
pub use error::{MapperError, Result};
pub use query::{GremlinQuery, Page, Pageable, QueryParameters, StringBasedQuery};
pub use result::{GremlinResult, ResultReader};
pub use schema::{EntityKind, EntitySchema, GraphEntity, PropertyType, SchemaRegistry};
pub use script::{ScriptGenerator, ScriptOperation, ScriptPlan, StatementBatch};
pub use template::GremlinTemplate;
