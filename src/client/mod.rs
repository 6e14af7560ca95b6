//! Connection to a Gremlin server.
//!
//! [`GremlinClient`] is the transport seam: it submits one statement and
//! returns the decoded rows. [`GremlinFactory`] owns the lazily built client
//! and [`dispatch`] runs a [`ScriptPlan`] through it.

pub mod config;
pub mod factory;
#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, trace};

use crate::error::Result;
use crate::result::GremlinResult;
use crate::script::{ScriptPlan, StatementBatch};

pub use config::{GremlinConfig, Serializer};
pub use factory::GremlinFactory;
#[cfg(feature = "http")]
pub use http::HttpGremlinClient;

/// Submits statements to a Gremlin server.
#[async_trait]
pub trait GremlinClient: Send + Sync {
    /// Runs one statement and returns its rows.
    async fn submit(&self, statement: &str) -> Result<Vec<GremlinResult>>;

    /// Releases transport resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Submits every statement of `batch` concurrently.
///
/// Rows are returned per statement, in statement order. The first failure
/// aborts the batch; statements still in flight are dropped.
pub async fn dispatch_batch(
    client: &dyn GremlinClient,
    batch: StatementBatch,
) -> Result<Vec<Vec<GremlinResult>>> {
    let statements: Vec<String> = batch.into_iter().collect();
    debug!(statements = statements.len(), "dispatching batch");
    try_join_all(statements.iter().map(|statement| async move {
        debug!(%statement, "submitting statement");
        let rows = client.submit(statement).await?;
        trace!(%statement, rows = rows.len(), "statement completed");
        Ok::<_, crate::error::MapperError>(rows)
    }))
    .await
}

/// Runs the batches of `plan` in order and concatenates their rows.
pub async fn dispatch(client: &dyn GremlinClient, plan: ScriptPlan) -> Result<Vec<GremlinResult>> {
    let mut rows = Vec::new();
    for batch in plan {
        for statement_rows in dispatch_batch(client, batch).await? {
            rows.extend(statement_rows);
        }
    }
    Ok(rows)
}
