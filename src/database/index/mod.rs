// Index lifecycle
// Create an index, wait for background indexing, drop it


use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::engine::SearchEngine;
use super::schema::IndexDefinition;
use crate::config::IndexConfig;
use crate::{RagError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 600;

/// How long to wait for an index to finish its initial scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl From<&IndexConfig> for Readiness {
    fn from(config: &IndexConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Create `definition` and wait until the engine has indexed existing documents.
///
/// Fails if the index already exists, if a status check fails, if the index is
/// still indexing after `readiness.max_attempts` checks, or when `cancel` fires.
#[inline]
pub async fn create_index<E>(
    engine: &E,
    definition: &IndexDefinition,
    readiness: Readiness,
    cancel: &CancellationToken,
) -> Result<()>
where
    E: SearchEngine + ?Sized,
{
    info!(
        "Creating index {} over prefixes {:?}",
        definition.name, definition.prefixes
    );
    engine.create_index(definition).await?;
    wait_until_ready(engine, &definition.name, readiness, cancel).await
}

/// Poll index status until indexing completes
#[inline]
pub async fn wait_until_ready<E>(
    engine: &E,
    index: &str,
    readiness: Readiness,
    cancel: &CancellationToken,
) -> Result<()>
where
    E: SearchEngine + ?Sized,
{
    for attempt in 1..=readiness.max_attempts {
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled(format!("waiting for index {}", index)));
        }

        let status = tokio::select! {
            () = cancel.cancelled() => {
                return Err(RagError::Cancelled(format!("waiting for index {}", index)));
            }
            status = engine.index_status(index) => status?,
        };
        if !status.indexing {
            info!("Index {} ready with {} documents", index, status.num_docs);
            return Ok(());
        }

        debug!(
            "Index {} still indexing ({:.0}%), attempt {}/{}",
            index,
            status.percent_indexed * 100.0,
            attempt,
            readiness.max_attempts
        );

        if attempt < readiness.max_attempts {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(RagError::Cancelled(format!("waiting for index {}", index)));
                }
                () = tokio::time::sleep(readiness.poll_interval) => {}
            }
        }
    }

    Err(RagError::IndexNotReady {
        index: index.to_string(),
        attempts: readiness.max_attempts,
    })
}

/// Drop an index, optionally deleting every document it covers
#[inline]
pub async fn drop_index<E>(engine: &E, index: &str, delete_documents: bool) -> Result<()>
where
    E: SearchEngine + ?Sized,
{
    engine.drop_index(index, delete_documents).await
}
