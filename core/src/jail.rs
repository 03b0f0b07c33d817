//! Jail
//!
//! Registry of running cells keyed by id. The jail only tracks cells; each
//! one still owns its own loop thread and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cell::{Cell, CellBuilder, CellError};
use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum JailError {
    #[error("cell {0} already exists")]
    AlreadyExists(String),

    #[error("cell {0} not found")]
    NotFound(String),

    #[error("cell {id}: {source}")]
    Cell {
        id: String,
        #[source]
        source: CellError,
    },
}

#[derive(Default)]
pub struct Jail {
    config: Config,
    cells: Mutex<HashMap<String, Arc<Cell>>>,
}

impl Jail {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create and start a cell with every binding
    pub async fn create_cell(&self, id: &str) -> Result<Arc<Cell>, JailError> {
        self.create_cell_with(id, |builder| builder).await
    }

    /// Create a cell, adjusting its builder first
    ///
    /// The jail's configuration is applied before `customize` runs.
    pub async fn create_cell_with<F>(&self, id: &str, customize: F) -> Result<Arc<Cell>, JailError>
    where
        F: FnOnce(CellBuilder) -> CellBuilder,
    {
        let mut cells = self.cells.lock().await;
        if cells.contains_key(id) {
            return Err(JailError::AlreadyExists(id.to_string()));
        }

        let builder = Cell::builder(id).config(&self.config);
        let cell = customize(builder).build().map_err(|source| JailError::Cell {
            id: id.to_string(),
            source,
        })?;
        let cell = Arc::new(cell);
        cells.insert(id.to_string(), cell.clone());
        Ok(cell)
    }

    /// Create a cell under a fresh uuid
    pub async fn create_anonymous_cell(&self) -> Result<Arc<Cell>, JailError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.create_cell(&id).await
    }

    pub async fn cell(&self, id: &str) -> Option<Arc<Cell>> {
        self.cells.lock().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cells.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cells.lock().await.is_empty()
    }

    /// Remove a cell and stop it
    ///
    /// The cell leaves the registry even when stopping it fails.
    pub async fn stop_cell(&self, id: &str) -> Result<(), JailError> {
        let cell = self
            .cells
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| JailError::NotFound(id.to_string()))?;

        cell.stop().await.map_err(|source| JailError::Cell {
            id: id.to_string(),
            source,
        })?;
        info!("Cell {} removed from jail", id);
        Ok(())
    }

    /// Stop every cell concurrently, returning the ones that failed
    pub async fn stop_all(&self) -> Vec<JailError> {
        let cells: Vec<(String, Arc<Cell>)> = self.cells.lock().await.drain().collect();

        let mut stopping = tokio::task::JoinSet::new();
        for (id, cell) in cells {
            stopping.spawn(async move { (id, cell.stop().await) });
        }

        let mut failures = Vec::new();
        while let Some(joined) = stopping.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(source))) => {
                    warn!("Cell {} failed to stop cleanly: {}", id, source);
                    failures.push(JailError::Cell { id, source });
                }
                Err(e) => warn!("Stop task panicked: {}", e),
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Binding;
    use crate::event_loop::{CallError, LoopError};
    use crate::interpreter::Val;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_lookup() {
        let jail = Jail::default();
        assert!(jail.is_empty().await);

        let cell = jail.create_cell("alpha").await.unwrap();
        assert_eq!(cell.id(), "alpha");
        assert_eq!(jail.len().await, 1);

        let found = jail.cell("alpha").await.unwrap();
        assert_eq!(found.run_script("1 + 1").await.unwrap(), Val::Num(2.0));
        assert!(jail.cell("beta").await.is_none());

        jail.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_id_rejected() {
        let jail = Jail::default();
        jail.create_cell("same").await.unwrap();
        let err = jail.create_cell("same").await.unwrap_err();
        assert!(matches!(err, JailError::AlreadyExists(id) if id == "same"));
        assert_eq!(jail.len().await, 1);
        jail.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cells_are_isolated() {
        let jail = Jail::default();
        let a = jail.create_cell("a").await.unwrap();
        let b = jail.create_cell("b").await.unwrap();

        a.run_script("let secret = 'a'").await.unwrap();
        assert_eq!(
            b.run_script("typeof secret").await.unwrap(),
            Val::Str("undefined".into())
        );
        assert_eq!(jail.ids().await, vec!["a".to_string(), "b".to_string()]);
        assert!(jail.stop_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_anonymous_cells_get_uuids() {
        let jail = Jail::default();
        let first = jail.create_anonymous_cell().await.unwrap();
        let second = jail.create_anonymous_cell().await.unwrap();

        assert_ne!(first.id(), second.id());
        assert!(uuid::Uuid::parse_str(first.id()).is_ok());
        assert_eq!(jail.len().await, 2);
        jail.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_cell_removes_it() {
        let jail = Jail::default();
        let cell = jail.create_cell("gone").await.unwrap();

        jail.stop_cell("gone").await.unwrap();
        assert!(jail.cell("gone").await.is_none());
        assert_eq!(cell.run_script("1").await, Err(CallError::LoopStopped));

        let err = jail.stop_cell("gone").await.unwrap_err();
        assert!(matches!(err, JailError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_all_reports_failures() {
        let mut config = Config::default();
        config.cell.max_call_depth = 50;
        let jail = Jail::new(config);

        jail.create_cell("fine").await.unwrap();
        let broken = jail.create_cell("broken").await.unwrap();
        let faulted = broken.run_script("function f() { return f() } f()").await;
        assert!(matches!(faulted, Err(CallError::Fatal(_))));

        let failures = jail.stop_all().await;
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            JailError::Cell { id, source } => {
                assert_eq!(id, "broken");
                assert!(matches!(source, CellError::Loop(LoopError::Fatal(_))));
            }
            other => panic!("unexpected failure {:?}", other),
        }
        assert!(jail.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_cell_with_custom_builder() {
        let jail = Jail::default();
        let cell = jail
            .create_cell_with("quiet", |builder| builder.bindings([Binding::Console]))
            .await
            .unwrap();
        assert_eq!(
            cell.run_script("typeof fetch").await.unwrap(),
            Val::Str("undefined".into())
        );

        let err = jail
            .create_cell_with("twice", |builder| {
                builder.bindings([Binding::Fetch, Binding::Fetch])
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JailError::Cell { source: CellError::Registration(_), .. }));
        assert!(jail.cell("twice").await.is_none());

        jail.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_jail_config_reaches_cells() {
        let mut config = Config::default();
        config.cell.stop_timeout_ms = 150;
        let jail = Jail::new(config);
        let cell = jail.create_cell("slow").await.unwrap();
        cell.run_script("function spin() { let end = Date.now() + 500; while (Date.now() < end) {} }")
            .await
            .unwrap();

        let spinning = cell.clone();
        tokio::spawn(async move {
            let _ = spinning.call_async("spin", vec![]).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = jail.stop_cell("slow").await.unwrap_err();
        assert!(matches!(
            err,
            JailError::Cell { source: CellError::StopTimeout(d), .. } if d == Duration::from_millis(150)
        ));
    }
}
