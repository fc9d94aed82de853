//! Schema source: loads descriptor files and publishes pools to subscribers.
//!
//! A [`SchemaSource`] owns the configured paths and the sending side of a
//! `tokio::sync::watch` channel. Every node that needs the schema holds a
//! [`SchemaHandle`] (the receiving side) and reads the latest pool on each
//! message, so a reload is observed by the next resolution.
//!
//! # Example
//!
//! ```no_run
//! use protowire::schema::{SchemaConfig, SchemaSource};
//!
//! let source = SchemaSource::open(&SchemaConfig::new("schemas/reading.json"));
//! let handle = source.subscribe();
//!
//! // later, after the file changed on disk
//! if let Err(e) = source.reload() {
//!     eprintln!("keeping previous schema: {e}");
//! }
//! assert!(handle.current().is_some());
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info};

use super::loader::LoadOptions;
use super::pool::DescriptorPool;
use crate::error::{LoadError, PipelineError, Result};

type PoolSlot = Option<Arc<DescriptorPool>>;

/// Schema node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaConfig {
    /// Comma separated descriptor file paths.
    pub protopath: String,
    /// Keep field names exactly as declared.
    pub keep_case: bool,
}

impl SchemaConfig {
    pub fn new(protopath: impl Into<String>) -> Self {
        Self {
            protopath: protopath.into(),
            keep_case: false,
        }
    }

    pub fn with_keep_case(mut self, keep_case: bool) -> Self {
        self.keep_case = keep_case;
        self
    }

    /// Parse from the host's JSON node configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Individual paths, trimmed, empty entries skipped.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.protopath
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            keep_case: self.keep_case,
        }
    }
}

/// Owner of the current schema.
#[derive(Debug)]
pub struct SchemaSource {
    paths: Vec<PathBuf>,
    options: LoadOptions,
    tx: watch::Sender<PoolSlot>,
}

impl SchemaSource {
    /// Create a source and attempt the initial load.
    ///
    /// A failed load is logged and leaves the source not ready; nodes
    /// resolving against it report "schema not ready" until a reload
    /// succeeds.
    pub fn open(config: &SchemaConfig) -> Self {
        let source = Self::unloaded(config.paths(), config.load_options());
        if let Err(e) = source.reload() {
            error!(paths = ?source.paths, error = %e, "Proto file could not be loaded");
        }
        source
    }

    /// Create a source without loading anything.
    pub fn unloaded(paths: Vec<PathBuf>, options: LoadOptions) -> Self {
        let (tx, _) = watch::channel(None);
        Self { paths, options, tx }
    }

    /// Create a source serving an already built pool.
    pub fn from_pool(pool: DescriptorPool) -> Self {
        let paths = pool.sources().to_vec();
        let (tx, _) = watch::channel(Some(Arc::new(pool)));
        Self {
            paths,
            options: LoadOptions::default(),
            tx,
        }
    }

    /// Re-read the configured files and publish the result.
    ///
    /// # Errors
    ///
    /// The load error; the previously published pool stays current.
    pub fn reload(&self) -> std::result::Result<Arc<DescriptorPool>, LoadError> {
        let pool = Arc::new(DescriptorPool::load(&self.paths, self.options)?);
        info!(
            paths = ?self.paths,
            types = pool.list_types().len(),
            "Protobuf schema loaded"
        );
        self.tx.send_replace(Some(Arc::clone(&pool)));
        Ok(pool)
    }

    /// Publish an externally built pool.
    pub fn replace(&self, pool: DescriptorPool) {
        self.tx.send_replace(Some(Arc::new(pool)));
    }

    /// New subscriber seeing the current and all future pools.
    pub fn subscribe(&self) -> SchemaHandle {
        SchemaHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> Option<Arc<DescriptorPool>> {
        self.tx.borrow().clone()
    }

    /// Message type names of the current pool; empty when not loaded.
    pub fn types(&self) -> Vec<String> {
        self.current()
            .map(|pool| pool.list_types())
            .unwrap_or_default()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Read side of a [`SchemaSource`].
///
/// Cheap to clone. Keeps serving the last published pool after the source
/// is dropped.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    rx: watch::Receiver<PoolSlot>,
}

impl SchemaHandle {
    /// Handle permanently serving `pool`.
    pub fn fixed(pool: DescriptorPool) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(pool)));
        Self { rx }
    }

    /// Handle that never becomes ready.
    pub fn unavailable() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    /// Latest published pool.
    pub fn current(&self) -> Option<Arc<DescriptorPool>> {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the next publication.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, Write};

    use super::*;

    const V1: &str = r#"{"nested": {"First": {"fields": {"a": {"type": "int32", "id": 1}}}}}"#;
    const V2: &str = r#"{"nested": {"Second": {"fields": {"b": {"type": "int32", "id": 1}}}}}"#;

    fn write_file(file: &mut tempfile::NamedTempFile, content: &str) {
        let f = file.as_file_mut();
        f.set_len(0).unwrap();
        f.rewind().unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_config_paths() {
        let config = SchemaConfig::new(" a.json, b.json ,,");
        assert_eq!(config.paths(), vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);

        let parsed = SchemaConfig::from_json(r#"{"protopath": "x.json", "keepCase": true}"#).unwrap();
        assert_eq!(parsed, SchemaConfig::new("x.json").with_keep_case(true));
    }

    #[test]
    fn test_open_failure_not_ready() {
        let source = SchemaSource::open(&SchemaConfig::new("/no/such/file.json"));
        assert!(source.current().is_none());
        assert!(source.types().is_empty());
        assert!(!source.subscribe().is_ready());
    }

    #[test]
    fn test_reload_publishes_and_failure_keeps_previous() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_file(&mut file, V1);

        let config = SchemaConfig::new(file.path().to_string_lossy());
        let source = SchemaSource::open(&config);
        let handle = source.subscribe();
        assert_eq!(source.types(), vec!["First"]);

        write_file(&mut file, V2);
        source.reload().unwrap();
        let pool = handle.current().unwrap();
        assert_eq!(pool.list_types(), vec!["Second"]);

        write_file(&mut file, "{ broken");
        assert!(source.reload().is_err());
        assert_eq!(handle.current().unwrap().list_types(), vec!["Second"]);
    }

    #[test]
    fn test_handle_survives_source() {
        let source = SchemaSource::from_pool(DescriptorPool::from_json(V1, LoadOptions::default()).unwrap());
        let handle = source.subscribe();
        drop(source);
        assert!(handle.is_ready());
        assert!(SchemaHandle::unavailable().current().is_none());
    }

    #[tokio::test]
    async fn test_handle_notified_on_replace() {
        let source = SchemaSource::unloaded(Vec::new(), LoadOptions::default());
        let mut handle = source.subscribe();
        source.replace(DescriptorPool::from_json(V2, LoadOptions::default()).unwrap());
        handle.changed().await.unwrap();
        assert_eq!(handle.current().unwrap().list_types(), vec!["Second"]);
    }
}
