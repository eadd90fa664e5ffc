use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{resolve_server_values, DocumentStore};
use crate::error::{CheckoutError, Result};

/// How a [`MemoryDocumentStore`] misbehaves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    Healthy,
    /// Every operation fails as if the network were down
    Unreachable,
    /// Every operation fails as if credentials were rejected
    Unauthorized,
    /// Writes under this path prefix fail transiently; everything else works
    FailWritesUnder(String),
    /// Reads fail transiently; writes work
    FailReads,
}

/// In-process document store with injectable failures.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Value>>,
    failure: RwLock<FailureMode>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mode: FailureMode) -> Self {
        let store = Self::new();
        store.set_failure(mode);
        store
    }

    pub fn set_failure(&self, mode: FailureMode) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = mode;
        }
    }

    /// Number of documents whose path starts with `prefix`.
    pub fn count_under(&self, prefix: &str) -> usize {
        self.documents
            .read()
            .map(|docs| docs.keys().filter(|k| k.starts_with(prefix)).count())
            .unwrap_or(0)
    }

    /// Snapshot of the documents whose path starts with `prefix`.
    pub fn documents_under(&self, prefix: &str) -> Vec<(String, Value)> {
        self.documents
            .read()
            .map(|docs| {
                docs.iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn failure(&self) -> FailureMode {
        self.failure
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn check_common(&self, failure: &FailureMode) -> Result<()> {
        match failure {
            FailureMode::Unreachable => Err(CheckoutError::transient("store unreachable")),
            FailureMode::Unauthorized => {
                Err(CheckoutError::configuration("store rejected credentials"))
            }
            _ => Ok(()),
        }
    }

    fn lock_error() -> CheckoutError {
        CheckoutError::Internal("memory store lock poisoned".into())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn set(&self, path: &str, document: &Value) -> Result<()> {
        let failure = self.failure();
        self.check_common(&failure)?;
        if let FailureMode::FailWritesUnder(prefix) = &failure
            && path.starts_with(prefix.as_str())
        {
            return Err(CheckoutError::transient(format!("write to {} failed", path)));
        }

        let mut document = document.clone();
        resolve_server_values(&mut document, Utc::now().timestamp_millis());
        self.documents
            .write()
            .map_err(|_| Self::lock_error())?
            .insert(path.to_string(), document);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let failure = self.failure();
        self.check_common(&failure)?;
        if failure == FailureMode::FailReads {
            return Err(CheckoutError::transient(format!("read of {} failed", path)));
        }

        Ok(self
            .documents
            .read()
            .map_err(|_| Self::lock_error())?
            .get(path)
            .cloned())
    }
}
