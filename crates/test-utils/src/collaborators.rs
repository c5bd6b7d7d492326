use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jobgate::audit::{AuditEvent, AuditSink};
use jobgate::errors::{EngineError, Result};
use jobgate::tables::{Catalog, TableSource};

/// In-memory table source.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    catalog: Arc<Mutex<Catalog>>,
    tables: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    catalog_fetches: Arc<AtomicUsize>,
    table_fetches: Arc<AtomicUsize>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register table `name` with identifier `id` and content `bytes`.
    pub fn with_table(self, name: &str, id: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.catalog
            .lock()
            .unwrap()
            .insert(name.to_string(), id.to_string());
        self.tables
            .lock()
            .unwrap()
            .insert(id.to_string(), bytes.into());
        self
    }

    pub fn catalog_fetches(&self) -> usize {
        self.catalog_fetches.load(Ordering::SeqCst)
    }

    pub fn table_fetches(&self) -> usize {
        self.table_fetches.load(Ordering::SeqCst)
    }
}

impl TableSource for MemoryTables {
    fn fetch_identifier_catalog(&self) -> Result<Catalog> {
        self.catalog_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.catalog.lock().unwrap().clone())
    }

    fn fetch_table(&self, id: &str) -> Result<Vec<u8>> {
        self.table_fetches.fetch_add(1, Ordering::SeqCst);
        self.tables
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::Table {
                table: id.to_string(),
                reason: "unknown table".to_string(),
            })
    }
}

/// Audit sink that keeps every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.name == name)
            .count()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Catalog as the engine reports it in `connect_ack`.
pub fn catalog_of(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, id)| (name.to_string(), id.to_string()))
        .collect()
}
