// src/tables/mod.rs

//! Dataset collaborator.
//!
//! A parameter value may name a stored table instead of a value the
//! Orchestrator pushes. The engine asks a [`TableSource`] for the catalog once
//! per connect and fetches the bytes of a table when a parameter names it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;

/// Name of the catalog file inside a tables directory.
pub const CATALOG_FILE: &str = "catalog.toml";

/// Catalog of stored tables: name → identifier.
pub type Catalog = BTreeMap<String, String>;

pub trait TableSource: Send + Sync + std::fmt::Debug {
    fn fetch_identifier_catalog(&self) -> Result<Catalog>;

    /// Raw bytes of table `id`.
    fn fetch_table(&self, id: &str) -> Result<Vec<u8>>;
}

/// Resolve `value` against `catalog`, matching either a table name or a
/// table identifier. Returns the identifier.
pub fn lookup<'a>(catalog: &'a Catalog, value: &str) -> Option<&'a str> {
    if let Some(id) = catalog.get(value) {
        return Some(id.as_str());
    }
    catalog
        .values()
        .find(|id| id.as_str() == value)
        .map(String::as_str)
}

/// Source with no tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTables;

impl TableSource for NoTables {
    fn fetch_identifier_catalog(&self) -> Result<Catalog> {
        Ok(Catalog::new())
    }

    fn fetch_table(&self, id: &str) -> Result<Vec<u8>> {
        Err(EngineError::Table {
            table: id.to_string(),
            reason: "no table source configured".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tables: Catalog,
}

/// Tables stored as plain files in one directory.
///
/// ```toml
/// # <dir>/catalog.toml
/// [tables]
/// patients = "t-0001"
/// ```
///
/// The bytes of table `t-0001` live in `<dir>/t-0001`.
#[derive(Debug, Clone)]
pub struct DirectoryTables {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl DirectoryTables {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableSource for DirectoryTables {
    fn fetch_identifier_catalog(&self) -> Result<Catalog> {
        let path = self.dir.join(CATALOG_FILE);
        if !self.fs.exists(&path) {
            debug!(path = ?path, "no table catalog; treating as empty");
            return Ok(Catalog::new());
        }

        let bytes = self.fs.read(&path)?;
        let text = String::from_utf8(bytes).map_err(|err| EngineError::Table {
            table: CATALOG_FILE.to_string(),
            reason: err.to_string(),
        })?;
        let parsed: CatalogFile = toml::from_str(&text)?;
        debug!(tables = parsed.tables.len(), "table catalog loaded");
        Ok(parsed.tables)
    }

    fn fetch_table(&self, id: &str) -> Result<Vec<u8>> {
        crate::fs::validate_value_name(id)?;
        self.fs
            .read(&self.dir.join(id))
            .map_err(|err| EngineError::Table {
                table: id.to_string(),
                reason: format!("{err:#}"),
            })
    }
}
