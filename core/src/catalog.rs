//! Catalog: a registry of named tables rooted at a storage URI.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::batch::{RecordBatch, Schema};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::persistence::{self, TableFiles};
use crate::table::Table;

const MEMORY_SCHEME: &str = "memory://";
const FILE_SCHEME: &str = "file://";
const TABLE_DIR_SUFFIX: &str = ".table";

/// Starts opening a catalog at `uri`.
///
/// Accepted forms are a plain filesystem path, `file://<path>` and
/// `memory://`. The configuration defaults to [`CatalogConfig::default`];
/// use [`ConnectBuilder::config`] with [`CatalogConfig::from_env`] to pick
/// up `LODESTONE_*` variables.
pub fn connect(uri: &str) -> ConnectBuilder {
    ConnectBuilder {
        uri: uri.to_string(),
        config: None,
        storage_options: BTreeMap::new(),
    }
}

#[derive(Debug, Clone)]
pub struct ConnectBuilder {
    uri: String,
    config: Option<CatalogConfig>,
    storage_options: BTreeMap<String, String>,
}

impl ConnectBuilder {
    pub fn config(mut self, config: CatalogConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds one storage option. Recognized keys override the config;
    /// unknown keys are kept but have no effect.
    pub fn storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }

    pub fn execute(self) -> Result<Catalog> {
        let root = parse_uri(&self.uri)?;
        let mut config = self.config.unwrap_or_default();
        config
            .apply_storage_options(&self.storage_options)
            .map_err(|error| Error::invalid_argument(format!("{error:#}")))?;

        let tables = DashMap::new();
        if let Some(root) = &root {
            fs::create_dir_all(root)?;
            for table in load_tables(root, &config)? {
                tables.insert(table.name().to_string(), table);
            }
        }

        tracing::info!(
            uri = %self.uri,
            persistent = root.is_some(),
            tables = tables.len(),
            "catalog opened"
        );
        Ok(Catalog {
            inner: Arc::new(CatalogInner {
                uri: self.uri,
                root,
                config,
                storage_options: self.storage_options,
                tables,
            }),
        })
    }
}

struct CatalogInner {
    uri: String,
    /// `None` for `memory://` catalogs.
    root: Option<PathBuf>,
    config: CatalogConfig,
    storage_options: BTreeMap<String, String>,
    tables: DashMap<String, Table>,
}

/// Handle to an open catalog. Clones share the same registry.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("uri", &self.inner.uri)
            .field("tables", &self.inner.tables.len())
            .finish()
    }
}

impl Catalog {
    /// The URI this catalog was opened with, verbatim.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    pub fn storage_options(&self) -> &BTreeMap<String, String> {
        &self.inner.storage_options
    }

    /// Creates `name` at version 1 holding the rows of `initial`.
    pub fn create(&self, name: &str, schema: Schema, initial: Vec<RecordBatch>) -> Result<Table> {
        validate_table_name(name)?;
        let rows: usize = initial.iter().map(RecordBatch::num_rows).sum();

        let table = match self.inner.tables.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(Error::already_exists(format!(
                    "table '{name}' already exists"
                )));
            }
            Entry::Vacant(slot) => {
                let files = self.table_files(name);
                let created = Table::create(
                    name.to_string(),
                    schema,
                    self.inner.config.clone(),
                    files.clone(),
                    initial,
                );
                let table = match created {
                    Ok(table) => table,
                    Err(error) => {
                        if let Some(files) = &files {
                            if let Err(cleanup) = persistence::remove_table_files(files) {
                                tracing::warn!(
                                    table = %name,
                                    error = %cleanup,
                                    "failed to clean up after aborted create"
                                );
                            }
                        }
                        return Err(error);
                    }
                };
                slot.insert(table.clone());
                table
            }
        };

        tracing::info!(table = %name, rows, "created table");
        Ok(table)
    }

    pub fn open(&self, name: &str) -> Result<Table> {
        self.inner
            .tables
            .get(name)
            .map(|table| table.value().clone())
            .ok_or_else(|| Error::not_found(format!("table '{name}' does not exist")))
    }

    /// Removes `name` and its files. Existing handles to it start failing
    /// with `NotFound`.
    ///
    /// The registry slot stays occupied until the files are gone, so a
    /// `create` of the same name waits for the drop to finish.
    pub fn drop(&self, name: &str) -> Result<()> {
        match self.inner.tables.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                entry.get().mark_dropped()?;
                entry.remove();
            }
            Entry::Vacant(_) => {
                return Err(Error::not_found(format!("table '{name}' does not exist")));
            }
        }
        tracing::info!(table = %name, "dropped table");
        Ok(())
    }

    pub fn drop_all(&self) -> Result<()> {
        let names: Vec<String> = self
            .inner
            .tables
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            if let Entry::Occupied(entry) = self.inner.tables.entry(name) {
                entry.get().mark_dropped()?;
                entry.remove();
            }
        }
        tracing::info!(uri = %self.inner.uri, "dropped all tables");
        Ok(())
    }

    /// One page of table names in ascending byte order.
    ///
    /// Names strictly greater than `start_after` are returned, at most
    /// `limit` of them. A page shorter than `limit` is the last one.
    pub fn list_names(&self, limit: Option<usize>, start_after: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .tables
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| start_after.map_or(true, |after| name.as_str() > after))
            .collect();
        names.sort_unstable();
        if let Some(limit) = limit {
            names.truncate(limit);
        }
        names
    }

    pub fn create_namespace(&self, namespace: &[&str]) -> Result<()> {
        Err(namespaces_unsupported("create", namespace))
    }

    pub fn list_namespaces(&self, parent: &[&str]) -> Result<Vec<String>> {
        Err(namespaces_unsupported("list", parent))
    }

    pub fn drop_namespace(&self, namespace: &[&str]) -> Result<()> {
        Err(namespaces_unsupported("drop", namespace))
    }

    pub fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        Err(Error::not_supported(format!(
            "renaming table '{from}' to '{to}' is not supported"
        )))
    }

    /// Releases this handle's view of the registry. Table handles obtained
    /// earlier stay usable.
    pub fn close(self) {
        tracing::debug!(uri = %self.inner.uri, "catalog handle closed");
    }

    fn table_files(&self, name: &str) -> Option<TableFiles> {
        self.inner
            .root
            .as_ref()
            .map(|root| TableFiles::new(root.join(format!("{name}{TABLE_DIR_SUFFIX}"))))
    }
}

fn namespaces_unsupported(operation: &str, namespace: &[&str]) -> Error {
    Error::not_supported(format!(
        "cannot {operation} namespace '{}': namespaces are not supported",
        namespace.join(".")
    ))
}

fn parse_uri(uri: &str) -> Result<Option<PathBuf>> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_argument("catalog uri must not be empty"));
    }
    if trimmed.starts_with(MEMORY_SCHEME) {
        return Ok(None);
    }
    if let Some(path) = trimmed.strip_prefix(FILE_SCHEME) {
        if path.is_empty() {
            return Err(Error::invalid_argument(format!(
                "catalog uri '{uri}' has no path"
            )));
        }
        return Ok(Some(PathBuf::from(path)));
    }
    if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(Error::not_supported(format!(
            "storage scheme '{scheme}' is not supported"
        )));
    }
    Ok(Some(PathBuf::from(trimmed)))
}

pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("table name must not be empty"));
    }
    if let Some(invalid) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')))
    {
        return Err(Error::invalid_argument(format!(
            "table name '{name}' contains invalid character '{invalid}'"
        )));
    }
    Ok(())
}

fn load_tables(root: &Path, config: &CatalogConfig) -> Result<Vec<Table>> {
    let mut tables = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(name) = dir_name.strip_suffix(TABLE_DIR_SUFFIX) else {
            continue;
        };

        let files = TableFiles::new(path.clone());
        if !files.is_initialized() {
            tracing::warn!(path = %path.display(), "skipping table directory without snapshot");
            continue;
        }
        let loaded = persistence::load_table(&files, config)?;
        if loaded.name != name {
            return Err(Error::internal(format!(
                "table directory '{dir_name}' holds table '{}'",
                loaded.name
            )));
        }
        tracing::debug!(
            table = %loaded.name,
            version = loaded.state.version,
            rows = loaded.state.data.num_rows(),
            wal_records = loaded.wal_records,
            "loaded table"
        );
        tables.push(Table::from_state(
            loaded.name,
            loaded.schema,
            config.clone(),
            Some(files),
            loaded.state,
            loaded.wal_records,
        ));
    }
    Ok(tables)
}
