//! Configuration management for `taskstore`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`TASKSTORE_*`)
//! 3. Store config (.taskstore/config.yaml)
//! 4. Defaults
//!
//! Everything here is resolved once at process start and handed to the
//! storage layer as an immutable [`StorageOptions`].

use crate::error::{Result, StoreError};
use crate::model::Status;
use crate::storage::SqliteStorage;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the database and config file.
pub const STORE_DIR_NAME: &str = ".taskstore";
/// Default database filename inside the store directory.
const DEFAULT_DB_FILENAME: &str = "tasks.db";
/// Default busy timeout.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default dependency tree depth cap.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 50;

/// Status sets used by the readiness and stale queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSets {
    /// Statuses a task can be worked from; also the statuses whose parents block.
    pub actionable: Vec<Status>,
    /// Skipped by the stale query when no explicit status set is given.
    pub stale_excluded: Vec<Status>,
}

impl Default for StatusSets {
    fn default() -> Self {
        Self {
            actionable: vec![
                Status::Open,
                Status::InProgress,
                Status::Blocked,
                Status::Deferred,
                Status::Pinned,
            ],
            stale_excluded: vec![Status::Closed, Status::Tombstone],
        }
    }
}

/// Immutable settings injected into [`SqliteStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    pub busy_timeout: Duration,
    pub statuses: StatusSets,
    pub max_tree_depth: usize,
    /// Prefix for generated task ids.
    pub id_prefix: String,
    /// Reject dependency edges between different project prefixes.
    pub enforce_project_scope: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            statuses: StatusSets::default(),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            id_prefix: "ts".to_string(),
            enforce_project_scope: false,
        }
    }
}

impl StorageOptions {
    /// Build options from a merged config layer; missing keys keep defaults.
    ///
    /// # Errors
    ///
    /// Returns a config error for unparsable numbers, booleans or statuses.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let mut options = Self::default();

        if let Some(ms) = parse_number::<u64>(layer, "busy-timeout-ms")? {
            options.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(depth) = parse_number::<usize>(layer, "max-tree-depth")? {
            if depth == 0 {
                return Err(StoreError::Config(
                    "max-tree-depth must be at least 1".to_string(),
                ));
            }
            options.max_tree_depth = depth;
        }
        if let Some(prefix) = layer.get("id-prefix") {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(StoreError::Config("id-prefix must not be empty".to_string()));
            }
            options.id_prefix = prefix.to_string();
        }
        if let Some(raw) = layer.get("enforce-project-scope") {
            options.enforce_project_scope = parse_bool(raw).ok_or_else(|| {
                StoreError::Config(format!("enforce-project-scope: not a boolean: {raw}"))
            })?;
        }
        if let Some(raw) = layer.get("statuses.actionable") {
            options.statuses.actionable = parse_status_list("statuses.actionable", raw)?;
        }
        if let Some(raw) = layer.get("statuses.stale-excluded") {
            options.statuses.stale_excluded = parse_status_list("statuses.stale-excluded", raw)?;
        }

        Ok(options)
    }
}

/// Resolved paths for this store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub store_dir: PathBuf,
    pub db_path: PathBuf,
}

impl ConfigPaths {
    /// Resolve the database path, honoring `--db` and `TASKSTORE_DB`.
    #[must_use]
    pub fn resolve(store_dir: &Path, db_override: Option<&PathBuf>) -> Self {
        let db_path = db_override.cloned().unwrap_or_else(|| {
            env::var("TASKSTORE_DB")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| store_dir.join(DEFAULT_DB_FILENAME), PathBuf::from)
        });

        Self {
            store_dir: store_dir.to_path_buf(),
            db_path,
        }
    }
}

/// Discover the active `.taskstore` directory.
///
/// Honors `TASKSTORE_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns an error if no store directory is found or the CWD cannot be read.
pub fn discover_store_dir(start: Option<&Path>) -> Result<PathBuf> {
    let env_override = env::var("TASKSTORE_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    discover_store_dir_with_env(start, env_override.as_deref())
}

fn discover_store_dir_with_env(start: Option<&Path>, env_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(dunce::canonicalize(path)?);
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(STORE_DIR_NAME);
        if candidate.is_dir() {
            return Ok(dunce::canonicalize(candidate)?);
        }

        if !current.pop() {
            break;
        }
    }

    Err(StoreError::NotInitialized)
}

/// A flat key/value configuration layer. Keys are normalized to
/// lower-case with `-` separators; nested YAML keys are joined with `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: HashMap<String, String>,
}

impl ConfigLayer {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.values.get(&normalize_key(key))
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from `TASKSTORE_*` environment variables.
    ///
    /// `TASKSTORE_STATUSES__ACTIONABLE` maps to `statuses.actionable`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix("TASKSTORE_") else {
                continue;
            };
            // Location variables are consumed by path resolution.
            if matches!(stripped, "DIR" | "DB") {
                continue;
            }
            layer.insert(&stripped.to_lowercase().replace("__", "."), value);
        }
        layer
    }
}

/// Load options for a store directory: defaults, then config.yaml, then env.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or holds invalid values.
pub fn load_options(store_dir: &Path) -> Result<StorageOptions> {
    let project = ConfigLayer::from_yaml(&store_dir.join("config.yaml"))?;
    let merged = ConfigLayer::merge_layers(&[project, ConfigLayer::from_env()]);
    StorageOptions::from_layer(&merged)
}

/// Open storage using resolved config, returning the storage and paths used.
///
/// # Errors
///
/// Returns an error if config cannot be loaded or the database cannot be opened.
pub fn open_storage(
    store_dir: &Path,
    db_override: Option<&PathBuf>,
) -> Result<(SqliteStorage, ConfigPaths)> {
    let paths = ConfigPaths::resolve(store_dir, db_override);
    let options = load_options(store_dir)?;
    let storage = SqliteStorage::open_with_options(&paths.db_path, options)?;
    Ok((storage, paths))
}

/// Resolve store directory and database path without opening anything.
///
/// Without a discoverable `.taskstore` directory an explicit database path
/// (`--db` or `TASKSTORE_DB`) is still usable; its parent directory then
/// supplies `config.yaml`.
///
/// # Errors
///
/// Returns [`StoreError::NotInitialized`] when neither a store directory
/// nor a database path is available.
pub fn resolve_store_paths(db_override: Option<&PathBuf>) -> Result<ConfigPaths> {
    let store_dir = match discover_store_dir(None) {
        Ok(dir) => dir,
        Err(StoreError::NotInitialized) => {
            let explicit = db_override.cloned().or_else(|| {
                env::var("TASKSTORE_DB")
                    .ok()
                    .filter(|value| !value.trim().is_empty())
                    .map(PathBuf::from)
            });
            let Some(db) = explicit else {
                return Err(StoreError::NotInitialized);
            };
            db.parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        }
        Err(err) => return Err(err),
    };
    Ok(ConfigPaths::resolve(&store_dir, db_override))
}

/// Locate the store and open it.
///
/// # Errors
///
/// Returns an error if no store can be located, config is invalid, or the
/// database cannot be opened.
pub fn open_store(db_override: Option<&PathBuf>) -> Result<(SqliteStorage, ConfigPaths)> {
    let paths = resolve_store_paths(db_override)?;
    open_storage(&paths.store_dir, db_override)
}

/// Create `<dir>/.taskstore` (if missing) and an up-to-date database in it.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or migration fails.
pub fn init_store(dir: &Path) -> Result<(SqliteStorage, ConfigPaths)> {
    let store_dir = dir.join(STORE_DIR_NAME);
    fs::create_dir_all(&store_dir)?;
    let store_dir = dunce::canonicalize(store_dir)?;
    open_storage(&store_dir, None)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(layer: &ConfigLayer, key: &str) -> Result<Option<T>> {
    layer
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| StoreError::Config(format!("{key}: not a number: {raw}")))
        })
        .transpose()
}

fn parse_status_list(key: &str, raw: &str) -> Result<Vec<Status>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Status>()
                .map_err(|_| StoreError::Config(format!("{key}: unknown status '{part}'")))
        })
        .collect()
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        layer.insert(&key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
