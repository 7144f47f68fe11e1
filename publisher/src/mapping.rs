//! Mapping between publish payloads and spreadsheet columns.
//!
//! The mapping lives in its own YAML file so that columns can be added without
//! restarting the service. [`MappingSource`] decides whether that file is read
//! once at startup or again on every request.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("could not load mapping from {}: {source}", .path.display())]
    LoadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse mapping: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid mapping: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("tab name for '{0}' is empty")]
    EmptyTabName(&'static str),

    #[error("main and processes tabs are both '{0}'")]
    SameTab(String),

    #[error("key column '{0}' is empty")]
    EmptyKeyColumn(&'static str),

    #[error("payload key list '{0}' is empty")]
    EmptyKeyList(&'static str),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Tabs {
    pub main: String,
    pub processes: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Keys {
    /// Primary key column of the main tab
    pub main_pk_col: String,
    /// Column on the processes tab holding the owning main row's key
    pub processes_fk_col: String,
    /// Column on the processes tab holding the process unique identifier
    #[serde(default = "default_uid_col")]
    pub processes_uid_col: String,
    /// Optional row-local key on the processes tab, generated when a new
    /// process arrives without one
    #[serde(default)]
    pub processes_pk_col: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoftDelete {
    pub col: String,
    pub at_col: String,
}

impl Default for SoftDelete {
    fn default() -> Self {
        SoftDelete {
            col: "is_deleted".into(),
            at_col: "deleted_at".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdatedAt {
    /// An empty string turns the updated-at marker off.
    pub col: String,
}

impl Default for UpdatedAt {
    fn default() -> Self {
        UpdatedAt {
            col: "updated_at".into(),
        }
    }
}

impl UpdatedAt {
    pub fn column(&self) -> Option<&str> {
        (!self.col.is_empty()).then_some(self.col.as_str())
    }
}

/// Names under which the payload may carry each special field. The first name
/// present in a payload wins.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PayloadKeys {
    pub row_id_keys: Vec<String>,
    pub delete_flag_keys: Vec<String>,
    pub processes_keys: Vec<String>,
    pub process_uid_keys: Vec<String>,
    pub process_row_id_keys: Vec<String>,
}

impl Default for PayloadKeys {
    fn default() -> Self {
        PayloadKeys {
            row_id_keys: vec!["row_id".into()],
            delete_flag_keys: vec!["is_deleted".into()],
            processes_keys: vec!["processes".into()],
            process_uid_keys: vec!["UID".into()],
            process_row_id_keys: vec!["_proc_row_id".into()],
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MappingConfig {
    pub tabs: Tabs,
    pub keys: Keys,
    #[serde(default)]
    pub soft_delete: SoftDelete,
    #[serde(default)]
    pub updated_at: UpdatedAt,
    #[serde(default)]
    pub payload: PayloadKeys,
    /// payload key -> main tab column
    #[serde(default)]
    pub main_mapping: IndexMap<String, String>,
    /// payload key -> processes tab column
    #[serde(default)]
    pub process_mapping: IndexMap<String, String>,
}

fn default_uid_col() -> String {
    "UID".into()
}

impl MappingConfig {
    pub fn from_file(path: &Path) -> Result<Self, MappingError> {
        let file = File::open(path).map_err(|source| MappingError::LoadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MappingConfig = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tabs.main.is_empty() {
            return Err(ValidationError::EmptyTabName("main"));
        }
        if self.tabs.processes.is_empty() {
            return Err(ValidationError::EmptyTabName("processes"));
        }
        if self.tabs.main == self.tabs.processes {
            return Err(ValidationError::SameTab(self.tabs.main.clone()));
        }

        for (name, col) in [
            ("main_pk_col", &self.keys.main_pk_col),
            ("processes_fk_col", &self.keys.processes_fk_col),
            ("processes_uid_col", &self.keys.processes_uid_col),
        ] {
            if col.is_empty() {
                return Err(ValidationError::EmptyKeyColumn(name));
            }
        }

        let payload = &self.payload;
        for (name, keys) in [
            ("row_id_keys", &payload.row_id_keys),
            ("delete_flag_keys", &payload.delete_flag_keys),
            ("processes_keys", &payload.processes_keys),
            ("process_uid_keys", &payload.process_uid_keys),
            ("process_row_id_keys", &payload.process_row_id_keys),
        ] {
            if keys.iter().all(|k| k.is_empty()) {
                return Err(ValidationError::EmptyKeyList(name));
            }
        }

        Ok(())
    }

    /// The processes tab row-local key column, if one is configured.
    pub fn processes_pk_col(&self) -> Option<&str> {
        self.keys.processes_pk_col.as_deref().filter(|c| !c.is_empty())
    }
}

/// When the mapping file is read.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Re-read on every publish, so edits apply without a restart.
    #[default]
    PerRequest,
    /// Read once when the service starts.
    Startup,
}

enum Source {
    File(PathBuf),
    Fixed(Arc<MappingConfig>),
}

/// Hands the current mapping to each publish request.
pub struct MappingSource {
    source: Source,
}

impl MappingSource {
    /// A source backed by `path`. With [`ReloadPolicy::Startup`] the file is
    /// read and validated here, so a broken mapping fails at boot.
    pub fn from_path(path: PathBuf, reload: ReloadPolicy) -> Result<Self, MappingError> {
        let source = match reload {
            ReloadPolicy::PerRequest => Source::File(path),
            ReloadPolicy::Startup => Source::Fixed(Arc::new(MappingConfig::from_file(&path)?)),
        };
        Ok(MappingSource { source })
    }

    pub fn fixed(config: MappingConfig) -> Self {
        MappingSource {
            source: Source::Fixed(Arc::new(config)),
        }
    }

    pub fn current(&self) -> Result<Arc<MappingConfig>, MappingError> {
        match &self.source {
            Source::File(path) => Ok(Arc::new(MappingConfig::from_file(path)?)),
            Source::Fixed(config) => Ok(config.clone()),
        }
    }
}
