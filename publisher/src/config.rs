use crate::mapping::ReloadPolicy;
use crate::reconcile::ReconcileOptions;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Mapping path cannot be empty")]
    EmptyMappingPath,
}

/// Publisher service configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub mapping: MappingLocation,
    /// Append missing header columns instead of rejecting the payload
    #[serde(default)]
    pub auto_add_columns: bool,
    /// Treat payloads with no main field values and no processes as deletes
    #[serde(default)]
    pub infer_empty_delete: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if self.mapping.path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyMappingPath);
        }
        Ok(())
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            auto_add_columns: self.auto_add_columns,
            infer_empty_delete: self.infer_empty_delete,
        }
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Where the mapping file lives and when it is read
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MappingLocation {
    pub path: PathBuf,
    #[serde(default)]
    pub reload: ReloadPolicy,
}

impl Default for MappingLocation {
    fn default() -> Self {
        MappingLocation {
            path: PathBuf::from("mapping.yaml"),
            reload: ReloadPolicy::default(),
        }
    }
}
