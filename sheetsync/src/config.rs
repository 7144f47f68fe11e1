use publisher::config::{Config as PublisherConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tabstore::CredentialsSource;
use tabstore::sheets::DEFAULT_BASE_URL;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
    #[error("missing spreadsheet id (sheets.spreadsheet_id or GOOGLE_SHEET_ID)")]
    MissingSpreadsheetId,
    #[error(
        "missing credentials (sheets.credentials, GOOGLE_SERVICE_ACCOUNT_JSON_PATH or GOOGLE_SERVICE_ACCOUNT_JSON_B64)"
    )]
    MissingCredentials,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(flatten)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub sheets: SheetsSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SheetsSettings {
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Defaults to the public Sheets endpoint
    pub base_url: Option<Url>,
    pub credentials: Option<Credentials>,
}

impl SheetsSettings {
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_BASE_URL),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    ServiceAccountPath(PathBuf),
    ServiceAccountB64(String),
    AccessToken(String),
}

impl From<&Credentials> for CredentialsSource {
    fn from(credentials: &Credentials) -> Self {
        match credentials {
            Credentials::ServiceAccountPath(path) => CredentialsSource::ServiceAccountPath(path.clone()),
            Credentials::ServiceAccountB64(encoded) => {
                CredentialsSource::ServiceAccountBase64(encoded.clone())
            }
            Credentials::AccessToken(token) => CredentialsSource::AccessToken(token.clone()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            sentry_dsn: None,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "sheetsync".into()
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Applies the deployment environment on top of the file. Blank values are
    /// ignored. A service account path wins over an encoded key.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(id) = var("GOOGLE_SHEET_ID") {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(encoded) = var("GOOGLE_SERVICE_ACCOUNT_JSON_B64") {
            self.sheets.credentials = Some(Credentials::ServiceAccountB64(encoded));
        }
        if let Some(path) = var("GOOGLE_SERVICE_ACCOUNT_JSON_PATH") {
            self.sheets.credentials = Some(Credentials::ServiceAccountPath(path.into()));
        }
        if let Some(path) = var("MAPPING_PATH") {
            self.publisher.mapping.path = path.into();
        }
        if let Some(flag) = var("AUTO_ADD_COLUMNS") {
            self.publisher.auto_add_columns = flag.eq_ignore_ascii_case("true");
        }
    }

    /// Checks everything needed to serve. A dry run keeps rows in memory and
    /// needs no spreadsheet.
    pub fn validate(&self, dry_run: bool) -> Result<(), ConfigError> {
        self.publisher.validate()?;
        if dry_run {
            return Ok(());
        }
        if self.sheets.spreadsheet_id.is_empty() {
            return Err(ConfigError::MissingSpreadsheetId);
        }
        if self.sheets.credentials.is_none() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}
