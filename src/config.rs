use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cache::DEFAULT_MAX_DEPTH;
use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "dslineage.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// SQLite file holding the dataset tables; in-memory when absent.
    #[serde(default)]
    pub database: Option<PathBuf>,
    pub max_depth: usize,
    pub index_on_start: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            max_depth: DEFAULT_MAX_DEPTH,
            index_on_start: false,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then the settings file (optional unless given explicitly), then
    /// `DSLINEAGE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .set_default("max_depth", DEFAULT_MAX_DEPTH as u64)?
            .set_default("index_on_start", false)?
            .set_default("log_filter", "info")?
            .add_source(file)
            .add_source(Environment::with_prefix("DSLINEAGE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
