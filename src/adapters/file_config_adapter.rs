//! INI file configuration adapter with environment overrides.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use configparser::ini::Ini;
use tracing::debug;

use crate::domain::error::ScalperError;
use crate::ports::config_port::ConfigPort;

/// Prefix for variables that override file values, e.g.
/// `SCALPER_RISK_STOP_LOSS_PERCENT` for `[risk] stop_loss_percent`.
pub const ENV_PREFIX: &str = "SCALPER_";

pub struct FileConfigAdapter {
    config: Ini,
    overrides: HashMap<(String, String), String>,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScalperError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Ini::new();
        config
            .read(content)
            .map_err(|reason| ScalperError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        })
    }

    /// Layer `PREFIX<SECTION>_<KEY>` variables over the file values.
    /// The section is the first underscore-separated segment.
    pub fn with_env_overrides<I>(mut self, prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(prefix) else {
                continue;
            };
            let Some((section, key)) = rest.split_once('_') else {
                continue;
            };
            if section.is_empty() || key.is_empty() {
                continue;
            }
            let (section, key) = (section.to_lowercase(), key.to_lowercase());
            debug!(%section, %key, "config value overridden from environment");
            self.overrides.insert((section, key), value);
        }
        self
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.overrides
            .get(&(section.to_lowercase(), key.to_lowercase()))
            .cloned()
            .or_else(|| self.config.get(section, key))
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}
