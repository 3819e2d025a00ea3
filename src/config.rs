use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const APP_NAME: &str = "h2nc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address of the CONNECT front end
    pub bind: String,
    /// Fixed destination for every tunnel; the request authority is used
    /// when unset
    pub destination: Option<String>,
    pub nodelay: bool,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8889".into(),
            destination: None,
            nodelay: true,
            connect_timeout_ms: None,
        }
    }
}

impl Config {
    /// Load from an explicit file, or from the per-user configuration
    /// directory.
    pub fn load(path: Option<&Path>) -> Result<Self, confy::ConfyError> {
        match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
