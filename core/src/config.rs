//! Configuration
//!
//! Layered, lowest priority first: built-in defaults, an optional TOML file
//! (`aro.toml` in the working directory, `ARO_CONFIG_PATH`, or an explicit
//! path), then `ARO__*` environment variables such as
//! `ARO__RUNTIME__MAX_PARALLEL_ITERATIONS=4`. A `.env` file is loaded first
//! when present.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::events::{StateTransitionEngine, TransitionError, TransitionTable};

const DEFAULT_CONFIG_FILE: &str = "aro.toml";
const CONFIG_PATH_VAR: &str = "ARO_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid state machine for field '{field}': {source}")]
    StateMachine {
        field: String,
        #[source]
        source: TransitionError,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    /// Allowed transitions per state field
    pub state_machines: BTreeMap<String, StateMachineConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on concurrently running iterations of a parallel loop
    pub max_parallel_iterations: usize,
    /// Handlers still running after this many seconds are abandoned
    pub handler_timeout_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_iterations: 8,
            handler_timeout_secs: None,
        }
    }
}

impl RuntimeConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Refuse to start when the analyzer reports warnings
    pub warnings_as_errors: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// `"from -> to"` pairs
    pub transitions: Vec<String>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default search rules
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_parallel_iterations == 0 {
            return Err(ConfigError::Invalid(
                "runtime.max_parallel_iterations must be at least 1".to_string(),
            ));
        }
        self.transition_engine().map(|_| ())
    }

    /// State transition engine for the configured state machines
    pub fn transition_engine(&self) -> Result<StateTransitionEngine, ConfigError> {
        let mut engine = StateTransitionEngine::new();
        for (field, machine) in &self.state_machines {
            let table = TransitionTable::parse(&machine.transitions).map_err(|source| {
                ConfigError::StateMachine {
                    field: field.clone(),
                    source,
                }
            })?;
            engine.define(field.clone(), table);
        }
        Ok(engine)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.runtime.handler_timeout()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        match self.resolve_path() {
            Some((path, required)) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                builder = builder.add_source(::config::File::from(path.as_path()).required(required));
            }
            None => tracing::debug!("No config file, using defaults and environment"),
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("ARO")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(&self) -> Option<(PathBuf, bool)> {
        if let Some(path) = &self.config_path {
            return Some((path.clone(), true));
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            return Some((PathBuf::from(path), true));
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| (default.to_path_buf(), false))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn load(file: &tempfile::NamedTempFile) -> Result<Config, ConfigError> {
        Config::builder()
            .config_path(Some(file.path().to_path_buf()))
            .build()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.runtime.max_parallel_iterations, 8);
        assert_eq!(config.handler_timeout(), None);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.state_machines.is_empty());
    }

    #[test]
    fn test_file_values() {
        let file = toml_file(
            r#"
            [runtime]
            max_parallel_iterations = 2
            handler_timeout_secs = 30

            [logging]
            json = true

            [state_machines.status]
            transitions = ["draft -> placed", "placed -> paid"]
            "#,
        );
        let config = load(&file).unwrap();

        assert_eq!(config.runtime.max_parallel_iterations, 2);
        assert_eq!(config.handler_timeout(), Some(Duration::from_secs(30)));
        assert!(config.logging.json);

        let engine = config.transition_engine().unwrap();
        let table = engine.table("status").unwrap();
        assert!(table.is_allowed("draft", "placed"));
        assert!(!table.is_allowed("draft", "paid"));
    }

    #[test]
    fn test_malformed_transition_is_rejected() {
        let file = toml_file(
            r#"
            [state_machines.status]
            transitions = ["draft placed"]
            "#,
        );
        match load(&file) {
            Err(ConfigError::StateMachine { field, .. }) => assert_eq!(field, "status"),
            other => panic!("expected state machine error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_parallelism_is_invalid() {
        let file = toml_file("[runtime]\nmax_parallel_iterations = 0\n");
        assert!(matches!(load(&file), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::builder()
            .config_path(Some(PathBuf::from("/definitely/not/here/aro.toml")))
            .build();
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
