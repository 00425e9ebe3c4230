//! Configuration module for dupegate
//!
//! Configuration is loaded with the following priority (highest first):
//! 1. Command line arguments
//! 2. Environment variables (prefixed with DUPEGATE_)
//! 3. Configuration file (config.toml or config.yaml)
//! 4. Default values

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::detector::{RedundancyDetector, DEFAULT_DISPLAY_FIELD};
use crate::error::{Result, StoreError};
use crate::normalize::{Normalizer, DEFAULT_VOLATILE_FIELD};
use crate::store::{MemoryStore, SqliteStore, Store};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "dupegate")]
#[command(about = "Deduplicate JSON records by content fingerprint")]
pub struct CliArgs {
    /// JSON-lines file to read records from (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Path to the SQLite database file (default: in-memory store)
    #[arg(long, env = "DUPEGATE_DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Field excluded from comparison (repeatable)
    #[arg(long = "volatile-field", env = "DUPEGATE_VOLATILE_FIELDS", value_delimiter = ',')]
    pub volatile_fields: Vec<String>,

    /// Field used to summarize existing entries on rejection
    #[arg(long, env = "DUPEGATE_DISPLAY_FIELD")]
    pub display_field: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "DUPEGATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// File-based configuration (for TOML/YAML)
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    database_path: Option<PathBuf>,
    volatile_fields: Option<Vec<String>>,
    display_field: Option<String>,
}

/// Configuration for the deduplication pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database file; `None` keeps entries in memory only
    pub database_path: Option<PathBuf>,

    /// Fields dropped before fingerprinting
    pub volatile_fields: Vec<String>,

    /// Field shown when summarizing an existing entry
    pub display_field: String,

    /// JSON-lines input; `None` reads stdin
    pub input: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            volatile_fields: vec![DEFAULT_VOLATILE_FIELD.to_string()],
            display_field: DEFAULT_DISPLAY_FIELD.to_string(),
            input: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources (CLI > env > file > defaults)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_args(CliArgs::parse())
    }

    /// Load configuration from provided CLI args (for testing)
    pub fn load_from_args(args: CliArgs) -> std::result::Result<Self, ConfigError> {
        let mut config = Config::default();

        let file_config = Self::load_file_config(&args.config)?;

        // File overrides defaults
        if let Some(db) = file_config.database_path {
            config.database_path = Some(db);
        }
        if let Some(fields) = file_config.volatile_fields {
            config.volatile_fields = fields;
        }
        if let Some(field) = file_config.display_field {
            config.display_field = field;
        }

        // CLI overrides everything
        if let Some(db) = args.database_path {
            config.database_path = Some(db);
        }
        if !args.volatile_fields.is_empty() {
            config.volatile_fields = args.volatile_fields;
        }
        if let Some(field) = args.display_field {
            config.display_field = field;
        }
        config.input = args.input;

        Ok(config)
    }

    /// Load configuration from file
    fn load_file_config(config_path: &Option<PathBuf>) -> std::result::Result<FileConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.as_path()));
        } else {
            builder = builder
                .add_source(File::with_name("config").required(false))
                .add_source(File::with_name("dupegate").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("DUPEGATE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("volatile_fields"),
        );

        let settings = builder.build()?;
        settings.try_deserialize()
    }

    /// Build the normalizer described by this configuration
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.volatile_fields.iter().cloned())
    }

    /// Open the configured store
    pub fn open_store(&self) -> std::result::Result<Arc<dyn Store>, StoreError> {
        match &self.database_path {
            Some(path) => Ok(Arc::new(SqliteStore::open(path)?)),
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }

    /// Open the store and construct a detector over it
    pub fn build_detector(&self) -> Result<RedundancyDetector> {
        let store = self.open_store()?;
        Ok(RedundancyDetector::new(store, self.normalizer())?
            .with_display_field(self.display_field.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tempfile::NamedTempFile;

    /// Config loading reads `DUPEGATE_*` variables, so tests that load or set
    /// them run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets environment variables for the lifetime of the guard.
    struct EnvVars(Vec<&'static str>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for key in &self.0 {
                std::env::remove_var(key);
            }
        }
    }

    fn no_args() -> CliArgs {
        CliArgs {
            input: None,
            database_path: None,
            volatile_fields: Vec::new(),
            display_field: None,
            config: None,
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.volatile_fields, vec!["timestamp".to_string()]);
        assert_eq!(config.display_field, "name");
    }

    #[test]
    fn test_load_defaults_when_no_config() {
        let _env = env_lock();
        let config = Config::load_from_args(no_args()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_cli_args() {
        let _env = env_lock();
        let args = CliArgs {
            input: Some(PathBuf::from("records.jsonl")),
            database_path: Some(PathBuf::from("/cli/path.db")),
            volatile_fields: vec!["received_at".to_string(), "trace_id".to_string()],
            display_field: Some("email".to_string()),
            config: None,
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.input, Some(PathBuf::from("records.jsonl")));
        assert_eq!(config.database_path, Some(PathBuf::from("/cli/path.db")));
        assert_eq!(config.volatile_fields, vec!["received_at", "trace_id"]);
        assert_eq!(config.display_field, "email");
    }

    #[test]
    fn test_load_from_toml_file() {
        let _env = env_lock();
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
database_path = "/toml/db.sqlite"
volatile_fields = ["timestamp", "updated_at"]
display_field = "title"
"#
        )
        .unwrap();

        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..no_args()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/toml/db.sqlite")));
        assert_eq!(config.volatile_fields, vec!["timestamp", "updated_at"]);
        assert_eq!(config.display_field, "title");
    }

    #[test]
    fn test_load_from_yaml_file() {
        let _env = env_lock();
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
database_path: "/yaml/db.sqlite"
volatile_fields:
  - seen_at
"#
        )
        .unwrap();

        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..no_args()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/yaml/db.sqlite")));
        assert_eq!(config.volatile_fields, vec!["seen_at"]);
        assert_eq!(config.display_field, "name"); // Default
    }

    #[test]
    fn test_cli_overrides_file() {
        let _env = env_lock();
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
database_path = "/file/db.sqlite"
display_field = "title"
"#
        )
        .unwrap();

        let args = CliArgs {
            display_field: Some("email".to_string()),
            config: Some(file.path().to_path_buf()),
            ..no_args()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/file/db.sqlite"))); // File
        assert_eq!(config.display_field, "email"); // CLI
        assert_eq!(config.volatile_fields, vec!["timestamp"]); // Default
    }

    #[test]
    fn test_build_detector_applies_settings() {
        let config = Config {
            volatile_fields: vec!["seen_at".to_string()],
            display_field: "email".to_string(),
            ..Config::default()
        };
        let detector = config.build_detector().unwrap();

        detector
            .submit_value(json!({"email": "a@example.com", "seen_at": 1}))
            .unwrap();
        let decision = detector
            .submit_value(json!({"email": "a@example.com", "seen_at": 2}))
            .unwrap();

        match decision {
            crate::Decision::Rejected {
                existing_summary,
                existing_id,
                ..
            } => assert_eq!(existing_summary, format!("a@example.com (ID: {existing_id})")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let _env = env_lock();
        let _vars = EnvVars::set(&[
            ("DUPEGATE_VOLATILE_FIELDS", "a,b"),
            ("DUPEGATE_DISPLAY_FIELD", "env_field"),
        ]);

        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
database_path = "/file/db.sqlite"
volatile_fields = ["from_file"]
display_field = "title"
"#
        )
        .unwrap();

        // Env beats file
        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..no_args()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.volatile_fields, vec!["a", "b"]); // Env
        assert_eq!(config.display_field, "env_field"); // Env
        assert_eq!(config.database_path, Some(PathBuf::from("/file/db.sqlite"))); // File

        // CLI beats env
        let args = CliArgs {
            display_field: Some("cli_field".to_string()),
            volatile_fields: vec!["cli".to_string()],
            config: Some(file.path().to_path_buf()),
            ..no_args()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.volatile_fields, vec!["cli"]);
        assert_eq!(config.display_field, "cli_field");
    }

    #[test]
    fn test_cli_args_read_env() {
        let _env = env_lock();
        let _vars = EnvVars::set(&[
            ("DUPEGATE_VOLATILE_FIELDS", "seen_at,trace_id"),
            ("DUPEGATE_DISPLAY_FIELD", "email"),
            ("DUPEGATE_DATABASE_PATH", "/env/db.sqlite"),
        ]);

        let args = CliArgs::try_parse_from(["dupegate"]).unwrap();
        assert_eq!(args.volatile_fields, vec!["seen_at", "trace_id"]);
        assert_eq!(args.display_field.as_deref(), Some("email"));
        assert_eq!(args.database_path, Some(PathBuf::from("/env/db.sqlite")));

        // An explicit flag wins over the variable
        let args = CliArgs::try_parse_from(["dupegate", "--display-field", "name"]).unwrap();
        assert_eq!(args.display_field.as_deref(), Some("name"));
    }
}
