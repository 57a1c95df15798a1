//! Settings supplied by the agent's configuration provider.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use agentdb_bucket_store::OpenOptions;

/// Name of the store file inside the data prefix.
pub const DB_FILE_NAME: &str = "agent.db";

/// Environment variable that overrides [`Config::data_prefix`].
pub const DATA_PREFIX_ENV: &str = "AGENTDB_DATA_PREFIX";

/// Where the store lives and how it is opened.
///
/// Deserializes from the agent's own config file; missing fields take their
/// defaults.
///
/// ```rust
/// use agentdb::Config;
///
/// let config: Config = serde_json::from_str(r#"{"data_prefix": "/srv/agent"}"#).unwrap();
/// assert_eq!(config.db_path(), std::path::Path::new("/srv/agent/agent.db"));
/// assert_eq!(config.open_timeout_secs, 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_prefix: PathBuf,
    /// Lock wait for read-write opens.
    pub open_timeout_secs: u64,
    /// Lock wait for read-only opens; unset uses `open_timeout_secs`.
    pub read_only_open_timeout_secs: Option<u64>,
    /// Permission bits of a newly created store file.
    pub file_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_prefix: PathBuf::from("/var/lib/agent"),
            open_timeout_secs: 15,
            read_only_open_timeout_secs: None,
            file_mode: 0o600,
        }
    }
}

impl Config {
    /// A default config rooted at `data_prefix`.
    pub fn with_data_prefix(data_prefix: impl Into<PathBuf>) -> Self {
        Self {
            data_prefix: data_prefix.into(),
            ..Self::default()
        }
    }

    /// Defaults, with the data prefix taken from `AGENTDB_DATA_PREFIX` when
    /// it is set and non-empty.
    pub fn from_env() -> Self {
        match std::env::var_os(DATA_PREFIX_ENV) {
            Some(prefix) if !prefix.is_empty() => Self::with_data_prefix(prefix),
            _ => Self::default(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_prefix.join(DB_FILE_NAME)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            timeout: Duration::from_secs(self.open_timeout_secs),
            read_only_timeout: self.read_only_open_timeout_secs.map(Duration::from_secs),
            mode: self.file_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_open_options() {
        let config = Config::default();
        assert_eq!(config.open_options(), OpenOptions::default());
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/agent/agent.db"));
    }

    #[test]
    fn partial_config_deserializes() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "data_prefix": "/opt/agent",
            "read_only_open_timeout_secs": 2,
        }))
        .unwrap();

        assert_eq!(config.data_prefix, PathBuf::from("/opt/agent"));
        assert_eq!(config.open_timeout_secs, 15);
        assert_eq!(
            config.open_options().read_only_timeout,
            Some(Duration::from_secs(2))
        );
        assert_eq!(config.file_mode, 0o600);
    }

    #[test]
    fn with_data_prefix_keeps_defaults() {
        let config = Config::with_data_prefix("/tmp/x");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/x/agent.db"));
        assert_eq!(config.open_timeout_secs, 15);
    }

    #[test]
    fn read_only_wait_defaults_to_open_timeout() {
        let options = Config::default().open_options();
        assert_eq!(options.timeout, Duration::from_secs(15));
        assert_eq!(options.read_only_timeout, None);
    }

    // Both cases live in one test: the environment is process-wide and tests
    // run in parallel.
    #[test]
    fn from_env_overrides_data_prefix() {
        std::env::set_var(DATA_PREFIX_ENV, "/srv/agent");
        let config = Config::from_env();
        assert_eq!(config.db_path(), PathBuf::from("/srv/agent/agent.db"));
        assert_eq!(config.open_timeout_secs, 15);

        std::env::set_var(DATA_PREFIX_ENV, "");
        assert_eq!(Config::from_env(), Config::default());

        std::env::remove_var(DATA_PREFIX_ENV);
        assert_eq!(Config::from_env(), Config::default());
    }
}
