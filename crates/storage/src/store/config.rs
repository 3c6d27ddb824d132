#![forbid(unsafe_code)]

use mb_core::DEFAULT_BLOCK_LIMIT;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DATA_DIR_ENV: &str = "MEMBLOCK_DATA_DIR";
const BUSY_TIMEOUT_ENV: &str = "MEMBLOCK_BUSY_TIMEOUT_MS";
const GRANULARITY_ENV: &str = "MEMBLOCK_TIMESTAMP_GRANULARITY_MS";
const BLOCK_LIMIT_ENV: &str = "MEMBLOCK_DEFAULT_BLOCK_LIMIT";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIMESTAMP_GRANULARITY_MS: i64 = 1;

/// Settings for opening a [`crate::SqliteStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the database file.
    pub storage_dir: PathBuf,
    /// How long a transaction waits for a competing writer before failing.
    pub busy_timeout: Duration,
    /// Resolution at which `created_at_ms` / `updated_at_ms` are stored.
    ///
    /// Values above 1 round timestamps down, so rows created within one tick
    /// share a timestamp and are ordered by id alone.
    pub timestamp_granularity_ms: i64,
    /// Value limit applied to blocks created without an explicit one.
    pub default_block_limit: usize,
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            timestamp_granularity_ms: DEFAULT_TIMESTAMP_GRANULARITY_MS,
            default_block_limit: DEFAULT_BLOCK_LIMIT,
        }
    }

    /// Builds a config from `MEMBLOCK_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`StoreConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let storage_dir = lookup(DATA_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(exe_data_dir);
        let mut config = Self::new(storage_dir);
        if let Some(ms) = parse_setting::<u64>(lookup(BUSY_TIMEOUT_ENV).as_deref()) {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(granularity) = parse_setting::<i64>(lookup(GRANULARITY_ENV).as_deref())
            .filter(|value| *value >= 1)
        {
            config.timestamp_granularity_ms = granularity;
        }
        if let Some(limit) = parse_setting::<usize>(lookup(BLOCK_LIMIT_ENV).as_deref()) {
            config.default_block_limit = limit;
        }
        config
    }

    pub fn with_timestamp_granularity_ms(mut self, granularity_ms: i64) -> Self {
        self.timestamp_granularity_ms = granularity_ms;
        self
    }

    pub fn with_default_block_limit(mut self, limit: usize) -> Self {
        self.default_block_limit = limit;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(resolve_data_dir())
    }
}

/// Resolves the data directory.
///
/// Resolution order:
/// 1. `MEMBLOCK_DATA_DIR` environment variable
/// 2. `.data/` directory next to the executable
pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(dir);
    }
    exe_data_dir()
}

fn exe_data_dir() -> PathBuf {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(".data")
}

fn parse_setting<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_defaults() {
        let config = StoreConfig::new("/tmp/mb");
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/mb"));
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.timestamp_granularity_ms, 1);
        assert_eq!(config.default_block_limit, DEFAULT_BLOCK_LIMIT);
    }

    #[test]
    fn builder_methods_override_fields() {
        let config = StoreConfig::new("/tmp/mb")
            .with_timestamp_granularity_ms(1000)
            .with_default_block_limit(42)
            .with_busy_timeout(Duration::from_millis(10));
        assert_eq!(config.timestamp_granularity_ms, 1000);
        assert_eq!(config.default_block_limit, 42);
        assert_eq!(config.busy_timeout, Duration::from_millis(10));
    }

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn from_lookup_reads_every_variable() {
        let vars = [
            ("MEMBLOCK_DATA_DIR", "/srv/memblocks"),
            ("MEMBLOCK_BUSY_TIMEOUT_MS", "250"),
            ("MEMBLOCK_TIMESTAMP_GRANULARITY_MS", "1000"),
            ("MEMBLOCK_DEFAULT_BLOCK_LIMIT", " 64 "),
        ];
        let config = StoreConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.storage_dir, PathBuf::from("/srv/memblocks"));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.timestamp_granularity_ms, 1000);
        assert_eq!(config.default_block_limit, 64);
    }

    #[test]
    fn from_lookup_keeps_defaults_for_missing_or_invalid_values() {
        let vars = [
            ("MEMBLOCK_DATA_DIR", ""),
            ("MEMBLOCK_BUSY_TIMEOUT_MS", "soon"),
            ("MEMBLOCK_TIMESTAMP_GRANULARITY_MS", "0"),
        ];
        let config = StoreConfig::from_lookup(lookup_from(&vars));
        assert_eq!(config.storage_dir, exe_data_dir());
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert_eq!(config.timestamp_granularity_ms, 1);
        assert_eq!(config.default_block_limit, DEFAULT_BLOCK_LIMIT);
    }

    #[test]
    fn parse_setting_ignores_garbage() {
        assert_eq!(parse_setting::<u64>(None), None);
        assert_eq!(parse_setting::<u64>(Some("not-a-number")), None);
        assert_eq!(parse_setting::<u64>(Some(" 250 ")), Some(250));
        assert_eq!(parse_setting::<i64>(Some("-3")), Some(-3));
    }
}
