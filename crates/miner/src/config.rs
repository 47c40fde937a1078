//! Miner settings: defaults, `faid.conf` loading and command-line overrides.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use faid_consensus::constants::{
    DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MIN_SIZE, DEFAULT_BLOCK_PRIORITY_SIZE, MAX_BLOCK_SIZE,
};
use faid_consensus::{ChainParams, Network};
use faid_log::{Format, Level, LogConfig};

const DEFAULT_MEMPOOL_REFRESH_SECS: u64 = 60;
const DEFAULT_POOL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read(String),
    InvalidValue { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(message) => write!(f, "failed to read config: {message}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{value}' for {key}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, PartialEq)]
pub struct MinerConfig {
    pub network: Network,
    pub generate: bool,
    /// Worker count; -1 picks the chain default or hardware concurrency.
    pub threads: i32,
    pub block_max_size: u32,
    pub block_priority_size: u32,
    pub block_min_size: u32,
    pub sort_by_fee: bool,
    pub release_orphans: bool,
    /// Only honored on networks that mine blocks on demand.
    pub block_version: Option<i32>,
    pub log_level: Level,
    pub log_format: Format,
    /// A changed mempool forces a rebuild once a candidate is this old.
    pub mempool_refresh: Duration,
    /// Per-worker budget in pool mode.
    pub pool_timeout: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            generate: false,
            threads: -1,
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            block_min_size: DEFAULT_BLOCK_MIN_SIZE,
            sort_by_fee: false,
            release_orphans: false,
            block_version: None,
            log_level: Level::Info,
            log_format: Format::Text,
            mempool_refresh: Duration::from_secs(DEFAULT_MEMPOOL_REFRESH_SECS),
            pool_timeout: Duration::from_secs(DEFAULT_POOL_TIMEOUT_SECS),
        }
    }
}

impl MinerConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Brings the size limits back inside their allowed ranges.
    pub fn clamp(&mut self) {
        self.block_max_size = self.block_max_size.clamp(1000, MAX_BLOCK_SIZE - 1000);
        self.block_priority_size = self.block_priority_size.min(self.block_max_size);
        self.block_min_size = self.block_min_size.min(self.block_max_size);
    }

    /// Threads to start, or 0 when generation is off.
    pub fn worker_count(&self, params: &ChainParams) -> usize {
        if !self.generate || self.threads == 0 {
            return 0;
        }
        if self.threads > 0 {
            return self.threads as usize;
        }
        if params.default_miner_threads > 0 {
            return params.default_miner_threads;
        }
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            format: self.log_format,
            ..LogConfig::default()
        }
    }

    /// Applies `faid.conf` entries; the last value of a repeated key wins.
    pub fn apply_conf(&mut self, conf: &HashMap<String, Vec<String>>) -> Result<(), ConfigError> {
        let last = |key: &str| conf.get(key).and_then(|values| values.last());

        if let Some(value) = last("regtest") {
            if conf_bool("regtest", value)? {
                self.network = Network::Regtest;
            }
        }
        if let Some(value) = last("testnet") {
            if conf_bool("testnet", value)? {
                self.network = Network::Testnet;
            }
        }
        if let Some(value) = last("gen") {
            self.generate = conf_bool("gen", value)?;
        }
        if let Some(value) = last("genproclimit") {
            self.threads = parse_number("genproclimit", value)?;
        }
        if let Some(value) = last("blockmaxsize") {
            self.block_max_size = parse_number("blockmaxsize", value)?;
        }
        if let Some(value) = last("blockprioritysize") {
            self.block_priority_size = parse_number("blockprioritysize", value)?;
        }
        if let Some(value) = last("blockminsize") {
            self.block_min_size = parse_number("blockminsize", value)?;
        }
        if let Some(value) = last("blockversion") {
            self.block_version = Some(parse_number("blockversion", value)?);
        }
        if let Some(value) = last("sortbyfee") {
            self.sort_by_fee = conf_bool("sortbyfee", value)?;
        }
        if let Some(value) = last("releaseorphans") {
            self.release_orphans = conf_bool("releaseorphans", value)?;
        }
        if let Some(value) = last("loglevel") {
            self.log_level = Level::parse(value).ok_or_else(|| invalid("loglevel", value))?;
        }
        if let Some(value) = last("logformat") {
            self.log_format = Format::parse(value).ok_or_else(|| invalid("logformat", value))?;
        }
        self.clamp();
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn conf_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_conf_bool(value).ok_or_else(|| invalid(key, value))
}

pub(crate) fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

/// Reads a `key=value` file. A missing file yields `None`.
pub fn load_conf(path: &Path) -> Result<Option<HashMap<String, Vec<String>>>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::Read(err.to_string())),
    };
    Ok(Some(parse_conf(&contents)))
}

pub fn parse_conf(contents: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for raw_line in contents.lines() {
        let mut line = raw_line.trim();
        if let Some(idx) = line.find(['#', ';']) {
            line = &line[..idx];
        }
        line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        out.entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    out
}

pub fn parse_conf_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.is_empty() {
        return Some(true);
    }
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf_parsing_strips_comments_and_collects() {
        let conf = parse_conf(
            "# header\n\
             gen\n\
             BlockMaxSize = 5000 ; trailing\n\
             addnode=a\n\
             addnode=b\n\
             =orphan\n",
        );
        assert_eq!(conf["gen"], vec!["1".to_string()]);
        assert_eq!(conf["blockmaxsize"], vec!["5000".to_string()]);
        assert_eq!(conf["addnode"].len(), 2);
        assert!(!conf.contains_key(""));
    }

    #[test]
    fn apply_conf_clamps_sizes() {
        let mut config = MinerConfig::default();
        let conf = parse_conf(
            "blockmaxsize=10\nblockprioritysize=90000\nblockminsize=400\nregtest=1\n",
        );
        config.apply_conf(&conf).expect("apply");
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.block_max_size, 1000);
        assert_eq!(config.block_priority_size, 1000);
        assert_eq!(config.block_min_size, 400);

        let conf = parse_conf("blockmaxsize=5000000\n");
        config.apply_conf(&conf).expect("apply");
        assert_eq!(config.block_max_size, MAX_BLOCK_SIZE - 1000);
    }

    #[test]
    fn apply_conf_rejects_bad_values() {
        let mut config = MinerConfig::default();
        let err = config
            .apply_conf(&parse_conf("gen=maybe\n"))
            .expect_err("bad bool");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "gen".to_string(),
                value: "maybe".to_string()
            }
        );
        assert!(config.apply_conf(&parse_conf("genproclimit=lots\n")).is_err());
    }

    #[test]
    fn worker_count_follows_generate_and_threads() {
        let params = faid_consensus::chain_params(Network::Regtest);
        let mut config = MinerConfig::for_network(Network::Regtest);
        assert_eq!(config.worker_count(&params), 0);
        config.generate = true;
        assert_eq!(config.worker_count(&params), params.default_miner_threads);
        config.threads = 3;
        assert_eq!(config.worker_count(&params), 3);
        config.threads = 0;
        assert_eq!(config.worker_count(&params), 0);
    }
}
