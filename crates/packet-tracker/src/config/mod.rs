// Tracker configuration (TOML)
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chains::{ConfiguredResolver, ConnectionInfo, FixedConnectionResolver, LcdConnectionResolver};
use crate::error::{Result, TrackerError};
use crate::relay::{CounterpartyFeeFilter, FeeFilter, PacketFilter, DEFAULT_CANDIDATE_LIMIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub global: GlobalConfig,
    pub database: DatabaseConfig,
    /// Chains keyed by a local name
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level for the tracker
    pub log_level: String,
    /// Page size of candidate queries
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Clear all claim flags when the tracker starts
    #[serde(default = "default_true")]
    pub reset_on_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; `~` is expanded
    pub path: String,
    /// How long to wait on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier
    pub chain_id: String,
    /// LCD (REST) endpoint used to resolve connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcd_endpoint: Option<String>,
    /// LCD request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Minimum fees for packets originating on this chain
    #[serde(default)]
    pub fee_filter: FeeFilter,
    /// Endpoints of this chain the relayer serves
    #[serde(default)]
    pub packet_filter: PacketFilter,
    /// Pinned connections, consulted before the LCD endpoint
    #[serde(default)]
    pub connections: Vec<StaticConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConnection {
    pub connection_id: String,
    pub counterparty_chain_id: String,
    pub counterparty_connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Collect prometheus metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_candidate_limit() -> usize {
    DEFAULT_CANDIDATE_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl TrackerConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrackerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.global.candidate_limit == 0 {
            return Err(TrackerError::Config("candidate_limit must be positive".to_string()));
        }
        if self.database.path.is_empty() {
            return Err(TrackerError::Config("database path is empty".to_string()));
        }
        let mut seen = Vec::new();
        for (name, chain) in &self.chains {
            if chain.chain_id.is_empty() {
                return Err(TrackerError::Config(format!("chain {} has an empty chain_id", name)));
            }
            if seen.contains(&chain.chain_id.as_str()) {
                return Err(TrackerError::Config(format!("chain_id {} is configured twice", chain.chain_id)));
            }
            seen.push(chain.chain_id.as_str());
        }
        Ok(())
    }

    /// Get chain configuration by chain id
    pub fn get_chain(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Every configured chain id, sorted
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chains.values().map(|c| c.chain_id.clone()).collect();
        ids.sort();
        ids
    }

    /// All configured chains other than `chain_id`
    pub fn counterparty_chain_ids(&self, chain_id: &str) -> Vec<String> {
        self.chain_ids().into_iter().filter(|id| id != chain_id).collect()
    }

    /// Per-origin fee filters for send candidates destined to `dst_chain_id`.
    ///
    /// Receive fees are escrowed on the origin chain, so each counterparty
    /// contributes its own configured filter.
    pub fn counterparty_fee_filters(&self, dst_chain_id: &str) -> Vec<CounterpartyFeeFilter> {
        self.counterparty_chain_ids(dst_chain_id)
            .into_iter()
            .map(|id| {
                let fee_filter = self.get_chain(&id).map(|c| c.fee_filter.clone()).unwrap_or_default();
                CounterpartyFeeFilter::new(&id, fee_filter)
            })
            .collect()
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.path).to_string())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Log level from the command line if given, otherwise from the file
    pub fn log_level<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.global.log_level)
    }

    /// Settings for a short-lived CLI invocation.
    ///
    /// Claims held by running relay workers stay untouched, and no metrics
    /// registry is built since nothing outlives the process to scrape it.
    pub fn one_shot(mut self) -> Self {
        self.global.reset_on_start = false;
        self.metrics.enabled = false;
        self
    }

    /// Resolver serving pinned connections and falling back to LCD queries
    pub fn connection_resolver(&self) -> Result<ConfiguredResolver> {
        let mut fixed = FixedConnectionResolver::new();
        let mut lcd = LcdConnectionResolver::new(Duration::from_secs(default_request_timeout_secs()))
            .map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {}", e)))?;

        for chain in self.chains.values() {
            for pinned in &chain.connections {
                fixed.insert(
                    &chain.chain_id,
                    &pinned.connection_id,
                    ConnectionInfo {
                        counterparty_chain_id: pinned.counterparty_chain_id.clone(),
                        counterparty_connection_id: pinned.counterparty_connection_id.clone(),
                    },
                );
            }
            if let Some(endpoint) = &chain.lcd_endpoint {
                lcd.add_endpoint_with_timeout(
                    &chain.chain_id,
                    endpoint,
                    Duration::from_secs(chain.request_timeout_secs),
                );
            }
        }
        Ok(ConfiguredResolver::new(fixed, lcd))
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            "cosmoshub".to_string(),
            ChainConfig {
                chain_id: "cosmoshub-4".to_string(),
                lcd_endpoint: Some("https://cosmos-rest.publicnode.com".to_string()),
                request_timeout_secs: default_request_timeout_secs(),
                fee_filter: FeeFilter::default(),
                packet_filter: PacketFilter::default(),
                connections: vec![],
            },
        );

        chains.insert(
            "osmosis".to_string(),
            ChainConfig {
                chain_id: "osmosis-1".to_string(),
                lcd_endpoint: Some("https://osmosis-rest.publicnode.com".to_string()),
                request_timeout_secs: default_request_timeout_secs(),
                fee_filter: FeeFilter::default(),
                packet_filter: PacketFilter::default(),
                connections: vec![],
            },
        );

        Self {
            global: GlobalConfig {
                log_level: "info".to_string(),
                candidate_limit: DEFAULT_CANDIDATE_LIMIT,
                reset_on_start: true,
            },
            database: DatabaseConfig {
                path: "~/.packet-tracker/tracker.db".to_string(),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            chains,
            metrics: MetricsConfig::default(),
        }
    }
}
