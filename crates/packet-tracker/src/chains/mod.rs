// Chain-facing collaborators: raw events and connection identity resolution

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub mod cache;
pub mod lcd;

pub use cache::CachedConnectionResolver;
pub use lcd::LcdConnectionResolver;

use crate::error::ResolutionError;

/// Raw chain event as delivered by the event polling loop
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub event_type: String,
    pub attributes: Vec<(String, String)>,
    pub height: u64,
    pub tx_hash: Option<String>,
}

/// Counterparty identity of a local connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub counterparty_chain_id: String,
    pub counterparty_connection_id: String,
}

/// Resolves a local connection to the chain and connection on the other end.
///
/// Implementations may hit the network; every failure is reported as a
/// transient [`ResolutionError`].
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError>;
}

#[async_trait]
impl<T: ConnectionResolver + ?Sized> ConnectionResolver for Arc<T> {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError> {
        (**self).resolve(chain_id, connection_id).await
    }
}

/// Resolver backed by a fixed table, e.g. connections pinned in configuration
#[derive(Debug, Clone, Default)]
pub struct FixedConnectionResolver {
    /// (chain_id, connection_id) -> counterparty
    connections: HashMap<(String, String), ConnectionInfo>,
}

impl FixedConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one direction of a connection
    pub fn with_connection(
        mut self,
        chain_id: &str,
        connection_id: &str,
        counterparty_chain_id: &str,
        counterparty_connection_id: &str,
    ) -> Self {
        self.insert(
            chain_id,
            connection_id,
            ConnectionInfo {
                counterparty_chain_id: counterparty_chain_id.to_string(),
                counterparty_connection_id: counterparty_connection_id.to_string(),
            },
        );
        self
    }

    pub fn insert(&mut self, chain_id: &str, connection_id: &str, info: ConnectionInfo) {
        self.connections
            .insert((chain_id.to_string(), connection_id.to_string()), info);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[async_trait]
impl ConnectionResolver for FixedConnectionResolver {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError> {
        self.connections
            .get(&(chain_id.to_string(), connection_id.to_string()))
            .cloned()
            .ok_or_else(|| ResolutionError::new(chain_id, connection_id, "unknown connection"))
    }
}

/// Pinned connections first, then the chain's LCD endpoint
pub struct ConfiguredResolver {
    fixed: FixedConnectionResolver,
    lcd: LcdConnectionResolver,
}

impl ConfiguredResolver {
    pub fn new(fixed: FixedConnectionResolver, lcd: LcdConnectionResolver) -> Self {
        Self { fixed, lcd }
    }
}

#[async_trait]
impl ConnectionResolver for ConfiguredResolver {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError> {
        match self.fixed.resolve(chain_id, connection_id).await {
            Ok(info) => Ok(info),
            Err(pinned_miss) if !self.lcd.has_endpoint(chain_id) => Err(pinned_miss),
            Err(_) => self.lcd.resolve(chain_id, connection_id).await,
        }
    }
}
