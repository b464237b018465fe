// Connection resolution against a Cosmos LCD (REST) endpoint
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ConnectionInfo, ConnectionResolver};
use crate::error::ResolutionError;

#[derive(Debug, Deserialize)]
struct ConnectionResponse {
    connection: ConnectionEnd,
}

#[derive(Debug, Deserialize)]
struct ConnectionEnd {
    #[serde(default)]
    state: String,
    counterparty: ConnectionCounterparty,
}

#[derive(Debug, Deserialize)]
struct ConnectionCounterparty {
    #[serde(default)]
    connection_id: String,
}

#[derive(Debug, Deserialize)]
struct ClientStateResponse {
    identified_client_state: IdentifiedClientState,
}

#[derive(Debug, Deserialize)]
struct IdentifiedClientState {
    client_state: ClientState,
}

#[derive(Debug, Deserialize)]
struct ClientState {
    chain_id: String,
}

struct LcdEndpoint {
    url: String,
    timeout: Duration,
}

/// Resolves connections by querying each chain's LCD endpoint
pub struct LcdConnectionResolver {
    /// chain_id -> LCD endpoint
    endpoints: HashMap<String, LcdEndpoint>,
    default_timeout: Duration,
    client: Client,
}

impl LcdConnectionResolver {
    /// Create a resolver; `timeout` applies to endpoints added without their own
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            endpoints: HashMap::new(),
            default_timeout: timeout,
            client,
        })
    }

    /// Register the LCD endpoint of a chain
    pub fn with_endpoint(mut self, chain_id: &str, lcd_endpoint: &str) -> Self {
        self.add_endpoint(chain_id, lcd_endpoint);
        self
    }

    pub fn add_endpoint(&mut self, chain_id: &str, lcd_endpoint: &str) {
        let timeout = self.default_timeout;
        self.add_endpoint_with_timeout(chain_id, lcd_endpoint, timeout);
    }

    pub fn add_endpoint_with_timeout(&mut self, chain_id: &str, lcd_endpoint: &str, timeout: Duration) {
        self.endpoints.insert(
            chain_id.to_string(),
            LcdEndpoint {
                url: lcd_endpoint.trim_end_matches('/').to_string(),
                timeout,
            },
        );
    }

    pub fn has_endpoint(&self, chain_id: &str) -> bool {
        self.endpoints.contains_key(chain_id)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        chain_id: &str,
        connection_id: &str,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ResolutionError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ResolutionError::new(chain_id, connection_id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolutionError::new(
                chain_id,
                connection_id,
                format!("LCD returned {} for {}", response.status(), url),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ResolutionError::new(chain_id, connection_id, e.to_string()))
    }
}

#[async_trait]
impl ConnectionResolver for LcdConnectionResolver {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError> {
        let endpoint = self.endpoints.get(chain_id).ok_or_else(|| {
            ResolutionError::new(chain_id, connection_id, "no LCD endpoint configured")
        })?;

        debug!("Resolving {} on {} via {}", connection_id, chain_id, endpoint.url);

        let connection: ConnectionResponse = self
            .get_json(
                chain_id,
                connection_id,
                &format!("{}/ibc/core/connection/v1/connections/{}", endpoint.url, connection_id),
                endpoint.timeout,
            )
            .await?;

        if connection.connection.counterparty.connection_id.is_empty() {
            return Err(ResolutionError::new(
                chain_id,
                connection_id,
                format!("connection has no counterparty yet (state {})", connection.connection.state),
            ));
        }

        let client_state: ClientStateResponse = self
            .get_json(
                chain_id,
                connection_id,
                &format!(
                    "{}/ibc/core/connection/v1/connections/{}/client_state",
                    endpoint.url, connection_id
                ),
                endpoint.timeout,
            )
            .await?;

        Ok(ConnectionInfo {
            counterparty_chain_id: client_state.identified_client_state.client_state.chain_id,
            counterparty_connection_id: connection.connection.counterparty.connection_id,
        })
    }
}
