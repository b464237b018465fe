// Fee and endpoint filters applied to candidate queries
use serde::{Deserialize, Serialize};

/// Minimum amount of one denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "crate::utils::token_amount")]
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: &str, amount: u128) -> Self {
        Self {
            denom: denom.to_string(),
            amount,
        }
    }
}

/// Minimum incentive required per relay action.
///
/// Within one list the denominations are alternatives: a packet qualifies
/// if any listed denom meets its minimum. An empty list means no minimum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeFilter {
    #[serde(default)]
    pub recv_fee: Vec<Coin>,
    #[serde(default)]
    pub ack_fee: Vec<Coin>,
    #[serde(default)]
    pub timeout_fee: Vec<Coin>,
}

impl FeeFilter {
    pub fn is_empty(&self) -> bool {
        self.recv_fee.is_empty() && self.ack_fee.is_empty() && self.timeout_fee.is_empty()
    }
}

/// Fee filter that applies to packets coming from one counterparty chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyFeeFilter {
    pub chain_id: String,
    #[serde(default)]
    pub fee_filter: FeeFilter,
}

impl CounterpartyFeeFilter {
    pub fn new(chain_id: &str, fee_filter: FeeFilter) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            fee_filter,
        }
    }

    /// Counterparty with no fee requirement
    pub fn unfiltered(chain_id: &str) -> Self {
        Self::new(chain_id, FeeFilter::default())
    }
}

/// One allowed connection, optionally narrowed to some of its channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFilter {
    pub connection_id: String,
    /// Empty or absent: every channel on the connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
}

impl ConnectionFilter {
    pub fn connection(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            channels: None,
        }
    }

    pub fn channels(connection_id: &str, channels: &[&str]) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            channels: Some(channels.iter().map(|c| c.to_string()).collect()),
        }
    }

    /// Channel restriction, if any
    pub(crate) fn channel_list(&self) -> Option<&[String]> {
        match &self.channels {
            Some(channels) if !channels.is_empty() => Some(channels),
            _ => None,
        }
    }
}

/// Endpoint restriction for candidate queries; empty means search all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<ConnectionFilter>>,
}

impl PacketFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn connections(connections: Vec<ConnectionFilter>) -> Self {
        Self {
            connections: Some(connections),
        }
    }

    /// Connection restrictions, if any
    pub(crate) fn connection_list(&self) -> Option<&[ConnectionFilter]> {
        match &self.connections {
            Some(connections) if !connections.is_empty() => Some(connections),
            _ => None,
        }
    }
}

/// Reference point on a chain that timeouts are evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    /// Block time in nanoseconds
    pub timestamp: u64,
}

impl ChainTip {
    pub fn new(height: u64, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}
