// Normalized packet lifecycle events

pub mod cosmos_events;

use serde::{Deserialize, Serialize};

use crate::chains::ChainEvent;
use crate::error::{Result, TrackerError};
use crate::utils::{hex_bytes, parse_timeout_height, parse_timeout_timestamp};

pub use cosmos_events::{parse_packet_event, parse_packet_events};

/// Channel ordering of the packet's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrdering {
    #[serde(rename = "ORDER_ORDERED")]
    Ordered,
    #[serde(rename = "ORDER_UNORDERED")]
    Unordered,
}

impl ChannelOrdering {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ORDER_ORDERED" | "ordered" => Some(Self::Ordered),
            "ORDER_UNORDERED" | "unordered" => Some(Self::Unordered),
            _ => None,
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Ordered)
    }
}

/// Packet fields shared by every lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
    /// Height at which the event was observed
    pub height: u64,
    pub sequence: u64,
    pub src_port: String,
    pub src_channel: String,
    pub dst_port: String,
    pub dst_channel: String,
    /// Connection on the chain that emitted the event
    pub connection_id: String,
    pub ordering: ChannelOrdering,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Timeout height exactly as emitted, e.g. "1-1000"
    #[serde(default)]
    pub timeout_height_raw: String,
    /// Timeout timestamp in nanoseconds exactly as emitted
    #[serde(default)]
    pub timeout_timestamp_raw: String,
    /// Acknowledgement bytes, only present on write-acknowledgement events
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub ack: Vec<u8>,
}

impl PacketInfo {
    /// Parse the timeout pair into comparable values, keeping the raw strings
    pub fn timeout(&self) -> Result<PacketTimeout> {
        PacketTimeout::from_raw(&self.timeout_height_raw, &self.timeout_timestamp_raw)
    }
}

/// Timeout height and timestamp, each as a native value and its original string.
///
/// A zero native value means the dimension is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketTimeout {
    pub height: u64,
    pub timestamp: u64,
    pub height_raw: String,
    pub timestamp_raw: String,
}

impl PacketTimeout {
    pub fn from_raw(height_raw: &str, timestamp_raw: &str) -> Result<Self> {
        let height = parse_timeout_height(height_raw).ok_or_else(|| {
            TrackerError::InvalidEvent(format!("bad timeout height: {}", height_raw))
        })?;
        let timestamp = parse_timeout_timestamp(timestamp_raw).ok_or_else(|| {
            TrackerError::InvalidEvent(format!("bad timeout timestamp: {}", timestamp_raw))
        })?;

        Ok(Self {
            height,
            timestamp,
            height_raw: height_raw.to_string(),
            timestamp_raw: timestamp_raw.to_string(),
        })
    }

    /// Height-only timeout, mostly useful for fixtures
    pub fn at_height(height: u64) -> Self {
        Self {
            height,
            timestamp: 0,
            height_raw: format!("0-{}", height),
            timestamp_raw: "0".to_string(),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.height == 0 && self.timestamp == 0
    }
}

/// IBC packet lifecycle events the tracker consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PacketEvent {
    SendPacket(PacketInfo),
    WriteAcknowledgement(PacketInfo),
    AcknowledgePacket(PacketInfo),
    TimeoutPacket(PacketInfo),
}

impl PacketEvent {
    /// Normalize a raw chain event; `Ok(None)` for untracked event types
    pub fn from_chain_event(raw_event: &ChainEvent) -> Result<Option<Self>> {
        parse_packet_event(raw_event)
    }

    pub fn packet(&self) -> &PacketInfo {
        match self {
            PacketEvent::SendPacket(info)
            | PacketEvent::WriteAcknowledgement(info)
            | PacketEvent::AcknowledgePacket(info)
            | PacketEvent::TimeoutPacket(info) => info,
        }
    }

    /// Event type string as emitted on chain
    pub fn kind(&self) -> &'static str {
        match self {
            PacketEvent::SendPacket(_) => "send_packet",
            PacketEvent::WriteAcknowledgement(_) => "write_acknowledgement",
            PacketEvent::AcknowledgePacket(_) => "acknowledge_packet",
            PacketEvent::TimeoutPacket(_) => "timeout_packet",
        }
    }
}
