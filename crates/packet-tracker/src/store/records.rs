// Persisted packet records and their composite keys
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::chains::ConnectionInfo;
use crate::events::{ChannelOrdering, PacketInfo, PacketTimeout};
use crate::utils::{from_sql_int, hex_bytes};

/// The three record sets the tracker maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketTable {
    /// Sent, awaiting delivery on the destination chain
    Send,
    /// Mirror of a send, awaiting a timeout proof back on the source chain
    Timeout,
    /// Received and acknowledged, awaiting ack relay back to the source chain
    WriteAck,
}

impl PacketTable {
    pub const ALL: [PacketTable; 3] = [PacketTable::Send, PacketTable::Timeout, PacketTable::WriteAck];

    pub fn table_name(&self) -> &'static str {
        match self {
            PacketTable::Send => "packet_send",
            PacketTable::Timeout => "packet_timeout",
            PacketTable::WriteAck => "packet_write_ack",
        }
    }

    /// Composite key columns; send records are keyed on the destination side
    pub(crate) fn key_columns(&self) -> [&'static str; 4] {
        match self {
            PacketTable::Send => ["dst_chain_id", "dst_connection_id", "dst_channel_id", "sequence"],
            PacketTable::Timeout | PacketTable::WriteAck => {
                ["src_chain_id", "src_connection_id", "src_channel_id", "sequence"]
            }
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "send" => Some(PacketTable::Send),
            "timeout" => Some(PacketTable::Timeout),
            "write_ack" | "write-ack" => Some(PacketTable::WriteAck),
            _ => None,
        }
    }
}

impl std::fmt::Display for PacketTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Composite identity of a record within one record set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketKey {
    pub chain_id: String,
    pub connection_id: String,
    pub channel_id: String,
    pub sequence: u64,
}

impl PacketKey {
    pub fn new(chain_id: &str, connection_id: &str, channel_id: &str, sequence: u64) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            connection_id: connection_id.to_string(),
            channel_id: channel_id.to_string(),
            sequence,
        }
    }
}

/// Relay-relevant state of one in-flight packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub src_chain_id: String,
    pub src_connection_id: String,
    pub src_channel_id: String,
    pub src_port: String,
    pub dst_chain_id: String,
    pub dst_connection_id: String,
    pub dst_channel_id: String,
    pub dst_port: String,
    pub sequence: u64,
    pub ordering: ChannelOrdering,
    /// Claim flag; set while a relay attempt owns the record
    pub in_progress: bool,
    #[serde(with = "hex_bytes")]
    pub packet_data: Vec<u8>,
    pub timeout: PacketTimeout,
    /// Height at which the originating event was observed
    pub height: u64,
}

/// Column order shared by inserts, selects and [`PacketRecord::from_row`]
pub(crate) const RECORD_COLUMNS: &str = "src_chain_id, src_connection_id, src_channel_id, src_port, \
     dst_chain_id, dst_connection_id, dst_channel_id, dst_port, \
     sequence, is_ordered, in_progress, packet_data, \
     timeout_height, timeout_timestamp, timeout_height_raw, timeout_timestamp_raw, height";

impl PacketRecord {
    /// Record for a packet sent from `chain_id` over the given connection
    pub fn from_send(chain_id: &str, connection: &ConnectionInfo, info: &PacketInfo, timeout: PacketTimeout) -> Self {
        Self {
            src_chain_id: chain_id.to_string(),
            src_connection_id: info.connection_id.clone(),
            src_channel_id: info.src_channel.clone(),
            src_port: info.src_port.clone(),
            dst_chain_id: connection.counterparty_chain_id.clone(),
            dst_connection_id: connection.counterparty_connection_id.clone(),
            dst_channel_id: info.dst_channel.clone(),
            dst_port: info.dst_port.clone(),
            sequence: info.sequence,
            ordering: info.ordering,
            in_progress: false,
            packet_data: info.data.clone(),
            timeout,
            height: info.height,
        }
    }

    /// Record for a packet received on `chain_id`; the origin is the counterparty
    pub fn from_receive(chain_id: &str, connection: &ConnectionInfo, info: &PacketInfo, timeout: PacketTimeout) -> Self {
        Self {
            src_chain_id: connection.counterparty_chain_id.clone(),
            src_connection_id: connection.counterparty_connection_id.clone(),
            src_channel_id: info.src_channel.clone(),
            src_port: info.src_port.clone(),
            dst_chain_id: chain_id.to_string(),
            dst_connection_id: info.connection_id.clone(),
            dst_channel_id: info.dst_channel.clone(),
            dst_port: info.dst_port.clone(),
            sequence: info.sequence,
            ordering: info.ordering,
            in_progress: false,
            packet_data: info.data.clone(),
            timeout,
            height: info.height,
        }
    }

    /// Key of this record within `table`
    pub fn key(&self, table: PacketTable) -> PacketKey {
        match table {
            PacketTable::Send => PacketKey::new(
                &self.dst_chain_id,
                &self.dst_connection_id,
                &self.dst_channel_id,
                self.sequence,
            ),
            PacketTable::Timeout | PacketTable::WriteAck => PacketKey::new(
                &self.src_chain_id,
                &self.src_connection_id,
                &self.src_channel_id,
                self.sequence,
            ),
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let is_ordered: bool = row.get(9)?;
        Ok(Self {
            src_chain_id: row.get(0)?,
            src_connection_id: row.get(1)?,
            src_channel_id: row.get(2)?,
            src_port: row.get(3)?,
            dst_chain_id: row.get(4)?,
            dst_connection_id: row.get(5)?,
            dst_channel_id: row.get(6)?,
            dst_port: row.get(7)?,
            sequence: from_sql_int(row.get(8)?),
            ordering: if is_ordered {
                ChannelOrdering::Ordered
            } else {
                ChannelOrdering::Unordered
            },
            in_progress: row.get(10)?,
            packet_data: row.get(11)?,
            timeout: PacketTimeout {
                height: from_sql_int(row.get(12)?),
                timestamp: from_sql_int(row.get(13)?),
                height_raw: row.get(14)?,
                timestamp_raw: row.get(15)?,
            },
            height: from_sql_int(row.get(16)?),
        })
    }
}

/// Write-ack-pending record: a packet plus the acknowledgement to relay back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAckRecord {
    #[serde(flatten)]
    pub packet: PacketRecord,
    #[serde(with = "hex_bytes")]
    pub ack: Vec<u8>,
}

impl WriteAckRecord {
    pub fn key(&self) -> PacketKey {
        self.packet.key(PacketTable::WriteAck)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            packet: PacketRecord::from_row(row)?,
            ack: row.get(17)?,
        })
    }
}
