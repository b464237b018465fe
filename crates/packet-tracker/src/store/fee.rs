// Relay incentive (ICS-29 fee) ledger
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::lock;
use crate::error::{Result, TrackerError};
use crate::utils::{fee_amount_from_sql, fee_amount_to_sql, to_sql_int};

/// Relay action a fee incentivizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    Recv,
    Ack,
    Timeout,
}

impl FeeType {
    pub const ALL: [FeeType; 3] = [FeeType::Recv, FeeType::Ack, FeeType::Timeout];

    pub(crate) fn as_sql(&self) -> i64 {
        match self {
            FeeType::Recv => 0,
            FeeType::Ack => 1,
            FeeType::Timeout => 2,
        }
    }
}

/// Fee accounting consumed by eligibility checks and packet finalization
pub trait FeeLedger: Send + Sync {
    /// Accumulated amount of `denom` escrowed for one fee class of a packet
    fn amount_for(
        &self,
        chain_id: &str,
        channel_id: &str,
        sequence: u64,
        fee_type: FeeType,
        denom: &str,
    ) -> Result<u128>;

    /// Drop every denomination of one fee class of a packet
    fn remove(&self, chain_id: &str, channel_id: &str, sequence: u64, fee_type: FeeType) -> Result<usize>;

    /// Add an incentive payment; repeated payments in the same denom accumulate.
    /// A sum past `u128::MAX` is rejected and leaves the ledger unchanged.
    fn add(
        &self,
        chain_id: &str,
        channel_id: &str,
        sequence: u64,
        fee_type: FeeType,
        denom: &str,
        amount: u128,
    ) -> Result<()>;
}

/// Fee ledger living in the packet store's database
#[derive(Clone)]
pub struct SqliteFeeLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFeeLedger {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl FeeLedger for SqliteFeeLedger {
    fn amount_for(
        &self,
        chain_id: &str,
        channel_id: &str,
        sequence: u64,
        fee_type: FeeType,
        denom: &str,
    ) -> Result<u128> {
        let conn = lock(&self.conn)?;
        Ok(read_amount(&conn, chain_id, channel_id, sequence, fee_type, denom)?.unwrap_or(0))
    }

    fn remove(&self, chain_id: &str, channel_id: &str, sequence: u64, fee_type: FeeType) -> Result<usize> {
        let conn = lock(&self.conn)?;
        remove_fee(&conn, chain_id, channel_id, sequence, fee_type)
    }

    fn add(
        &self,
        chain_id: &str,
        channel_id: &str,
        sequence: u64,
        fee_type: FeeType,
        denom: &str,
        amount: u128,
    ) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let current = read_amount(&tx, chain_id, channel_id, sequence, fee_type, denom)?.unwrap_or(0);
        let total = current.checked_add(amount).ok_or_else(|| {
            TrackerError::InvalidEvent(format!(
                "{:?} fee in {} for {}/{}/{} overflows",
                fee_type, denom, chain_id, channel_id, sequence
            ))
        })?;
        tx.execute(
            "INSERT INTO packet_fee (chain_id, channel_id, sequence, fee_type, denom, amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (chain_id, channel_id, sequence, fee_type, denom)
             DO UPDATE SET amount = excluded.amount",
            params![
                chain_id,
                channel_id,
                to_sql_int(sequence),
                fee_type.as_sql(),
                denom,
                fee_amount_to_sql(total)
            ],
        )?;
        tx.commit()?;
        debug!("Recorded {:?} fee {}{} for {}/{}/{}", fee_type, amount, denom, chain_id, channel_id, sequence);
        Ok(())
    }
}

fn read_amount(
    conn: &Connection,
    chain_id: &str,
    channel_id: &str,
    sequence: u64,
    fee_type: FeeType,
    denom: &str,
) -> Result<Option<u128>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT amount FROM packet_fee
             WHERE chain_id = ?1 AND channel_id = ?2 AND sequence = ?3 AND fee_type = ?4 AND denom = ?5",
            params![chain_id, channel_id, to_sql_int(sequence), fee_type.as_sql(), denom],
            |row| row.get(0),
        )
        .optional()?;
    text.map(|text| {
        fee_amount_from_sql(&text)
            .ok_or_else(|| TrackerError::Serialization(format!("corrupt fee amount: {}", text)))
    })
    .transpose()
}

/// Shared by the ledger and by batch commits running inside a transaction
pub(crate) fn remove_fee(
    conn: &Connection,
    chain_id: &str,
    channel_id: &str,
    sequence: u64,
    fee_type: FeeType,
) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM packet_fee WHERE chain_id = ?1 AND channel_id = ?2 AND sequence = ?3 AND fee_type = ?4",
        params![chain_id, channel_id, to_sql_int(sequence), fee_type.as_sql()],
    )?;
    Ok(removed)
}
