// Lifecycle store: persisted send / timeout / write-ack packet state on SQLite
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

pub mod connection;
pub mod fee;
pub mod records;
pub(crate) mod sql;

pub use fee::{FeeLedger, FeeType, SqliteFeeLedger};
pub use records::{PacketKey, PacketRecord, PacketTable, WriteAckRecord};

use crate::error::{Result, TrackerError};
use crate::utils::to_sql_int;
use records::RECORD_COLUMNS;
use sql::Conditions;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS packet_send (
    dst_chain_id TEXT NOT NULL,
    dst_connection_id TEXT NOT NULL,
    dst_channel_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    dst_port TEXT NOT NULL,
    src_chain_id TEXT NOT NULL,
    src_connection_id TEXT NOT NULL,
    src_channel_id TEXT NOT NULL,
    src_port TEXT NOT NULL,
    is_ordered INTEGER NOT NULL,
    in_progress INTEGER NOT NULL DEFAULT 0,
    packet_data BLOB NOT NULL,
    timeout_height INTEGER NOT NULL,
    timeout_timestamp INTEGER NOT NULL,
    timeout_height_raw TEXT NOT NULL,
    timeout_timestamp_raw TEXT NOT NULL,
    height INTEGER NOT NULL,
    PRIMARY KEY (dst_chain_id, dst_connection_id, dst_channel_id, sequence)
);
CREATE INDEX IF NOT EXISTS packet_send_candidates
    ON packet_send (dst_chain_id, src_chain_id, in_progress, sequence);

CREATE TABLE IF NOT EXISTS packet_timeout (
    src_chain_id TEXT NOT NULL,
    src_connection_id TEXT NOT NULL,
    src_channel_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    src_port TEXT NOT NULL,
    dst_chain_id TEXT NOT NULL,
    dst_connection_id TEXT NOT NULL,
    dst_channel_id TEXT NOT NULL,
    dst_port TEXT NOT NULL,
    is_ordered INTEGER NOT NULL,
    in_progress INTEGER NOT NULL DEFAULT 0,
    packet_data BLOB NOT NULL,
    timeout_height INTEGER NOT NULL,
    timeout_timestamp INTEGER NOT NULL,
    timeout_height_raw TEXT NOT NULL,
    timeout_timestamp_raw TEXT NOT NULL,
    height INTEGER NOT NULL,
    PRIMARY KEY (src_chain_id, src_connection_id, src_channel_id, sequence)
);
CREATE INDEX IF NOT EXISTS packet_timeout_candidates
    ON packet_timeout (src_chain_id, dst_chain_id, in_progress, sequence);

CREATE TABLE IF NOT EXISTS packet_write_ack (
    src_chain_id TEXT NOT NULL,
    src_connection_id TEXT NOT NULL,
    src_channel_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    src_port TEXT NOT NULL,
    dst_chain_id TEXT NOT NULL,
    dst_connection_id TEXT NOT NULL,
    dst_channel_id TEXT NOT NULL,
    dst_port TEXT NOT NULL,
    is_ordered INTEGER NOT NULL,
    in_progress INTEGER NOT NULL DEFAULT 0,
    packet_data BLOB NOT NULL,
    ack BLOB NOT NULL,
    timeout_height INTEGER NOT NULL,
    timeout_timestamp INTEGER NOT NULL,
    timeout_height_raw TEXT NOT NULL,
    timeout_timestamp_raw TEXT NOT NULL,
    height INTEGER NOT NULL,
    PRIMARY KEY (src_chain_id, src_connection_id, src_channel_id, sequence)
);
CREATE INDEX IF NOT EXISTS packet_write_ack_candidates
    ON packet_write_ack (src_chain_id, dst_chain_id, in_progress, sequence);

CREATE TABLE IF NOT EXISTS packet_fee (
    chain_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    fee_type INTEGER NOT NULL,
    denom TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (chain_id, channel_id, sequence, fee_type, denom)
);

CREATE TABLE IF NOT EXISTS connection (
    chain_id TEXT NOT NULL,
    connection_id TEXT NOT NULL,
    counterparty_chain_id TEXT NOT NULL,
    counterparty_connection_id TEXT NOT NULL,
    PRIMARY KEY (chain_id, connection_id)
);
";

/// One storage change prepared ahead of a batch commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    InsertSend(PacketRecord),
    InsertTimeout(PacketRecord),
    InsertWriteAck(WriteAckRecord),
    Delete(PacketTable, PacketKey),
    RemoveFee {
        chain_id: String,
        channel_id: String,
        sequence: u64,
        fee_type: FeeType,
    },
}

/// Row counts touched by [`PacketStore::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub inserted: usize,
    pub deleted: usize,
    pub fees_removed: usize,
}

/// Record counts per set, for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub send_pending: usize,
    pub timeout_pending: usize,
    pub write_ack_pending: usize,
    pub claimed: usize,
}

pub(crate) fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| TrackerError::LockPoisoned)
}

/// Shared handle on the relational store; clones share one connection
#[derive(Clone)]
pub struct PacketStore {
    conn: Arc<Mutex<Connection>>,
}

impl PacketStore {
    /// Open (or create) an on-disk store
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Packet store journal mode: {}", mode);
        info!("Opened packet store at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    /// Private in-memory store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// Fee ledger sharing this store's database
    pub fn fee_ledger(&self) -> SqliteFeeLedger {
        SqliteFeeLedger::new(self.conn.clone())
    }

    /// Insert a send-pending record; returns false if the key already exists
    pub fn insert_send_packet(&self, record: &PacketRecord) -> Result<bool> {
        let conn = self.lock()?;
        Ok(insert_record(&conn, PacketTable::Send, record, None)? == 1)
    }

    /// Insert a timeout-pending record; returns false if the key already exists
    pub fn insert_timeout_packet(&self, record: &PacketRecord) -> Result<bool> {
        let conn = self.lock()?;
        Ok(insert_record(&conn, PacketTable::Timeout, record, None)? == 1)
    }

    /// Insert a write-ack-pending record; returns false if the key already exists
    pub fn insert_write_ack_packet(&self, record: &WriteAckRecord) -> Result<bool> {
        let conn = self.lock()?;
        Ok(insert_record(&conn, PacketTable::WriteAck, &record.packet, Some(&record.ack))? == 1)
    }

    /// Delete records by key in one transaction. Absent keys are skipped.
    pub fn delete_packets(&self, table: PacketTable, keys: &[PacketKey]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for key in keys {
            deleted += delete_record(&tx, table, key)?;
        }
        tx.commit()?;
        debug!("Deleted {} of {} keys from {}", deleted, keys.len(), table);
        Ok(deleted)
    }

    /// Set the claim flag on a batch of records unconditionally
    pub fn update_in_progress(&self, table: PacketTable, keys: &[PacketKey], in_progress: bool) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let [a, b, c, d] = table.key_columns();
        let sql = format!(
            "UPDATE {} SET in_progress = ?5 WHERE {a} = ?1 AND {b} = ?2 AND {c} = ?3 AND {d} = ?4",
            table.table_name()
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for key in keys {
                updated += stmt.execute(params![
                    key.chain_id,
                    key.connection_id,
                    key.channel_id,
                    to_sql_int(key.sequence),
                    in_progress
                ])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Atomically flip the claim flag from `from` to `!from`.
    ///
    /// Returns true only if this call changed the flag.
    pub(crate) fn compare_and_set_in_progress(&self, table: PacketTable, key: &PacketKey, from: bool) -> Result<bool> {
        let [a, b, c, d] = table.key_columns();
        let sql = format!(
            "UPDATE {} SET in_progress = ?6
             WHERE {a} = ?1 AND {b} = ?2 AND {c} = ?3 AND {d} = ?4 AND in_progress = ?5",
            table.table_name()
        );
        let conn = self.lock()?;
        let changed = conn.execute(
            &sql,
            params![
                key.chain_id,
                key.connection_id,
                key.channel_id,
                to_sql_int(key.sequence),
                from,
                !from
            ],
        )?;
        Ok(changed == 1)
    }

    /// Clear every claim flag in all three record sets.
    ///
    /// Run once at start-up: anything claimed when the previous process died
    /// becomes selectable again.
    pub fn reset_in_progress(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut cleared = 0;
        for table in PacketTable::ALL {
            cleared += tx.execute(
                &format!("UPDATE {} SET in_progress = 0 WHERE in_progress != 0", table.table_name()),
                [],
            )?;
        }
        tx.commit()?;
        info!("Reset {} in-progress packet claims", cleared);
        Ok(cleared)
    }

    /// Point lookup; for the write-ack set this returns the packet part only
    pub fn get_packet(&self, table: PacketTable, key: &PacketKey) -> Result<Option<PacketRecord>> {
        let [a, b, c, d] = table.key_columns();
        let sql = format!(
            "SELECT {} FROM {} WHERE {a} = ?1 AND {b} = ?2 AND {c} = ?3 AND {d} = ?4",
            RECORD_COLUMNS,
            table.table_name()
        );
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &sql,
                params![key.chain_id, key.connection_id, key.channel_id, to_sql_int(key.sequence)],
                PacketRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_write_ack(&self, key: &PacketKey) -> Result<Option<WriteAckRecord>> {
        let [a, b, c, d] = PacketTable::WriteAck.key_columns();
        let sql = format!(
            "SELECT {}, ack FROM packet_write_ack WHERE {a} = ?1 AND {b} = ?2 AND {c} = ?3 AND {d} = ?4",
            RECORD_COLUMNS
        );
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &sql,
                params![key.chain_id, key.connection_id, key.channel_id, to_sql_int(key.sequence)],
                WriteAckRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn count(&self, table: PacketTable) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.table_name()), [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let mut counts = [0usize; 3];
        let mut claimed = 0usize;
        for (i, table) in PacketTable::ALL.iter().enumerate() {
            let (total, in_progress): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(in_progress != 0), 0) FROM {}",
                    table.table_name()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            counts[i] = usize::try_from(total).unwrap_or(0);
            claimed += usize::try_from(in_progress).unwrap_or(0);
        }
        Ok(StoreStats {
            send_pending: counts[0],
            timeout_pending: counts[1],
            write_ack_pending: counts[2],
            claimed,
        })
    }

    /// Apply a prepared list of mutations in a single transaction, in order
    pub fn apply(&self, mutations: &[Mutation]) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();
        if mutations.is_empty() {
            return Ok(summary);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for mutation in mutations {
            match mutation {
                Mutation::InsertSend(record) => {
                    summary.inserted += insert_record(&tx, PacketTable::Send, record, None)?;
                }
                Mutation::InsertTimeout(record) => {
                    summary.inserted += insert_record(&tx, PacketTable::Timeout, record, None)?;
                }
                Mutation::InsertWriteAck(record) => {
                    summary.inserted +=
                        insert_record(&tx, PacketTable::WriteAck, &record.packet, Some(&record.ack))?;
                }
                Mutation::Delete(table, key) => {
                    summary.deleted += delete_record(&tx, *table, key)?;
                }
                Mutation::RemoveFee {
                    chain_id,
                    channel_id,
                    sequence,
                    fee_type,
                } => {
                    summary.fees_removed += fee::remove_fee(&tx, chain_id, channel_id, *sequence, *fee_type)?;
                }
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    pub(crate) fn select_packets(
        &self,
        table: PacketTable,
        conditions: &Conditions,
        limit: usize,
    ) -> Result<Vec<PacketRecord>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY sequence ASC LIMIT ?",
            RECORD_COLUMNS,
            table.table_name(),
            conditions.where_clause()
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(with_limit(conditions, limit)), PacketRecord::from_row)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub(crate) fn select_write_acks(&self, conditions: &Conditions, limit: usize) -> Result<Vec<WriteAckRecord>> {
        let sql = format!(
            "SELECT {}, ack FROM packet_write_ack {} ORDER BY sequence ASC LIMIT ?",
            RECORD_COLUMNS,
            conditions.where_clause()
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(with_limit(conditions, limit)), WriteAckRecord::from_row)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(TrackerError::Config(format!(
            "packet store schema version {} is newer than supported {}",
            current, SCHEMA_VERSION
        )));
    }
    if current < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!("Initialized packet store schema v{}", SCHEMA_VERSION);
    }
    Ok(())
}

fn with_limit(conditions: &Conditions, limit: usize) -> Vec<Value> {
    let mut values = conditions.params().to_vec();
    values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    values
}

fn record_values(record: &PacketRecord) -> Vec<Value> {
    vec![
        Value::Text(record.src_chain_id.clone()),
        Value::Text(record.src_connection_id.clone()),
        Value::Text(record.src_channel_id.clone()),
        Value::Text(record.src_port.clone()),
        Value::Text(record.dst_chain_id.clone()),
        Value::Text(record.dst_connection_id.clone()),
        Value::Text(record.dst_channel_id.clone()),
        Value::Text(record.dst_port.clone()),
        Value::Integer(to_sql_int(record.sequence)),
        Value::Integer(i64::from(record.ordering.is_ordered())),
        Value::Integer(i64::from(record.in_progress)),
        Value::Blob(record.packet_data.clone()),
        Value::Integer(to_sql_int(record.timeout.height)),
        Value::Integer(to_sql_int(record.timeout.timestamp)),
        Value::Text(record.timeout.height_raw.clone()),
        Value::Text(record.timeout.timestamp_raw.clone()),
        Value::Integer(to_sql_int(record.height)),
    ]
}

/// Re-ingesting an already stored event is a no-op, hence `OR IGNORE`
fn insert_record(conn: &Connection, table: PacketTable, record: &PacketRecord, ack: Option<&[u8]>) -> Result<usize> {
    let mut values = record_values(record);
    let columns = match ack {
        Some(ack) => {
            values.push(Value::Blob(ack.to_vec()));
            format!("{}, ack", RECORD_COLUMNS)
        }
        None => RECORD_COLUMNS.to_string(),
    };
    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        table.table_name(),
        columns,
        placeholders
    );
    let inserted = conn.execute(&sql, params_from_iter(values))?;
    Ok(inserted)
}

fn delete_record(conn: &Connection, table: PacketTable, key: &PacketKey) -> Result<usize> {
    let [a, b, c, d] = table.key_columns();
    let sql = format!(
        "DELETE FROM {} WHERE {a} = ?1 AND {b} = ?2 AND {c} = ?3 AND {d} = ?4",
        table.table_name()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let deleted = stmt.execute(params![
        key.chain_id,
        key.connection_id,
        key.channel_id,
        to_sql_int(key.sequence)
    ])?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelOrdering, PacketTimeout};

    fn record(sequence: u64) -> PacketRecord {
        PacketRecord {
            src_chain_id: "chain-a".to_string(),
            src_connection_id: "connection-7".to_string(),
            src_channel_id: "channel-3".to_string(),
            src_port: "transfer".to_string(),
            dst_chain_id: "chain-b".to_string(),
            dst_connection_id: "connection-12".to_string(),
            dst_channel_id: "channel-9".to_string(),
            dst_port: "transfer".to_string(),
            sequence,
            ordering: ChannelOrdering::Ordered,
            in_progress: false,
            packet_data: vec![0xde, 0xad],
            timeout: PacketTimeout::at_height(1000),
            height: 5,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = PacketStore::open_in_memory().unwrap();
        let packet = record(1);

        assert!(store.insert_send_packet(&packet).unwrap());
        assert!(!store.insert_send_packet(&packet).unwrap());

        let found = store.get_packet(PacketTable::Send, &packet.key(PacketTable::Send)).unwrap();
        assert_eq!(found, Some(packet.clone()));

        // send records are keyed on the destination side only
        assert!(store.get_packet(PacketTable::Send, &packet.key(PacketTable::Timeout)).unwrap().is_none());
        assert_eq!(store.count(PacketTable::Send).unwrap(), 1);
        assert_eq!(store.count(PacketTable::Timeout).unwrap(), 0);
    }

    #[test]
    fn test_large_timestamp_keeps_raw_precision() {
        let store = PacketStore::open_in_memory().unwrap();
        let mut packet = record(2);
        packet.timeout = PacketTimeout::from_raw("0-0", "18446744073709551615000").unwrap();
        store.insert_timeout_packet(&packet).unwrap();

        let found = store
            .get_packet(PacketTable::Timeout, &packet.key(PacketTable::Timeout))
            .unwrap()
            .unwrap();
        assert_eq!(found.timeout.timestamp_raw, "18446744073709551615000");
        assert_eq!(found.timeout.timestamp, i64::MAX as u64);
    }

    #[test]
    fn test_delete_is_noop_for_empty_and_absent() {
        let store = PacketStore::open_in_memory().unwrap();
        assert_eq!(store.delete_packets(PacketTable::Send, &[]).unwrap(), 0);
        assert_eq!(
            store
                .delete_packets(PacketTable::Timeout, &[PacketKey::new("x", "connection-0", "channel-0", 1)])
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_compare_and_set() {
        let store = PacketStore::open_in_memory().unwrap();
        let packet = record(3);
        let key = packet.key(PacketTable::Send);
        store.insert_send_packet(&packet).unwrap();

        assert!(store.compare_and_set_in_progress(PacketTable::Send, &key, false).unwrap());
        assert!(!store.compare_and_set_in_progress(PacketTable::Send, &key, false).unwrap());
        assert!(store.compare_and_set_in_progress(PacketTable::Send, &key, true).unwrap());
        assert!(!store.compare_and_set_in_progress(PacketTable::Send, &key, true).unwrap());
    }

    #[test]
    fn test_apply_batches_in_order() {
        let store = PacketStore::open_in_memory().unwrap();
        let packet = record(4);
        let existing = WriteAckRecord {
            packet: record(4),
            ack: vec![1],
        };
        store.insert_write_ack_packet(&existing).unwrap();

        // A write-ack insert for the same key is ignored, so this batch succeeds
        let summary = store
            .apply(&[
                Mutation::InsertSend(packet.clone()),
                Mutation::InsertTimeout(packet.clone()),
                Mutation::InsertWriteAck(existing),
            ])
            .unwrap();
        assert_eq!(summary.inserted, 2);

        let summary = store
            .apply(&[
                Mutation::Delete(PacketTable::Send, packet.key(PacketTable::Send)),
                Mutation::Delete(PacketTable::Timeout, packet.key(PacketTable::Timeout)),
                Mutation::Delete(PacketTable::WriteAck, packet.key(PacketTable::WriteAck)),
            ])
            .unwrap();
        assert_eq!(summary.deleted, 3);
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_schema_is_reopened_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tracker.db");
        {
            let store = PacketStore::open(&path, Duration::from_millis(100)).unwrap();
            store.insert_send_packet(&record(9)).unwrap();
        }
        let store = PacketStore::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(store.count(PacketTable::Send).unwrap(), 1);
    }
}
