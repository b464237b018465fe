// Claim gate: exclusive in-progress marking of candidates
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{PacketKey, PacketRecord, PacketStore, PacketTable};

/// Marks records as being relayed so no other worker selects them.
///
/// A claim is a conditional update on the store, so two workers racing for
/// the same record can never both win.
#[derive(Clone)]
pub struct ClaimGate {
    store: PacketStore,
}

impl ClaimGate {
    pub fn new(store: PacketStore) -> Self {
        Self { store }
    }

    /// Claim one record. False if it is already claimed or no longer exists.
    pub fn claim(&self, table: PacketTable, key: &PacketKey) -> Result<bool> {
        let won = self.store.compare_and_set_in_progress(table, key, false)?;
        if won {
            debug!("Claimed {} packet {}/{}/{}", table, key.chain_id, key.channel_id, key.sequence);
        } else {
            debug!(
                "Claim on {} packet {}/{}/{} lost",
                table, key.chain_id, key.channel_id, key.sequence
            );
        }
        Ok(won)
    }

    /// Release a claim after a failed relay attempt; false if it was not held
    pub fn release(&self, table: PacketTable, key: &PacketKey) -> Result<bool> {
        let released = self.store.compare_and_set_in_progress(table, key, true)?;
        if released {
            debug!("Released {} packet {}/{}/{}", table, key.chain_id, key.channel_id, key.sequence);
        } else {
            warn!(
                "Release of {} packet {}/{}/{} found no claim",
                table, key.chain_id, key.channel_id, key.sequence
            );
        }
        Ok(released)
    }

    pub fn claim_record(&self, table: PacketTable, record: &PacketRecord) -> Result<bool> {
        self.claim(table, &record.key(table))
    }

    /// Claim each record in turn and keep only the ones this caller won
    pub fn claim_all(&self, table: PacketTable, records: Vec<PacketRecord>) -> Result<Vec<PacketRecord>> {
        let mut claimed = Vec::with_capacity(records.len());
        for mut record in records {
            if self.claim_record(table, &record)? {
                record.in_progress = true;
                claimed.push(record);
            }
        }
        Ok(claimed)
    }

    /// Release a batch of claims, returning how many were actually held
    pub fn release_all(&self, table: PacketTable, keys: &[PacketKey]) -> Result<usize> {
        let mut released = 0;
        for key in keys {
            if self.release(table, key)? {
                released += 1;
            }
        }
        Ok(released)
    }
}
