// Event ingestion: packet lifecycle events into prepared store mutations
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::chains::{ConnectionInfo, ConnectionResolver};
use crate::error::Result;
use crate::events::{PacketEvent, PacketInfo};
use crate::store::{
    ApplySummary, FeeType, Mutation, PacketKey, PacketRecord, PacketStore, PacketTable, WriteAckRecord,
};

/// Mutations for one chain's event batch, not yet written anywhere.
///
/// Dropping it without calling [`PreparedBatch::commit`] leaves the store untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a prepared batch does nothing until committed"]
pub struct PreparedBatch {
    pub chain_id: String,
    /// Number of events the batch was prepared from
    pub events: usize,
    mutations: Vec<Mutation>,
}

impl PreparedBatch {
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Apply every mutation in one store transaction
    pub fn commit(self, store: &PacketStore) -> Result<ApplySummary> {
        let summary = store.apply(&self.mutations)?;
        debug!(
            "Committed {} events from {}: {} inserted, {} deleted, {} fees removed",
            self.events, self.chain_id, summary.inserted, summary.deleted, summary.fees_removed
        );
        Ok(summary)
    }
}

/// Turns packet lifecycle events into a [`PreparedBatch`].
///
/// Counterparty resolution is the only await point; nothing touches storage
/// until the caller commits.
pub struct EventIngestor<R> {
    resolver: R,
}

impl<R: ConnectionResolver> EventIngestor<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Prepare all events observed on `chain_id`, in order.
    ///
    /// The first resolution failure aborts the whole batch so the caller can
    /// retry from the same events.
    pub async fn prepare(&self, chain_id: &str, events: &[PacketEvent]) -> Result<PreparedBatch> {
        let mut resolved: HashMap<String, ConnectionInfo> = HashMap::new();
        let mut mutations = Vec::new();

        for event in events {
            let info = event.packet();
            let connection = match resolved.get(&info.connection_id) {
                Some(connection) => connection.clone(),
                None => {
                    let connection = self
                        .resolver
                        .resolve(chain_id, &info.connection_id)
                        .await
                        .map_err(|e| {
                            warn!("Aborting {} event batch from {}: {}", events.len(), chain_id, e);
                            e
                        })?;
                    resolved.insert(info.connection_id.clone(), connection.clone());
                    connection
                }
            };

            debug!(
                "Preparing {} seq {} on {} via {}",
                event.kind(),
                info.sequence,
                chain_id,
                info.connection_id
            );
            match event {
                PacketEvent::SendPacket(info) => send_mutations(chain_id, &connection, info, &mut mutations)?,
                PacketEvent::WriteAcknowledgement(info) => {
                    write_ack_mutations(chain_id, &connection, info, &mut mutations)?
                }
                PacketEvent::AcknowledgePacket(info) => {
                    finalize_mutations(chain_id, &connection, info, true, &mut mutations)
                }
                PacketEvent::TimeoutPacket(info) => {
                    finalize_mutations(chain_id, &connection, info, false, &mut mutations)
                }
            }
        }

        Ok(PreparedBatch {
            chain_id: chain_id.to_string(),
            events: events.len(),
            mutations,
        })
    }
}

/// Send observed on the origin chain: track delivery and the timeout mirror
fn send_mutations(
    chain_id: &str,
    connection: &ConnectionInfo,
    info: &PacketInfo,
    mutations: &mut Vec<Mutation>,
) -> Result<()> {
    let record = PacketRecord::from_send(chain_id, connection, info, info.timeout()?);
    mutations.push(Mutation::InsertSend(record.clone()));
    mutations.push(Mutation::InsertTimeout(record));
    Ok(())
}

/// Write-acknowledgement observed on the destination chain
fn write_ack_mutations(
    chain_id: &str,
    connection: &ConnectionInfo,
    info: &PacketInfo,
    mutations: &mut Vec<Mutation>,
) -> Result<()> {
    let packet = PacketRecord::from_receive(chain_id, connection, info, info.timeout()?);

    mutations.push(Mutation::Delete(
        PacketTable::Send,
        PacketKey::new(chain_id, &info.connection_id, &info.dst_channel, info.sequence),
    ));
    for fee_type in [FeeType::Recv, FeeType::Timeout] {
        mutations.push(Mutation::RemoveFee {
            chain_id: connection.counterparty_chain_id.clone(),
            channel_id: info.src_channel.clone(),
            sequence: info.sequence,
            fee_type,
        });
    }
    mutations.push(Mutation::InsertWriteAck(WriteAckRecord {
        packet,
        ack: info.ack.clone(),
    }));
    Ok(())
}

/// Acknowledge or timeout observed on the origin chain: the packet is done
fn finalize_mutations(
    chain_id: &str,
    connection: &ConnectionInfo,
    info: &PacketInfo,
    acknowledged: bool,
    mutations: &mut Vec<Mutation>,
) {
    let local_key = PacketKey::new(chain_id, &info.connection_id, &info.src_channel, info.sequence);

    mutations.push(Mutation::Delete(
        PacketTable::Send,
        PacketKey::new(
            &connection.counterparty_chain_id,
            &connection.counterparty_connection_id,
            &info.dst_channel,
            info.sequence,
        ),
    ));
    mutations.push(Mutation::Delete(PacketTable::Timeout, local_key.clone()));
    if acknowledged {
        mutations.push(Mutation::Delete(PacketTable::WriteAck, local_key));
    }
    for fee_type in FeeType::ALL {
        mutations.push(Mutation::RemoveFee {
            chain_id: chain_id.to_string(),
            channel_id: info.src_channel.clone(),
            sequence: info.sequence,
            fee_type,
        });
    }
}
