// Packet tracker facade: one store shared by ingestion, queries and claims
use std::time::Instant;
use tracing::{info, warn};

use crate::chains::{CachedConnectionResolver, ChainEvent, ConfiguredResolver, ConnectionResolver};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::events::{parse_packet_events, PacketEvent};
use crate::metrics::TrackerMetrics;
use crate::relay::{
    CandidateQuery, ChainTip, ClaimGate, CounterpartyFeeFilter, EventIngestor, FeeFilter, PacketFilter,
    PreparedBatch, DEFAULT_CANDIDATE_LIMIT,
};
use crate::store::{ApplySummary, PacketKey, PacketRecord, PacketStore, PacketTable, StoreStats, WriteAckRecord};

/// Tracker built from a config file
pub type ConfiguredTracker = PacketTracker<CachedConnectionResolver<ConfiguredResolver>>;

pub struct PacketTracker<R> {
    store: PacketStore,
    ingestor: EventIngestor<R>,
    query: CandidateQuery,
    gate: ClaimGate,
    metrics: Option<TrackerMetrics>,
    candidate_limit: usize,
}

impl<R: ConnectionResolver> PacketTracker<R> {
    pub fn new(store: PacketStore, resolver: R) -> Result<Self> {
        let metrics = TrackerMetrics::new().map_err(|e| TrackerError::Config(format!("metrics: {}", e)))?;
        Ok(Self {
            query: CandidateQuery::new(store.clone()),
            gate: ClaimGate::new(store.clone()),
            ingestor: EventIngestor::new(resolver),
            store,
            metrics: Some(metrics),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        })
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn without_metrics(mut self) -> Self {
        self.metrics = None;
        self
    }

    pub fn store(&self) -> &PacketStore {
        &self.store
    }

    pub fn metrics(&self) -> Option<&TrackerMetrics> {
        self.metrics.as_ref()
    }

    pub fn candidate_limit(&self) -> usize {
        self.candidate_limit
    }

    /// Forget claims left over by a previous process
    pub fn startup_reset(&self) -> Result<usize> {
        self.store.reset_in_progress()
    }

    /// Prepare a batch without committing it
    pub async fn prepare(&self, chain_id: &str, events: &[PacketEvent]) -> Result<PreparedBatch> {
        let prepared = self.ingestor.prepare(chain_id, events).await;
        if let (Err(TrackerError::Resolution(_)), Some(metrics)) = (&prepared, &self.metrics) {
            metrics.record_resolution_error();
        }
        prepared
    }

    /// Prepare and commit one chain's events; nothing is written if any event fails to resolve
    pub async fn ingest(&self, chain_id: &str, events: &[PacketEvent]) -> Result<ApplySummary> {
        let batch = self.prepare(chain_id, events).await?;
        let count = batch.events;
        let started = Instant::now();
        let summary = batch.commit(&self.store)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_commit(count, started.elapsed().as_secs_f64());
        }
        info!(
            "Ingested {} events from {} ({} inserted, {} deleted)",
            count, chain_id, summary.inserted, summary.deleted
        );
        Ok(summary)
    }

    /// Normalize raw chain events and ingest the packet events among them
    pub async fn ingest_chain_events(&self, chain_id: &str, raw_events: &[ChainEvent]) -> Result<ApplySummary> {
        let events = parse_packet_events(raw_events)?;
        self.ingest(chain_id, &events).await
    }

    pub fn send_candidates(
        &self,
        chain_id: &str,
        tip: ChainTip,
        counterparties: &[CounterpartyFeeFilter],
        filter: &PacketFilter,
    ) -> Result<Vec<PacketRecord>> {
        let candidates = self
            .query
            .send_candidates(chain_id, tip, counterparties, filter, self.candidate_limit)?;
        self.record_candidates(PacketTable::Send, candidates.len());
        Ok(candidates)
    }

    pub fn timeout_candidates(
        &self,
        chain_id: &str,
        tip: ChainTip,
        counterparty_chain_ids: &[String],
        fee_filter: &FeeFilter,
        filter: &PacketFilter,
    ) -> Result<Vec<PacketRecord>> {
        let candidates = self.query.timeout_candidates(
            chain_id,
            tip,
            counterparty_chain_ids,
            fee_filter,
            filter,
            self.candidate_limit,
        )?;
        self.record_candidates(PacketTable::Timeout, candidates.len());
        Ok(candidates)
    }

    pub fn write_ack_candidates(
        &self,
        chain_id: &str,
        counterparty_chain_ids: &[String],
        fee_filter: &FeeFilter,
        filter: &PacketFilter,
    ) -> Result<Vec<WriteAckRecord>> {
        let candidates = self.query.write_ack_candidates(
            chain_id,
            counterparty_chain_ids,
            fee_filter,
            filter,
            self.candidate_limit,
        )?;
        self.record_candidates(PacketTable::WriteAck, candidates.len());
        Ok(candidates)
    }

    pub fn claim(&self, table: PacketTable, key: &PacketKey) -> Result<bool> {
        let won = self.gate.claim(table, key)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_claim(won);
        }
        Ok(won)
    }

    /// Claim candidates for relaying; returns the ones this caller won
    pub fn claim_all(&self, table: PacketTable, records: Vec<PacketRecord>) -> Result<Vec<PacketRecord>> {
        let offered = records.len();
        let claimed = self.gate.claim_all(table, records)?;
        if let Some(metrics) = &self.metrics {
            for _ in 0..claimed.len() {
                metrics.record_claim(true);
            }
            for _ in claimed.len()..offered {
                metrics.record_claim(false);
            }
        }
        Ok(claimed)
    }

    /// Give a claim back after a failed relay attempt
    pub fn release(&self, table: PacketTable, key: &PacketKey) -> Result<bool> {
        let released = self.gate.release(table, key)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_release(released);
        }
        Ok(released)
    }

    /// Drop records after a relay succeeded, ahead of the confirming event
    pub fn complete(&self, table: PacketTable, keys: &[PacketKey]) -> Result<usize> {
        let deleted = self.store.delete_packets(table, keys)?;
        if deleted < keys.len() {
            warn!("{} of {} completed {} packets were already gone", keys.len() - deleted, keys.len(), table);
        }
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    fn record_candidates(&self, table: PacketTable, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_candidates(&table.to_string(), count);
        }
    }
}

impl ConfiguredTracker {
    /// Open the configured store and wire the configured resolvers through its connection cache
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let store = PacketStore::open(config.database_path(), config.busy_timeout())?;
        let resolver = CachedConnectionResolver::new(config.connection_resolver()?, store.clone());
        let tracker = PacketTracker::new(store, resolver)?.with_candidate_limit(config.global.candidate_limit);
        let tracker = if config.metrics.enabled {
            tracker
        } else {
            tracker.without_metrics()
        };

        if config.global.reset_on_start {
            tracker.startup_reset()?;
        }
        Ok(tracker)
    }
}
