// IBC Packet Tracker Library
// Persisted packet lifecycle state and relay candidate queries for IBC relayers

pub mod chains;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod relay;
pub mod store;
pub mod tracker;
pub mod utils;

// Re-export commonly used types for convenience
pub use chains::{
    CachedConnectionResolver, ChainEvent, ConfiguredResolver, ConnectionInfo, ConnectionResolver,
    FixedConnectionResolver, LcdConnectionResolver,
};
pub use config::{ChainConfig, TrackerConfig};
pub use error::{ResolutionError, Result, TrackerError};
pub use events::{ChannelOrdering, PacketEvent, PacketInfo, PacketTimeout};
pub use metrics::TrackerMetrics;
pub use relay::{
    CandidateQuery, ChainTip, ClaimGate, Coin, ConnectionFilter, CounterpartyFeeFilter, EventIngestor, FeeFilter,
    PacketFilter, PreparedBatch, DEFAULT_CANDIDATE_LIMIT,
};
pub use store::{
    ApplySummary, FeeLedger, FeeType, Mutation, PacketKey, PacketRecord, PacketStore, PacketTable, StoreStats,
    WriteAckRecord,
};
pub use tracker::{ConfiguredTracker, PacketTracker};
