// Relay-side components: ingestion, candidate queries and the claim gate

pub mod filter;
pub mod gate;
pub mod ingest;
pub mod query;

pub use filter::{ChainTip, Coin, ConnectionFilter, CounterpartyFeeFilter, FeeFilter, PacketFilter};
pub use gate::ClaimGate;
pub use ingest::{EventIngestor, PreparedBatch};
pub use query::{CandidateQuery, DEFAULT_CANDIDATE_LIMIT};
