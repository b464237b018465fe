// Candidate queries: which tracked packets are ready to relay right now
use rusqlite::types::Value;
use tracing::debug;

use super::filter::{ChainTip, Coin, CounterpartyFeeFilter, FeeFilter, PacketFilter};
use crate::error::{Result, TrackerError};
use crate::store::sql::Conditions;
use crate::store::{FeeType, PacketRecord, PacketStore, PacketTable, WriteAckRecord};
use crate::utils::{fee_amount_to_sql, to_sql_int};

/// Default page size of every candidate query
pub const DEFAULT_CANDIDATE_LIMIT: usize = 100;

/// Still deliverable: at least one timeout dimension lies ahead of the tip.
/// A zero (unset) dimension can never satisfy `> tip`.
const NOT_TIMED_OUT: &str = "(timeout_height > ? OR timeout_timestamp > ?)";

/// Timed out in at least one dimension that is actually set
const TIMED_OUT: &str =
    "((timeout_height != 0 AND timeout_height < ?) OR (timeout_timestamp != 0 AND timeout_timestamp < ?))";

/// Builds filtered, sequence-ordered reads over the lifecycle store
#[derive(Clone)]
pub struct CandidateQuery {
    store: PacketStore,
}

impl CandidateQuery {
    pub fn new(store: PacketStore) -> Self {
        Self { store }
    }

    /// Packets sent to `chain_id` that can still be received there.
    ///
    /// Queried once per counterparty; the per-counterparty results are
    /// interleaved so no single counterparty starves the others.
    pub fn send_candidates(
        &self,
        chain_id: &str,
        tip: ChainTip,
        counterparties: &[CounterpartyFeeFilter],
        filter: &PacketFilter,
        limit: usize,
    ) -> Result<Vec<PacketRecord>> {
        if counterparties.is_empty() {
            return Err(TrackerError::MalformedFilter(format!(
                "send candidates for {} need at least one counterparty chain",
                chain_id
            )));
        }
        validate_filter(filter)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut per_counterparty = Vec::with_capacity(counterparties.len());
        for counterparty in counterparties {
            if counterparty.chain_id.is_empty() {
                return Err(TrackerError::MalformedFilter("empty counterparty chain id".to_string()));
            }
            let mut conditions = Conditions::new()
                .eq("in_progress", false)
                .eq("dst_chain_id", chain_id.to_string())
                .eq("src_chain_id", counterparty.chain_id.clone())
                .any_of(endpoint_groups(filter, "dst_connection_id", "dst_channel_id"))
                .fragment(NOT_TIMED_OUT.to_string(), tip_params(tip));
            if let Some((clause, params)) =
                fee_clause(PacketTable::Send, FeeType::Recv, &counterparty.fee_filter.recv_fee)
            {
                conditions = conditions.fragment(clause, params);
            }

            per_counterparty.push(self.store.select_packets(PacketTable::Send, &conditions, limit)?);
        }

        let candidates = interleave(per_counterparty, limit);
        debug!("{} send candidates for {} at height {}", candidates.len(), chain_id, tip.height);
        Ok(candidates)
    }

    /// Packets sent from `chain_id` whose timeout has elapsed on the destination
    pub fn timeout_candidates(
        &self,
        chain_id: &str,
        tip: ChainTip,
        counterparty_chain_ids: &[String],
        fee_filter: &FeeFilter,
        filter: &PacketFilter,
        limit: usize,
    ) -> Result<Vec<PacketRecord>> {
        validate_counterparties(chain_id, counterparty_chain_ids)?;
        validate_filter(filter)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conditions = origin_conditions(chain_id, counterparty_chain_ids, filter)
            .fragment(TIMED_OUT.to_string(), tip_params(tip));
        if let Some((clause, params)) = fee_clause(PacketTable::Timeout, FeeType::Timeout, &fee_filter.timeout_fee) {
            conditions = conditions.fragment(clause, params);
        }

        let candidates = self.store.select_packets(PacketTable::Timeout, &conditions, limit)?;
        debug!("{} timeout candidates for {} at height {}", candidates.len(), chain_id, tip.height);
        Ok(candidates)
    }

    /// Acknowledgements waiting to be relayed back to `chain_id`. Acks never expire.
    pub fn write_ack_candidates(
        &self,
        chain_id: &str,
        counterparty_chain_ids: &[String],
        fee_filter: &FeeFilter,
        filter: &PacketFilter,
        limit: usize,
    ) -> Result<Vec<WriteAckRecord>> {
        validate_counterparties(chain_id, counterparty_chain_ids)?;
        validate_filter(filter)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conditions = origin_conditions(chain_id, counterparty_chain_ids, filter);
        if let Some((clause, params)) = fee_clause(PacketTable::WriteAck, FeeType::Ack, &fee_filter.ack_fee) {
            conditions = conditions.fragment(clause, params);
        }

        let candidates = self.store.select_write_acks(&conditions, limit)?;
        debug!("{} write-ack candidates for {}", candidates.len(), chain_id);
        Ok(candidates)
    }
}

/// Shared predicate of the timeout and write-ack reads, both keyed on the origin side
fn origin_conditions(chain_id: &str, counterparty_chain_ids: &[String], filter: &PacketFilter) -> Conditions {
    Conditions::new()
        .eq("in_progress", false)
        .eq("src_chain_id", chain_id.to_string())
        .is_in("dst_chain_id", counterparty_chain_ids)
        .any_of(endpoint_groups(filter, "src_connection_id", "src_channel_id"))
}

fn validate_counterparties(chain_id: &str, counterparty_chain_ids: &[String]) -> Result<()> {
    if counterparty_chain_ids.is_empty() {
        return Err(TrackerError::MalformedFilter(format!(
            "candidates for {} need at least one counterparty chain",
            chain_id
        )));
    }
    if counterparty_chain_ids.iter().any(|id| id.is_empty()) {
        return Err(TrackerError::MalformedFilter("empty counterparty chain id".to_string()));
    }
    Ok(())
}

fn validate_filter(filter: &PacketFilter) -> Result<()> {
    if let Some(connections) = filter.connection_list() {
        if connections.iter().any(|c| c.connection_id.is_empty()) {
            return Err(TrackerError::MalformedFilter(
                "endpoint filter names an empty connection id".to_string(),
            ));
        }
    }
    Ok(())
}

fn tip_params(tip: ChainTip) -> Vec<Value> {
    vec![
        Value::Integer(to_sql_int(tip.height)),
        Value::Integer(to_sql_int(tip.timestamp)),
    ]
}

/// One OR-group per allowed connection; no groups when unrestricted
fn endpoint_groups(filter: &PacketFilter, connection_column: &'static str, channel_column: &'static str) -> Vec<Conditions> {
    let Some(connections) = filter.connection_list() else {
        return Vec::new();
    };
    connections
        .iter()
        .map(|connection| {
            let group = Conditions::new().eq(connection_column, connection.connection_id.clone());
            match connection.channel_list() {
                Some(channels) => group.is_in(channel_column, channels),
                None => group,
            }
        })
        .collect()
}

/// Correlated fee subquery: any listed denom meeting its minimum qualifies.
///
/// Fees are escrowed on the origin chain, which is the `src_*` side of every record set.
fn fee_clause(table: PacketTable, fee_type: FeeType, minimums: &[Coin]) -> Option<(String, Vec<Value>)> {
    if minimums.is_empty() {
        return None;
    }
    let t = table.table_name();
    let one = format!(
        "((SELECT amount FROM packet_fee WHERE chain_id = {t}.src_chain_id \
         AND channel_id = {t}.src_channel_id AND sequence = {t}.sequence \
         AND fee_type = ? AND denom = ?) >= ?)"
    );
    let clause = format!("({})", vec![one; minimums.len()].join(" OR "));
    let params = minimums
        .iter()
        .flat_map(|coin| {
            [
                Value::Integer(fee_type.as_sql()),
                Value::Text(coin.denom.clone()),
                Value::Text(fee_amount_to_sql(coin.amount)),
            ]
        })
        .collect();
    Some((clause, params))
}

/// Round-robin merge keeping each list's own order
fn interleave<T>(lists: Vec<Vec<T>>, limit: usize) -> Vec<T> {
    let mut iters: Vec<_> = lists.into_iter().map(|l| l.into_iter()).collect();
    let mut merged = Vec::new();
    while merged.len() < limit {
        let mut progressed = false;
        for iter in iters.iter_mut() {
            if merged.len() >= limit {
                break;
            }
            if let Some(item) = iter.next() {
                merged.push(item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    merged
}
