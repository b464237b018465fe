// Connection resolution backed by the packet store's connection table
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ConnectionInfo, ConnectionResolver};
use crate::error::ResolutionError;
use crate::store::PacketStore;

/// Consults the persisted connection table before asking `inner`.
///
/// An open connection's counterparty never changes, so entries are kept forever.
pub struct CachedConnectionResolver<R> {
    inner: R,
    store: PacketStore,
}

impl<R: ConnectionResolver> CachedConnectionResolver<R> {
    pub fn new(inner: R, store: PacketStore) -> Self {
        Self { inner, store }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: ConnectionResolver> ConnectionResolver for CachedConnectionResolver<R> {
    async fn resolve(
        &self,
        chain_id: &str,
        connection_id: &str,
    ) -> Result<ConnectionInfo, ResolutionError> {
        match self.store.get_connection(chain_id, connection_id) {
            Ok(Some(info)) => return Ok(info),
            Ok(None) => {}
            Err(e) => warn!("Connection cache read failed for {}/{}: {}", chain_id, connection_id, e),
        }

        let info = self.inner.resolve(chain_id, connection_id).await?;
        debug!(
            "Resolved {}/{} -> {}/{}",
            chain_id, connection_id, info.counterparty_chain_id, info.counterparty_connection_id
        );
        if let Err(e) = self.store.put_connection(chain_id, connection_id, &info) {
            warn!("Connection cache write failed for {}/{}: {}", chain_id, connection_id, e);
        }
        Ok(info)
    }
}
