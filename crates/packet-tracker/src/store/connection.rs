// Resolved connection cache
use rusqlite::{params, OptionalExtension};

use super::PacketStore;
use crate::chains::ConnectionInfo;
use crate::error::Result;

impl PacketStore {
    /// Cached counterparty of a local connection, if it was resolved before
    pub fn get_connection(&self, chain_id: &str, connection_id: &str) -> Result<Option<ConnectionInfo>> {
        let conn = self.lock()?;
        let info = conn
            .query_row(
                "SELECT counterparty_chain_id, counterparty_connection_id FROM connection
                 WHERE chain_id = ?1 AND connection_id = ?2",
                params![chain_id, connection_id],
                |row| {
                    Ok(ConnectionInfo {
                        counterparty_chain_id: row.get(0)?,
                        counterparty_connection_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Remember a resolved connection. Open connections never change counterparty.
    pub fn put_connection(&self, chain_id: &str, connection_id: &str, info: &ConnectionInfo) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO connection
             (chain_id, connection_id, counterparty_chain_id, counterparty_connection_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                chain_id,
                connection_id,
                info.counterparty_chain_id,
                info.counterparty_connection_id
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_cache_roundtrip() {
        let store = PacketStore::open_in_memory().unwrap();
        assert!(store.get_connection("chain-a", "connection-7").unwrap().is_none());

        let info = ConnectionInfo {
            counterparty_chain_id: "chain-b".to_string(),
            counterparty_connection_id: "connection-12".to_string(),
        };
        store.put_connection("chain-a", "connection-7", &info).unwrap();
        assert_eq!(store.get_connection("chain-a", "connection-7").unwrap(), Some(info));
    }
}
