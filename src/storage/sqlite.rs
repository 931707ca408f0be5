//! SQLite storage implementation

use super::key::{self, KeyError};
use super::schema;
use crate::fact::Fact;
use crate::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Ordered key-value store of encoded facts
pub struct FactStore {
    conn: Connection,
}

impl FactStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Entry Operations ==========

    /// Insert or replace a raw entry
    pub fn put_entry(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Encode and store a fact. A later fact with the same key replaces it.
    pub fn put_fact(&self, fact: &Fact) -> Result<()> {
        let key = key::encode_key(fact)?;
        self.put_entry(&key, &fact.fact_value)
    }

    /// Get the raw value stored under `key`
    pub fn get_entry(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM entries WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Visit every entry in key order, decoding it into a fact.
    ///
    /// A key that does not decode is handed to `visit` as an error; it is up
    /// to the caller whether to skip it. Returns the number of entries seen.
    pub fn for_each_fact<F>(&self, mut visit: F) -> Result<usize>
    where
        F: FnMut(usize, std::result::Result<Fact, KeyError>),
    {
        let mut stmt = self.conn.prepare("SELECT key, value FROM entries ORDER BY key")?;
        let mut rows = stmt.query([])?;
        let mut index = 0;
        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(index, key::decode_entry(&key, &value));
            index += 1;
        }
        Ok(index)
    }

    /// Count all entries
    pub fn count_entries(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction for bulk operations
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Delete all entries
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM entries", [])?;
        Ok(())
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        let entries = self.for_each_fact(|_, fact| match fact {
            Ok(fact) if fact.is_edge() => stats.edges += 1,
            Ok(_) => stats.node_facts += 1,
            Err(_) => stats.bad_keys += 1,
        })?;
        stats.entries = entries;
        Ok(stats)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub edges: usize,
    pub node_facts: usize,
    pub bad_keys: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Statistics:")?;
        writeln!(f, "  Entries: {}", self.entries)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Node facts: {}", self.node_facts)?;
        writeln!(f, "  Bad keys: {}", self.bad_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::NODE_KIND_FACT;
    use crate::vname::VName;

    fn collect(store: &FactStore) -> Vec<std::result::Result<Fact, KeyError>> {
        let mut facts = Vec::new();
        store.for_each_fact(|_, fact| facts.push(fact)).unwrap();
        facts
    }

    #[test]
    fn test_fact_crud() {
        let store = FactStore::open_in_memory().unwrap();
        let fact = Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "record");
        store.put_fact(&fact).unwrap();

        let key = key::encode_key(&fact).unwrap();
        assert_eq!(store.get_entry(&key).unwrap(), Some(b"record".to_vec()));
        assert_eq!(collect(&store), vec![Ok(fact)]);
    }

    #[test]
    fn test_iterates_in_key_order() {
        let store = FactStore::open_in_memory().unwrap();
        let b = Fact::node(VName::with_signature("b"), NODE_KIND_FACT, "x");
        let a = Fact::edge(VName::with_signature("a"), "/kythe/edge/ref", VName::with_signature("b"));
        store.put_fact(&b).unwrap();
        store.put_fact(&a).unwrap();

        assert_eq!(collect(&store), vec![Ok(a), Ok(b)]);
    }

    #[test]
    fn test_same_key_replaces_value() {
        let store = FactStore::open_in_memory().unwrap();
        let source = VName::with_signature("n");
        store.put_fact(&Fact::node(source.clone(), NODE_KIND_FACT, "old")).unwrap();
        store.put_fact(&Fact::node(source, NODE_KIND_FACT, "new")).unwrap();
        assert_eq!(store.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_bad_keys_are_reported() {
        let mut store = FactStore::open_in_memory().unwrap();
        store.begin_transaction().unwrap();
        store.put_entry(b"no separators here", b"").unwrap();
        store
            .put_fact(&Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "record"))
            .unwrap();
        store.commit().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.bad_keys, 1);
        assert_eq!(stats.node_facts, 1);

        store.clear_all().unwrap();
        assert_eq!(store.count_entries().unwrap(), 0);
    }
}
