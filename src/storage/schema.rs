//! Database schema definitions

/// SQL to create the entries table.
///
/// Keys are encoded by [`super::key::encode_key`]; SQLite compares BLOBs
/// bytewise, so iterating by key visits facts grouped by source VName.
pub const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
) WITHOUT ROWID
"#;

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_ENTRIES_TABLE]
}
