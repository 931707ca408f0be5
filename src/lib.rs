//! # kverify - fact graph verifier
//!
//! Checks the facts emitted by a code indexer against goals written in a
//! small logic language.
//!
//! kverify provides:
//! - an arena-allocated term representation shared by goals and facts
//! - an indexed, append-only fact database with a duplicate policy
//! - unification with a trailed environment for cheap backtracking
//! - a depth-first goal solver reporting the furthest goal it reached
//! - fact loading from a delimited protobuf stream or a SQLite key-value store

pub mod vname;
pub mod fact;
pub mod ast;
pub mod database;
pub mod unify;
pub mod solver;
pub mod assertions;
pub mod storage;
pub mod session;
pub mod output;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use vname::VName;
pub use fact::Fact;
pub use ast::{AstArena, AstNode, NodeId, VarId};
pub use database::FactDatabase;
pub use unify::{Environment, unify};
pub use solver::{GoalGroup, Solver};
pub use assertions::{ParseError, RuleFormat};
pub use storage::FactStore;
pub use session::VerificationSession;

/// Result type alias for kverify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for kverify operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Invalid key: {0}")]
    Key(#[from] storage::KeyError),

    #[error("Bad fact stream: {0}")]
    Record(#[from] storage::RecordError),

    #[error("Could not read rule file {}: {source}", path.display())]
    ReadRules {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
