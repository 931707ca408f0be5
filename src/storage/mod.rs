//! Storage Layer - where facts come from
//!
//! Two sources feed the verifier:
//! - a SQLite table `entries(key, value)` iterated in key order, where the
//!   key encodes the fact's VNames, edge kind and fact name ([`key`])
//! - a varint32 length-delimited stream of protobuf `Entry` records ([`stream`])

pub mod key;
pub mod schema;
pub mod sqlite;
pub mod stream;

pub use key::{KeyError, decode_entry, encode_key};
pub use sqlite::{FactStore, StoreStats};
pub use stream::{EntryStream, RecordError, encode_delimited};
