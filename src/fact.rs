//! Fact records - the triples the verifier checks goals against
//!
//! A fact is either:
//! - an **edge**: `source --edge_kind--> target`, or
//! - a **node fact**: a named property on `source` (empty `edge_kind`, no target)
//!
//! Labels follow the Kythe schema namespace (`/kythe/edge/...`, `/kythe/node/kind`).

use crate::vname::VName;
use serde::{Serialize, Serializer};
use std::fmt;

/// Prefix shared by every edge kind
pub const EDGE_PREFIX: &str = "/kythe/edge/";
/// Prefix applied to unqualified node fact names
pub const FACT_PREFIX: &str = "/kythe/";
/// Marks a reverse edge kind
pub const REVERSE_EDGE_PREFIX: &str = "%";
/// Fact name carrying an edge's ordinal
pub const ORDINAL_FACT: &str = "/kythe/ordinal";
/// Node kind fact
pub const NODE_KIND_FACT: &str = "/kythe/node/kind";
/// Anchor start offset fact
pub const ANCHOR_START_FACT: &str = "/kythe/loc/start";
/// Anchor end offset fact
pub const ANCHOR_END_FACT: &str = "/kythe/loc/end";
/// Node kind value for anchors
pub const ANCHOR_KIND: &str = "anchor";

/// Expand a short edge label (`defines`) to a full edge kind (`/kythe/edge/defines`).
///
/// Labels that already start with `/` are returned unchanged. A leading `%`
/// (reverse edge) is kept in front of the expansion.
pub fn expand_edge_kind(label: &str) -> String {
    if let Some(rest) = label.strip_prefix(REVERSE_EDGE_PREFIX) {
        return format!("{}{}", REVERSE_EDGE_PREFIX, expand_edge_kind(rest));
    }
    if label.starts_with('/') {
        label.to_string()
    } else {
        format!("{}{}", EDGE_PREFIX, label)
    }
}

/// Expand a short node fact name (`node/kind`) to `/kythe/node/kind`.
pub fn expand_fact_name(label: &str) -> String {
    if label.starts_with('/') {
        label.to_string()
    } else {
        format!("{}{}", FACT_PREFIX, label)
    }
}

/// One asserted fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fact {
    /// Node the fact is about (edge source)
    pub source: VName,
    /// Edge kind; empty for node facts
    pub edge_kind: String,
    /// Fact name (`/kythe/node/kind`, `/kythe/ordinal`, ...)
    pub fact_name: String,
    /// Edge target; `None` for node facts
    pub target: Option<VName>,
    /// Raw fact value
    #[serde(serialize_with = "serialize_lossy")]
    pub fact_value: Vec<u8>,
}

fn serialize_lossy<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(value))
}

impl Fact {
    /// Create a node fact (a property of `source`)
    pub fn node(source: VName, fact_name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            source,
            edge_kind: String::new(),
            fact_name: fact_name.into(),
            target: None,
            fact_value: value.into(),
        }
    }

    /// Create an edge fact with the conventional `/` fact name and no value
    pub fn edge(source: VName, edge_kind: impl Into<String>, target: VName) -> Self {
        Self {
            source,
            edge_kind: edge_kind.into(),
            fact_name: "/".to_string(),
            target: Some(target),
            fact_value: Vec::new(),
        }
    }

    /// Create an ordinal edge (`kind.N`)
    pub fn ordinal_edge(source: VName, edge_kind: impl Into<String>, target: VName, ordinal: u32) -> Self {
        Self {
            source,
            edge_kind: edge_kind.into(),
            fact_name: ORDINAL_FACT.to_string(),
            target: Some(target),
            fact_value: ordinal.to_string().into_bytes(),
        }
    }

    /// Check if this fact is an edge
    pub fn is_edge(&self) -> bool {
        !self.edge_kind.is_empty()
    }

    /// The value as text (lossy)
    pub fn value_text(&self) -> String {
        String::from_utf8_lossy(&self.fact_value).into_owned()
    }

    /// Identity used for duplicate detection; the value is not part of it
    pub fn key(&self) -> FactKey {
        FactKey {
            source: self.source.clone(),
            edge_kind: self.edge_kind.clone(),
            fact_name: self.fact_name.clone(),
            target: self.target.clone(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(
                f,
                "{} {} {} [{} = {:?}]",
                self.source,
                self.edge_kind,
                target,
                self.fact_name,
                self.value_text()
            ),
            None => write!(f, "{} {} = {:?}", self.source, self.fact_name, self.value_text()),
        }
    }
}

/// (source, edge_kind, fact_name, target) - the duplicate-detection key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub source: VName,
    pub edge_kind: String,
    pub fact_name: String,
    pub target: Option<VName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_labels() {
        assert_eq!(expand_edge_kind("defines"), "/kythe/edge/defines");
        assert_eq!(expand_edge_kind("defines/binding"), "/kythe/edge/defines/binding");
        assert_eq!(expand_edge_kind("/custom/edge"), "/custom/edge");
        assert_eq!(expand_edge_kind("%childof"), "%/kythe/edge/childof");
        assert_eq!(expand_fact_name("node/kind"), NODE_KIND_FACT);
        assert_eq!(expand_fact_name("/x/y"), "/x/y");
    }

    #[test]
    fn test_key_ignores_value() {
        let a = Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "record");
        let b = Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "function");
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_edge_constructors() {
        let edge = Fact::ordinal_edge(VName::with_signature("a"), "/kythe/edge/param", VName::with_signature("b"), 2);
        assert!(edge.is_edge());
        assert_eq!(edge.fact_name, ORDINAL_FACT);
        assert_eq!(edge.value_text(), "2");
        assert!(!Fact::node(VName::default(), "/x", "").is_edge());
    }
}
