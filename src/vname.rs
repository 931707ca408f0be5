//! VName - structural identity for every node in the fact graph
//!
//! A VName is five opaque strings: `signature`, `corpus`, `root`, `path`,
//! `language`. Two VNames name the same node iff all five fields are equal;
//! no field carries meaning beyond that.
//!
//! Tickets are the printable form used in dumps:
//! `kythe://<corpus>?lang=<language>?path=<path>?root=<root>#<signature>`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, structurally-compared name of a graph node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VName {
    pub signature: String,
    pub corpus: String,
    pub root: String,
    pub path: String,
    pub language: String,
}

impl VName {
    /// Create a new VName
    pub fn new(
        signature: impl Into<String>,
        corpus: impl Into<String>,
        root: impl Into<String>,
        path: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            corpus: corpus.into(),
            root: root.into(),
            path: path.into(),
            language: language.into(),
        }
    }

    /// A VName with only a signature set.
    pub fn with_signature(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            ..Self::default()
        }
    }

    /// True when every field is empty
    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
            && self.corpus.is_empty()
            && self.root.is_empty()
            && self.path.is_empty()
            && self.language.is_empty()
    }

    /// Fields in canonical order
    pub fn fields(&self) -> [&str; 5] {
        [
            &self.signature,
            &self.corpus,
            &self.root,
            &self.path,
            &self.language,
        ]
    }

    /// Build from fields in canonical order
    pub fn from_fields(fields: [String; 5]) -> Self {
        let [signature, corpus, root, path, language] = fields;
        Self {
            signature,
            corpus,
            root,
            path,
            language,
        }
    }

    /// Convert to a ticket string. Empty components are omitted.
    pub fn to_ticket(&self) -> String {
        let mut ticket = format!("kythe://{}", escape_ticket_part(&self.corpus));
        if !self.language.is_empty() {
            ticket.push_str("?lang=");
            ticket.push_str(&escape_ticket_part(&self.language));
        }
        if !self.path.is_empty() {
            ticket.push_str("?path=");
            ticket.push_str(&escape_ticket_part(&self.path));
        }
        if !self.root.is_empty() {
            ticket.push_str("?root=");
            ticket.push_str(&escape_ticket_part(&self.root));
        }
        if !self.signature.is_empty() {
            ticket.push('#');
            ticket.push_str(&escape_ticket_part(&self.signature));
        }
        ticket
    }
}

fn escape_ticket_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3F"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl fmt::Display for VName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ticket())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_format() {
        let vname = VName::new("sig", "corpus", "root", "a/b.cc", "c++");
        assert_eq!(
            vname.to_ticket(),
            "kythe://corpus?lang=c++?path=a/b.cc?root=root#sig"
        );
    }

    #[test]
    fn test_ticket_escapes_separators() {
        let vname = VName::with_signature("what?#");
        assert_eq!(vname.to_ticket(), "kythe://#what%3F%23");
    }

    #[test]
    fn test_structural_equality() {
        let a = VName::new("s", "c", "r", "p", "l");
        let b = VName::from_fields(["s", "c", "r", "p", "l"].map(String::from));
        assert_eq!(a, b);
        assert_ne!(a, VName::with_signature("s"));
        assert!(VName::default().is_empty());
    }
}
