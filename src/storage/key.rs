//! Key encoding for the ordered fact store
//!
//! ```text
//! key   = source "\n" edge_kind "\n" fact_name "\n" [target]
//! vname = signature "\0" corpus "\0" root "\0" path "\0" language
//! ```
//!
//! The value is the raw fact value. Node facts have an empty edge kind and
//! no target; edges have both.

use crate::fact::Fact;
use crate::vname::VName;

/// Separates the parts of an entry key
pub const ENTRY_KEY_SEP: u8 = b'\n';
/// Separates the fields of an encoded VName
pub const VNAME_FIELD_SEP: u8 = 0;

/// Why a key could not be encoded or decoded
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("edge kind and target must be both present or both absent")]
    EdgeTargetMismatch,

    #[error("{0} contains the key separator")]
    ContainsKeySeparator(&'static str),

    #[error("{0} VName contains a NUL byte")]
    ContainsFieldSeparator(&'static str),

    #[error("invalid key: expected 4 parts, found {0}")]
    PartCount(usize),

    #[error("missing source VName")]
    MissingSource,

    #[error("invalid {which} VName encoding: expected 5 fields, found {found}")]
    VNameFieldCount { which: &'static str, found: usize },

    #[error("{0} is not valid UTF-8")]
    Utf8(&'static str),
}

/// Canonical key for `fact` (the value is stored separately)
pub fn encode_key(fact: &Fact) -> Result<Vec<u8>, KeyError> {
    if fact.edge_kind.is_empty() != fact.target.is_none() {
        return Err(KeyError::EdgeTargetMismatch);
    }
    if fact.edge_kind.as_bytes().contains(&ENTRY_KEY_SEP) {
        return Err(KeyError::ContainsKeySeparator("edge kind"));
    }
    if fact.fact_name.as_bytes().contains(&ENTRY_KEY_SEP) {
        return Err(KeyError::ContainsKeySeparator("fact name"));
    }

    let mut key = encode_vname(&fact.source, "source")?;
    key.push(ENTRY_KEY_SEP);
    key.extend_from_slice(fact.edge_kind.as_bytes());
    key.push(ENTRY_KEY_SEP);
    key.extend_from_slice(fact.fact_name.as_bytes());
    key.push(ENTRY_KEY_SEP);
    if let Some(target) = &fact.target {
        key.extend(encode_vname(target, "target")?);
    }
    Ok(key)
}

/// Rebuild a fact from a stored key and value
pub fn decode_entry(key: &[u8], value: &[u8]) -> Result<Fact, KeyError> {
    let parts: Vec<&[u8]> = key.split(|b| *b == ENTRY_KEY_SEP).collect();
    let [source, edge_kind, fact_name, target] = parts.as_slice() else {
        return Err(KeyError::PartCount(parts.len()));
    };

    let source = decode_vname(source, "source")?.ok_or(KeyError::MissingSource)?;
    let target = decode_vname(target, "target")?;
    let edge_kind = utf8(edge_kind, "edge kind")?;
    if edge_kind.is_empty() != target.is_none() {
        return Err(KeyError::EdgeTargetMismatch);
    }

    Ok(Fact {
        source,
        edge_kind,
        fact_name: utf8(fact_name, "fact name")?,
        target,
        fact_value: value.to_vec(),
    })
}

fn encode_vname(vname: &VName, which: &'static str) -> Result<Vec<u8>, KeyError> {
    let fields = vname.fields();
    if fields.iter().any(|field| field.as_bytes().contains(&VNAME_FIELD_SEP)) {
        return Err(KeyError::ContainsFieldSeparator(which));
    }
    if fields.iter().any(|field| field.as_bytes().contains(&ENTRY_KEY_SEP)) {
        return Err(KeyError::ContainsKeySeparator(which));
    }
    Ok(fields.join("\0").into_bytes())
}

fn decode_vname(data: &[u8], which: &'static str) -> Result<Option<VName>, KeyError> {
    if data.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&[u8]> = data.split(|b| *b == VNAME_FIELD_SEP).collect();
    let [signature, corpus, root, path, language] = parts.as_slice() else {
        return Err(KeyError::VNameFieldCount {
            which,
            found: parts.len(),
        });
    };
    Ok(Some(VName::from_fields([
        utf8(signature, which)?,
        utf8(corpus, which)?,
        utf8(root, which)?,
        utf8(path, which)?,
        utf8(language, which)?,
    ])))
}

fn utf8(bytes: &[u8], what: &'static str) -> Result<String, KeyError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| KeyError::Utf8(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::NODE_KIND_FACT;

    #[test]
    fn test_edge_key_layout() {
        let fact = Fact::edge(
            VName::new("s", "c", "r", "p", "l"),
            "/kythe/edge/ref",
            VName::with_signature("t"),
        );
        let key = encode_key(&fact).unwrap();
        assert_eq!(key, b"s\0c\0r\0p\0l\n/kythe/edge/ref\n/\nt\0\0\0\0".to_vec());
        assert_eq!(decode_entry(&key, b"").unwrap(), fact);
    }

    #[test]
    fn test_node_fact_key_has_no_target() {
        let fact = Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "record");
        let key = encode_key(&fact).unwrap();
        assert!(key.ends_with(b"\n/kythe/node/kind\n"));
        assert_eq!(decode_entry(&key, b"record").unwrap(), fact);
    }

    #[test]
    fn test_encode_rejects_bad_facts() {
        let mut fact = Fact::node(VName::with_signature("n"), NODE_KIND_FACT, "");
        fact.edge_kind = "/kythe/edge/ref".to_string();
        assert_eq!(encode_key(&fact), Err(KeyError::EdgeTargetMismatch));

        let bad = Fact::node(VName::with_signature("a\nb"), NODE_KIND_FACT, "");
        assert_eq!(encode_key(&bad), Err(KeyError::ContainsKeySeparator("source")));

        let bad = Fact::node(VName::with_signature("a\0b"), NODE_KIND_FACT, "");
        assert_eq!(encode_key(&bad), Err(KeyError::ContainsFieldSeparator("source")));
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        assert_eq!(decode_entry(b"s\0c\0r\0p\0l\n/kythe/node/kind", b""), Err(KeyError::PartCount(2)));
        assert_eq!(
            decode_entry(b"s\0c\n\n/kythe/node/kind\n", b""),
            Err(KeyError::VNameFieldCount { which: "source", found: 2 })
        );
        assert_eq!(decode_entry(b"\n\n/x\n", b""), Err(KeyError::MissingSource));
    }
}
