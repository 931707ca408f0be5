//! Length-delimited `Entry` stream
//!
//! Each record is a varint32 byte length followed by a protobuf `Entry`.
//! Records are numbered from 0 in stream order; the number is only used in
//! diagnostics.

use crate::fact::Fact;
use crate::vname::VName;
use prost::Message;
use std::io::Read;

/// Wire form of a VName
#[derive(Clone, PartialEq, prost::Message)]
pub struct VNameMessage {
    #[prost(string, tag = "1")]
    pub signature: String,
    #[prost(string, tag = "2")]
    pub corpus: String,
    #[prost(string, tag = "3")]
    pub root: String,
    #[prost(string, tag = "4")]
    pub path: String,
    #[prost(string, tag = "5")]
    pub language: String,
}

/// Wire form of a fact
#[derive(Clone, PartialEq, prost::Message)]
pub struct EntryMessage {
    #[prost(message, optional, tag = "1")]
    pub source: Option<VNameMessage>,
    #[prost(string, tag = "2")]
    pub edge_kind: String,
    #[prost(message, optional, tag = "3")]
    pub target: Option<VNameMessage>,
    #[prost(string, tag = "4")]
    pub fact_name: String,
    #[prost(bytes = "vec", tag = "5")]
    pub fact_value: Vec<u8>,
}

impl From<VNameMessage> for VName {
    fn from(message: VNameMessage) -> Self {
        VName::new(
            message.signature,
            message.corpus,
            message.root,
            message.path,
            message.language,
        )
    }
}

impl From<&VName> for VNameMessage {
    fn from(vname: &VName) -> Self {
        Self {
            signature: vname.signature.clone(),
            corpus: vname.corpus.clone(),
            root: vname.root.clone(),
            path: vname.path.clone(),
            language: vname.language.clone(),
        }
    }
}

impl From<EntryMessage> for Fact {
    fn from(message: EntryMessage) -> Self {
        Fact {
            source: message.source.map(VName::from).unwrap_or_default(),
            edge_kind: message.edge_kind,
            fact_name: message.fact_name,
            target: message.target.map(VName::from),
            fact_value: message.fact_value,
        }
    }
}

impl From<&Fact> for EntryMessage {
    fn from(fact: &Fact) -> Self {
        Self {
            source: Some(VNameMessage::from(&fact.source)),
            edge_kind: fact.edge_kind.clone(),
            target: fact.target.as_ref().map(VNameMessage::from),
            fact_name: fact.fact_name.clone(),
            fact_value: fact.fact_value.clone(),
        }
    }
}

/// A problem with one record of the stream
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// The record body is not a valid `Entry`; the stream can continue
    #[error("record {index}: could not decode entry: {source}")]
    Decode {
        index: usize,
        #[source]
        source: prost::DecodeError,
    },

    /// The stream ends inside a length prefix or record body
    #[error("record {index}: truncated ({reason})")]
    Truncated { index: usize, reason: &'static str },
}

impl RecordError {
    /// Whether reading may continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecordError::Decode { .. })
    }
}

/// Iterator over the facts in a delimited stream held in memory
pub struct EntryStream {
    data: Vec<u8>,
    position: usize,
    index: usize,
    done: bool,
}

impl EntryStream {
    /// Read `reader` to the end and stream its records
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            index: 0,
            done: false,
        }
    }
}

impl Iterator for EntryStream {
    type Item = (usize, Result<Fact, RecordError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.data.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let mut rest = &self.data[self.position..];
        let before = rest.len();
        let length = match prost::decode_length_delimiter(&mut rest) {
            Ok(length) => length,
            Err(_) => {
                self.done = true;
                return Some((index, Err(RecordError::Truncated { index, reason: "length prefix" })));
            }
        };
        let body_start = self.position + (before - rest.len());
        let Some(body_end) = body_start.checked_add(length).filter(|end| *end <= self.data.len()) else {
            self.done = true;
            return Some((index, Err(RecordError::Truncated { index, reason: "record body" })));
        };
        self.position = body_end;

        let result = EntryMessage::decode(&self.data[body_start..body_end])
            .map(Fact::from)
            .map_err(|source| RecordError::Decode { index, source });
        Some((index, result))
    }
}

/// Append `fact` to `out` as one delimited record
pub fn encode_delimited(fact: &Fact, out: &mut Vec<u8>) {
    let message = EntryMessage::from(fact);
    // Encoding into a Vec cannot fail.
    let _ = message.encode_length_delimited(out);
}
