//! Fact Database - append-only, indexed store of asserted facts
//!
//! Facts are added once at load time and never mutated. Each fact is turned
//! into an arena term on insert so the solver can match goals against it by
//! plain unification.

use crate::ast::{AstArena, AstNode, NodeId};
use crate::fact::{Fact, FactKey};
use crate::unify::Environment;
use crate::vname::VName;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// A fact together with its term representation
#[derive(Debug, Clone)]
pub struct StoredFact {
    pub fact: Fact,
    pub term: NodeId,
}

/// Result of [`FactDatabase::assert_fact`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertOutcome {
    /// New fact, stored at this index
    Inserted(usize),
    /// Same key as an earlier fact; stored anyway at this index
    DuplicateInserted(usize),
    /// Same key as an earlier fact; dropped
    DuplicateIgnored,
}

/// The facts a goal is checked against
#[derive(Debug, Default)]
pub struct FactDatabase {
    /// All facts in insertion order
    facts: Vec<StoredFact>,
    /// Fact indices by source VName
    by_source: HashMap<VName, Vec<usize>>,
    /// Fact indices by edge kind
    by_edge_kind: HashMap<String, Vec<usize>>,
    /// Keys seen so far, for duplicate detection
    keys: HashSet<FactKey>,
    ignore_duplicates: bool,
    duplicates: usize,
}

impl FactDatabase {
    /// Create a new empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop facts whose key was already asserted instead of storing them again.
    pub fn ignore_duplicate_facts(&mut self) {
        self.ignore_duplicates = true;
    }

    /// Add a fact
    pub fn assert_fact(&mut self, arena: &mut AstArena, fact: Fact) -> AssertOutcome {
        let duplicate = !self.keys.insert(fact.key());
        if duplicate {
            self.duplicates += 1;
            if self.ignore_duplicates {
                debug!(fact = %fact, "Ignoring duplicate fact");
                return AssertOutcome::DuplicateIgnored;
            }
        }

        let index = self.facts.len();
        let term = arena.create_fact_term(&fact);

        self.by_source
            .entry(fact.source.clone())
            .or_default()
            .push(index);
        if fact.is_edge() {
            self.by_edge_kind
                .entry(fact.edge_kind.clone())
                .or_default()
                .push(index);
        }
        self.facts.push(StoredFact { fact, term });

        if duplicate {
            AssertOutcome::DuplicateInserted(index)
        } else {
            AssertOutcome::Inserted(index)
        }
    }

    /// Facts whose source could unify with `source` and edge kind with `edge_kind`.
    ///
    /// Narrowed through the source index when `source` is a fully bound
    /// VName, then through the edge-kind index when `edge_kind` is a bound
    /// atom; otherwise every fact in insertion order. Candidates still have
    /// to be unified by the caller.
    pub fn facts_matching(
        &self,
        arena: &AstArena,
        env: &Environment,
        source: NodeId,
        edge_kind: NodeId,
    ) -> Candidates<'_> {
        if let Some(vname) = ground_vname(arena, env, source) {
            let indices = self.by_source.get(&vname).map(|v| v.as_slice()).unwrap_or(&[]);
            return Candidates::indexed(&self.facts, indices);
        }

        if let AstNode::Atom { symbol, .. } = arena.get(env.resolve(arena, edge_kind)) {
            let kind = arena.symbol_text(*symbol);
            // Node facts have an empty edge kind and are not in the edge index.
            if !kind.is_empty() {
                let indices = self.by_edge_kind.get(kind).map(|v| v.as_slice()).unwrap_or(&[]);
                return Candidates::indexed(&self.facts, indices);
            }
        }

        Candidates::all(&self.facts)
    }

    pub fn get(&self, index: usize) -> Option<&StoredFact> {
        self.facts.get(index)
    }

    /// All facts in insertion order
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter().map(|stored| &stored.fact)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Get statistics about the database
    pub fn stats(&self) -> DatabaseStats {
        let edges = self.facts.iter().filter(|stored| stored.fact.is_edge()).count();
        DatabaseStats {
            facts: self.facts.len(),
            edges,
            node_facts: self.facts.len() - edges,
            sources: self.by_source.len(),
            edge_kinds: self.by_edge_kind.len(),
            duplicates: self.duplicates,
        }
    }
}

/// Decode a term that resolves to a fully bound `vname(...)`.
pub fn ground_vname(arena: &AstArena, env: &Environment, node: NodeId) -> Option<VName> {
    let node = env.resolve(arena, node);
    if arena.app_verb(node)? != arena.builtins().vname {
        return None;
    }
    let elements = arena.tuple_elements(node)?;
    if elements.len() != 5 {
        return None;
    }
    let mut fields: [String; 5] = Default::default();
    for (field, element) in fields.iter_mut().zip(elements) {
        match arena.get(env.resolve(arena, *element)) {
            AstNode::Atom { symbol, .. } => *field = arena.symbol_text(*symbol).to_string(),
            _ => return None,
        }
    }
    Some(VName::from_fields(fields))
}

/// Lazy candidate sequence returned by [`FactDatabase::facts_matching`]
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    facts: &'a [StoredFact],
    indices: CandidateIndices<'a>,
}

#[derive(Debug, Clone)]
enum CandidateIndices<'a> {
    Indexed(std::slice::Iter<'a, usize>),
    All(std::ops::Range<usize>),
}

impl<'a> Candidates<'a> {
    fn indexed(facts: &'a [StoredFact], indices: &'a [usize]) -> Self {
        Self {
            facts,
            indices: CandidateIndices::Indexed(indices.iter()),
        }
    }

    fn all(facts: &'a [StoredFact]) -> Self {
        Self {
            facts,
            indices: CandidateIndices::All(0..facts.len()),
        }
    }

    /// True when the sequence came from an index rather than a full scan
    pub fn is_indexed(&self) -> bool {
        matches!(self.indices, CandidateIndices::Indexed(_))
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = &'a StoredFact;

    fn next(&mut self) -> Option<Self::Item> {
        let index = match &mut self.indices {
            CandidateIndices::Indexed(iter) => *iter.next()?,
            CandidateIndices::All(range) => range.next()?,
        };
        self.facts.get(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.indices {
            CandidateIndices::Indexed(iter) => iter.size_hint(),
            CandidateIndices::All(range) => range.size_hint(),
        }
    }
}

/// Statistics about a fact database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub facts: usize,
    pub edges: usize,
    pub node_facts: usize,
    pub sources: usize,
    pub edge_kinds: usize,
    pub duplicates: usize,
}

impl fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fact Database Statistics:")?;
        writeln!(f, "  Facts: {} (edges: {}, node facts: {})", self.facts, self.edges, self.node_facts)?;
        writeln!(f, "  Source nodes: {}", self.sources)?;
        writeln!(f, "  Edge kinds: {}", self.edge_kinds)?;
        writeln!(f, "  Duplicates: {}", self.duplicates)
    }
}
