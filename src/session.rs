//! Verification session - one load → solve → report run
//!
//! A session owns the arena, the fact database and the goal groups parsed
//! from rule files. Facts and rules may be loaded in any order; nothing is
//! solved until [`VerificationSession::verify_all_goals`].

use crate::assertions::{self, ParseError, RuleFormat};
use crate::ast::pretty::{html_escape, quote_escape};
use crate::ast::{AstArena, NodeId};
use crate::database::{AssertOutcome, DatabaseStats, FactDatabase};
use crate::fact::Fact;
use crate::solver::{GoalGroup, GroupOutcome, Solver};
use crate::storage::{EntryStream, FactStore};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counts from loading one fact source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records read from the source
    pub records: usize,
    /// Records added to the database
    pub accepted: usize,
    /// Duplicates dropped because duplicates are ignored
    pub duplicates_ignored: usize,
    /// Records that failed to decode and were skipped
    pub skipped: usize,
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records, {} accepted, {} duplicates ignored, {} skipped",
            self.records, self.accepted, self.duplicates_ignored, self.skipped
        )
    }
}

/// State of one verification run
#[derive(Debug, Default)]
pub struct VerificationSession {
    arena: AstArena,
    database: FactDatabase,
    groups: Vec<GoalGroup>,
    outcomes: Vec<GroupOutcome>,
    highest_goal_reached: usize,
}

impl VerificationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop repeated facts instead of storing them twice
    pub fn ignore_duplicate_facts(&mut self) {
        self.database.ignore_duplicate_facts();
    }

    pub fn arena(&self) -> &AstArena {
        &self.arena
    }

    pub fn database(&self) -> &FactDatabase {
        &self.database
    }

    pub fn groups(&self) -> &[GoalGroup] {
        &self.groups
    }

    /// Per-group results of the last [`VerificationSession::verify_all_goals`]
    pub fn outcomes(&self) -> &[GroupOutcome] {
        &self.outcomes
    }

    /// Total goals across all groups
    pub fn goal_count(&self) -> usize {
        self.groups.iter().map(GoalGroup::len).sum()
    }

    pub fn stats(&self) -> DatabaseStats {
        self.database.stats()
    }

    // ========== Rules ==========

    /// Parse rule text into a new goal group
    pub fn load_rule_text(&mut self, name: &str, text: &str, format: RuleFormat) -> std::result::Result<&GoalGroup, ParseError> {
        let group = assertions::parse_rules(&mut self.arena, name, text, format)?;
        self.groups.push(group);
        Ok(&self.groups[self.groups.len() - 1])
    }

    /// Read and parse a rule file
    pub fn load_rule_file(&mut self, path: &Path, format: RuleFormat) -> Result<&GoalGroup> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadRules {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.display().to_string();
        Ok(self.load_rule_text(&name, &text, format)?)
    }

    // ========== Facts ==========

    /// Add one fact. `index` identifies the record in log messages only.
    pub fn assert_single_fact(&mut self, index: usize, fact: Fact) -> AssertOutcome {
        let outcome = self.database.assert_fact(&mut self.arena, fact);
        if outcome == AssertOutcome::DuplicateIgnored {
            debug!(index, "Duplicate fact ignored");
        }
        outcome
    }

    fn record(&mut self, stats: &mut LoadStats, index: usize, fact: Fact) {
        match self.assert_single_fact(index, fact) {
            AssertOutcome::DuplicateIgnored => stats.duplicates_ignored += 1,
            _ => stats.accepted += 1,
        }
    }

    /// Load a delimited `Entry` stream.
    ///
    /// Records that fail to decode are skipped; a truncated stream is an error.
    pub fn load_stream<R, F>(&mut self, reader: R, mut on_fact: F) -> Result<LoadStats>
    where
        R: Read,
        F: FnMut(usize, &Fact),
    {
        let mut stats = LoadStats::default();
        for (index, record) in EntryStream::from_reader(reader)? {
            stats.records += 1;
            match record {
                Ok(fact) => {
                    on_fact(index, &fact);
                    self.record(&mut stats, index, fact);
                }
                Err(err) if err.is_recoverable() => {
                    warn!(index, error = %err, "Skipping undecodable record");
                    stats.skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!(%stats, "Loaded fact stream");
        Ok(stats)
    }

    /// Load every entry of a fact store, in key order. Malformed keys are skipped.
    pub fn load_store<F>(&mut self, store: &FactStore, mut on_fact: F) -> Result<LoadStats>
    where
        F: FnMut(usize, &Fact),
    {
        let mut stats = LoadStats::default();
        store.for_each_fact(|index, decoded| {
            stats.records += 1;
            match decoded {
                Ok(fact) => {
                    on_fact(index, &fact);
                    self.record(&mut stats, index, fact);
                }
                Err(err) => {
                    warn!(index, error = %err, "Skipping malformed key");
                    stats.skipped += 1;
                }
            }
        })?;
        info!(%stats, "Loaded fact store");
        Ok(stats)
    }

    // ========== Verification ==========

    /// Solve every goal group. True when all of them are satisfied.
    pub fn verify_all_goals(&mut self) -> bool {
        let mut solver = Solver::new(&self.arena, &self.database);
        let outcomes: Vec<GroupOutcome> = self.groups.iter().map(|group| solver.solve_group(group)).collect();

        let mut offset = 0;
        let mut highest = None;
        for (group, outcome) in self.groups.iter().zip(&outcomes) {
            if !outcome.is_satisfied() {
                highest = Some(offset + outcome.highest_goal_reached);
                break;
            }
            offset += group.len();
        }

        let satisfied = highest.is_none();
        self.highest_goal_reached = highest.unwrap_or(offset);
        self.outcomes = outcomes;
        info!(
            groups = self.groups.len(),
            goals = self.goal_count(),
            facts = self.database.len(),
            satisfied,
            "Verification finished"
        );
        satisfied
    }

    /// Index, across all groups in load order, of the furthest goal reached in
    /// the first unsatisfied group. Equals the goal count when all succeeded.
    pub fn highest_goal_reached(&self) -> usize {
        self.highest_goal_reached
    }

    /// Group and goal node at a flattened goal index
    pub fn goal_at(&self, mut index: usize) -> Option<(&GoalGroup, NodeId)> {
        for group in &self.groups {
            if index < group.len() {
                return Some((group, group.goals[index]));
            }
            index -= group.len();
        }
        None
    }

    /// `file:line:col: goal` for a flattened goal index
    pub fn describe_goal(&self, index: usize) -> Option<String> {
        let (group, goal) = self.goal_at(index)?;
        let span = self.arena.get(goal).span();
        Some(format!("{}:{}: {}", group.name, span, self.arena.display(goal)))
    }

    /// The goal the last run failed on
    pub fn describe_error_goal(&self) -> Option<String> {
        self.describe_goal(self.highest_goal_reached)
    }

    // ========== Dumps ==========

    /// Print every parsed goal, grouped by rule file
    pub fn show_goals<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for group in &self.groups {
            writeln!(out, "goals from {}:", group.name)?;
            for goal in &group.goals {
                let span = self.arena.get(*goal).span();
                writeln!(out, "  {}: {}", span, self.arena.display(*goal))?;
            }
        }
        Ok(())
    }

    /// Print inspection results of satisfied groups
    pub fn show_inspections<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (group, outcome) in self.groups.iter().zip(&self.outcomes) {
            for inspection in &outcome.inspections {
                writeln!(out, "{}:{}: {}: {}", group.name, inspection.span, inspection.label, inspection.value)?;
            }
        }
        Ok(())
    }

    /// Write the fact graph in DOT format
    pub fn dump_as_dot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut node_facts: BTreeMap<String, Vec<(&str, String)>> = BTreeMap::new();
        let mut edges = Vec::new();
        for fact in self.database.facts() {
            let source = fact.source.to_ticket();
            match &fact.target {
                Some(target) => {
                    node_facts.entry(target.to_ticket()).or_default();
                    edges.push((source.clone(), target.to_ticket(), fact));
                    node_facts.entry(source).or_default();
                }
                None => node_facts
                    .entry(source)
                    .or_default()
                    .push((fact.fact_name.as_str(), fact.value_text())),
            }
        }

        writeln!(out, "digraph G {{")?;
        for (ticket, facts) in &node_facts {
            writeln!(out, "  \"{}\" [ shape=plaintext label=<{}> ];", quote_escape(ticket), node_table(ticket, facts))?;
        }
        for (source, target, fact) in &edges {
            let mut label = fact.edge_kind.clone();
            if fact.fact_name != "/" {
                let _ = write!(label, ".{}", fact.value_text());
            }
            writeln!(
                out,
                "  \"{}\" -> \"{}\" [ label=\"{}\" ];",
                quote_escape(source),
                quote_escape(target),
                quote_escape(&label)
            )?;
        }
        writeln!(out, "}}")
    }

    /// Write all facts as a JSON array
    pub fn dump_as_json<W: Write>(&self, out: &mut W) -> Result<()> {
        let facts: Vec<&Fact> = self.database.facts().collect();
        serde_json::to_writer_pretty(&mut *out, &facts)?;
        writeln!(out)?;
        Ok(())
    }
}

fn node_table(ticket: &str, facts: &[(&str, String)]) -> String {
    let mut table = format!("<TABLE><TR><TD COLSPAN=\"2\">{}</TD></TR>", html_escape(ticket));
    for (name, value) in facts {
        let _ = write!(table, "<TR><TD>{}</TD><TD>{}</TD></TR>", html_escape(name), html_escape(value));
    }
    table.push_str("</TABLE>");
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::NODE_KIND_FACT;
    use crate::vname::VName;

    fn session_with(facts: Vec<Fact>) -> VerificationSession {
        let mut session = VerificationSession::new();
        for (index, fact) in facts.into_iter().enumerate() {
            session.assert_single_fact(index, fact);
        }
        session
    }

    #[test]
    fn test_flattened_highest_goal() {
        let mut session = session_with(vec![Fact::edge(
            VName::with_signature("a"),
            "/kythe/edge/ref",
            VName::with_signature("b"),
        )]);
        session.load_rule_text("one", "X ref Y", RuleFormat::Plain).unwrap();
        session
            .load_rule_text("two", "X ref Y\nY ref Z\nZ ref W", RuleFormat::Plain)
            .unwrap();

        assert!(!session.verify_all_goals());
        // Group one has one goal; group two fails on its second goal.
        assert_eq!(session.highest_goal_reached(), 2);
        let described = session.describe_error_goal().unwrap();
        assert!(described.starts_with("two:2:1"), "{described}");
        assert!(described.contains("fact(Y, \"/kythe/edge/ref\", Z, _, _)"));
    }

    #[test]
    fn test_all_satisfied_reports_goal_count() {
        let mut session = session_with(vec![Fact::node(VName::with_signature("a"), NODE_KIND_FACT, "record")]);
        session.load_rule_text("r", "X.node/kind record\nX = Y", RuleFormat::Plain).unwrap();
        assert!(session.verify_all_goals());
        assert_eq!(session.highest_goal_reached(), 2);
        assert!(session.describe_error_goal().is_none());
    }

    #[test]
    fn test_inspections_reported() {
        let mut session = session_with(vec![Fact::node(VName::with_signature("a"), NODE_KIND_FACT, "record")]);
        session.load_rule_text("r", "X?.node/kind K?", RuleFormat::Plain).unwrap();
        assert!(session.verify_all_goals());

        let mut out = Vec::new();
        session.show_inspections(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"X: vname("a", "", "", "", "")"#), "{text}");
        assert!(text.contains(r#"K: "record""#), "{text}");
    }

    #[test]
    fn test_dot_dump_escapes() {
        let session = session_with(vec![
            Fact::node(VName::with_signature("a"), NODE_KIND_FACT, "<b>"),
            Fact::edge(VName::with_signature("a"), "/kythe/edge/ref", VName::with_signature("q\"")),
        ]);
        let mut out = Vec::new();
        session.dump_as_dot(&mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("<TD>&lt;b&gt;</TD>"));
        assert!(dot.contains("\"kythe://#a\" -> \"kythe://#q\\\"\" [ label=\"/kythe/edge/ref\" ];"));
    }

    #[test]
    fn test_json_dump() {
        let session = session_with(vec![Fact::node(VName::with_signature("a"), NODE_KIND_FACT, "record")]);
        let mut out = Vec::new();
        session.dump_as_json(&mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[0]["fact_name"], NODE_KIND_FACT);
        assert_eq!(json[0]["fact_value"], "record");
        assert_eq!(json[0]["source"]["signature"], "a");
    }

    #[test]
    fn test_show_goals() {
        let mut session = VerificationSession::new();
        session.load_rule_text("r", "X ref Y", RuleFormat::Plain).unwrap();
        let mut out = Vec::new();
        session.show_goals(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "goals from r:\n  1:1-8: fact(X, \"/kythe/edge/ref\", Y, _, _)\n");
    }
}
