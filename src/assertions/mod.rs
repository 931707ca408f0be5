//! Assertion language - rule text to goal groups
//!
//! Rule files are either plain goal lists or source files carrying goals in
//! `//-` comment lines (see [`inline`]). Either way one file becomes one
//! [`GoalGroup`] whose variables are scoped to that file.

pub mod inline;
pub mod parser;

pub use inline::{RuleBlock, extract_rule_blocks, is_inline_rule_file, plain_block};
pub use parser::{ParseError, RuleBuilder, is_variable_name};

use crate::ast::AstArena;
use crate::solver::GoalGroup;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Extensions of files holding nothing but goals
const PLAIN_RULE_EXTENSIONS: &[&str] = &["rules", "txt"];

/// How to read a rule file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleFormat {
    /// Inline if any `//-` line is present or the file has a source
    /// extension; plain for `.rules`, `.txt` and extensionless files
    #[default]
    Detect,
    Plain,
    Inline,
}

/// Parse `text` into a goal group named `name`
pub fn parse_rules(
    arena: &mut AstArena,
    name: &str,
    text: &str,
    format: RuleFormat,
) -> Result<GoalGroup, ParseError> {
    let inline = match format {
        RuleFormat::Detect => detect_inline(name, text),
        RuleFormat::Plain => false,
        RuleFormat::Inline => true,
    };

    let mut builder = RuleBuilder::new(arena, name);
    if inline {
        let blocks = extract_rule_blocks(text);
        debug!(file = %name, blocks = blocks.len(), "Parsing inline rules");
        for block in &blocks {
            builder.add_block(block)?;
        }
    } else {
        builder.add_block(&plain_block(text))?;
    }

    let group = builder.finish();
    debug!(file = %name, goals = group.len(), inspections = group.inspections.len(), "Parsed rules");
    Ok(group)
}

fn detect_inline(name: &str, text: &str) -> bool {
    if is_inline_rule_file(text) {
        return true;
    }
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !PLAIN_RULE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_format() {
        let mut arena = AstArena::new();
        let inline = "//- X ref Y\nint x;\n// not a rule\n";
        let group = parse_rules(&mut arena, "a.cc", inline, RuleFormat::Detect).unwrap();
        assert_eq!(group.len(), 1);

        // Read as plain text, the C++ line is a syntax error.
        assert!(parse_rules(&mut arena, "a.cc", inline, RuleFormat::Plain).is_err());
    }

    #[test]
    fn test_detect_source_file_without_rules_is_empty() {
        let mut arena = AstArena::new();
        let group = parse_rules(&mut arena, "src/empty.cc", "int x;\n", RuleFormat::Detect).unwrap();
        assert!(group.is_empty());

        // Plain rule files keep reporting syntax errors.
        for name in ["bad.rules", "bad.txt", "bad"] {
            assert!(parse_rules(&mut arena, name, "int x;\n", RuleFormat::Detect).is_err());
        }
        let group = parse_rules(&mut arena, "goals.rules", "X ref Y\n", RuleFormat::Detect).unwrap();
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_forced_inline_without_rules_is_empty() {
        let mut arena = AstArena::new();
        let group = parse_rules(&mut arena, "empty.cc", "int x;\n", RuleFormat::Inline).unwrap();
        assert!(group.is_empty());
        assert_eq!(group.name, "empty.cc");
    }
}
