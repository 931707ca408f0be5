//! Inline rule files: goals embedded in source code behind `//-`
//!
//! ```text
//! //- @foo defines/binding VarFoo
//! //- VarFoo.node/kind variable
//! int foo = 0;
//! ```
//!
//! Consecutive `//-` lines form a block. Anchor specs (`@foo`) in a block
//! refer to the first occurrence of their token in the next non-rule line.

use crate::ast::Position;

/// Marks a rule line in an inline rule file
pub const RULE_PREFIX: &str = "//-";

/// One physical line of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// 1-based line number
    pub number: u32,
    /// Byte offset of the line start in the file
    pub offset: usize,
    /// Line text without its terminator
    pub text: &'a str,
}

impl SourceLine<'_> {
    /// Byte range in the file of the first occurrence of `token` on this line
    pub fn find(&self, token: &str) -> Option<(usize, usize)> {
        if token.is_empty() {
            return None;
        }
        let start = self.offset + self.text.find(token)?;
        Some((start, start + token.len()))
    }
}

/// Rule text taken from one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleLine<'a> {
    pub number: u32,
    /// 1-based column of `text` within the physical line
    pub column: u32,
    pub text: &'a str,
}

/// Consecutive rule lines parsed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBlock<'a> {
    pub lines: Vec<RuleLine<'a>>,
    /// Line anchor specs resolve against; only set for inline files
    pub target: Option<SourceLine<'a>>,
    pub inline: bool,
}

impl RuleBlock<'_> {
    /// Rule text as handed to the parser
    pub fn text(&self) -> String {
        let mut text = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(line.text);
        }
        text
    }

    /// Map a 1-based (line, column) in [`RuleBlock::text`] back to the file
    pub fn map_position(&self, line: usize, column: usize) -> Position {
        let Some(last) = self.lines.len().checked_sub(1) else {
            return Position::new(line as u32, column as u32);
        };
        let rule_line = &self.lines[line.saturating_sub(1).min(last)];
        Position::new(rule_line.number, rule_line.column + column as u32 - 1)
    }
}

/// Split text into lines, keeping byte offsets
pub fn source_lines(text: &str) -> Vec<SourceLine<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (index, raw) in text.split_inclusive('\n').enumerate() {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);
        lines.push(SourceLine {
            number: index as u32 + 1,
            offset,
            text: line,
        });
        offset += raw.len();
    }
    lines
}

fn rule_text<'a>(line: &SourceLine<'a>) -> Option<RuleLine<'a>> {
    let trimmed = line.text.trim_start();
    let rest = trimmed.strip_prefix(RULE_PREFIX)?;
    let column = line.text.len() - rest.len() + 1;
    Some(RuleLine {
        number: line.number,
        column: column as u32,
        text: rest,
    })
}

/// True when `text` contains at least one `//-` rule line
pub fn is_inline_rule_file(text: &str) -> bool {
    source_lines(text).iter().any(|line| rule_text(line).is_some())
}

/// The whole text as a single block
pub fn plain_block(text: &str) -> RuleBlock<'_> {
    RuleBlock {
        lines: source_lines(text)
            .into_iter()
            .map(|line| RuleLine {
                number: line.number,
                column: 1,
                text: line.text,
            })
            .collect(),
        target: None,
        inline: false,
    }
}

/// Collect the `//-` blocks of an inline rule file, in file order
pub fn extract_rule_blocks(text: &str) -> Vec<RuleBlock<'_>> {
    let lines = source_lines(text);
    let mut blocks = Vec::new();
    let mut current: Vec<RuleLine<'_>> = Vec::new();

    for line in &lines {
        match rule_text(line) {
            Some(rule) => current.push(rule),
            None if !current.is_empty() => blocks.push(RuleBlock {
                lines: std::mem::take(&mut current),
                target: Some(*line),
                inline: true,
            }),
            None => {}
        }
    }
    if !current.is_empty() {
        blocks.push(RuleBlock {
            lines: current,
            target: None,
            inline: true,
        });
    }
    blocks
}
