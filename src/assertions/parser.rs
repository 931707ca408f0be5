use super::inline::RuleBlock;
use crate::ast::{AstArena, NodeId, Span, VarId};
use crate::fact::{ANCHOR_END_FACT, ANCHOR_KIND, ANCHOR_START_FACT, NODE_KIND_FACT};
use crate::solver::{GoalGroup, Inspection};
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::collections::HashMap;

#[derive(Parser)]
#[grammar = "assertions/grammar.pest"]
pub struct AssertionParser;

/// Errors raised while turning rule text into goals
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{path}:{span}: syntax error: {message}")]
    Syntax { path: String, span: Span, message: String },

    #[error("{path}:{span}: {message}")]
    AnchorSpec { path: String, span: Span, message: String },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Syntax { span, .. } | ParseError::AnchorSpec { span, .. } => *span,
        }
    }
}

/// Identifiers starting with an uppercase letter or `_` name variables
pub fn is_variable_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase() || c == '_')
}

/// Builds goals for one goal group from parsed rule blocks.
///
/// Variable names are scoped to the builder, so every block fed to the same
/// builder shares variables.
pub struct RuleBuilder<'a> {
    arena: &'a mut AstArena,
    group: GoalGroup,
    vars: HashMap<String, VarId>,
}

/// Per-block state while walking pest pairs
struct BlockContext<'b, 'src> {
    block: &'b RuleBlock<'src>,
    anchors: HashMap<String, NodeId>,
}

impl<'a> RuleBuilder<'a> {
    pub fn new(arena: &'a mut AstArena, name: impl Into<String>) -> Self {
        Self {
            arena,
            group: GoalGroup::new(name),
            vars: HashMap::new(),
        }
    }

    pub fn finish(self) -> GoalGroup {
        self.group
    }

    /// Parse one block and append its goals
    pub fn add_block(&mut self, block: &RuleBlock<'_>) -> Result<(), ParseError> {
        let text = block.text();
        let mut pairs = AssertionParser::parse(Rule::unit, &text).map_err(|err| {
            let (line, column) = match err.line_col {
                LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
            };
            let position = block.map_position(line, column);
            ParseError::Syntax {
                path: self.group.name.clone(),
                span: Span::new(position, position),
                message: err.variant.message().into_owned(),
            }
        })?;

        let mut context = BlockContext {
            block,
            anchors: HashMap::new(),
        };
        let Some(unit) = pairs.next() else {
            return Ok(());
        };
        for pair in unit.into_inner() {
            if pair.as_rule() == Rule::goal {
                self.build_goal(&mut context, pair)?;
            }
        }
        Ok(())
    }

    fn span_of(&self, context: &BlockContext<'_, '_>, pair: &Pair<'_, Rule>) -> Span {
        let (begin_line, begin_col) = pair.as_span().start_pos().line_col();
        let (end_line, end_col) = pair.as_span().end_pos().line_col();
        Span::new(
            context.block.map_position(begin_line, begin_col),
            context.block.map_position(end_line, end_col),
        )
    }

    fn build_goal(&mut self, context: &mut BlockContext<'_, '_>, pair: Pair<'_, Rule>) -> Result<(), ParseError> {
        let Some(goal) = pair.into_inner().next() else {
            return Ok(());
        };
        let span = self.span_of(context, &goal);
        let rule = goal.as_rule();
        let mut inner = goal.into_inner();

        let node = match rule {
            Rule::node_fact => {
                let source = self.build_exp(context, next_pair(&mut inner))?;
                let name = self.nonempty_label(context, next_pair(&mut inner))?;
                let value = self.build_exp(context, next_pair(&mut inner))?;
                self.arena.create_simple_node_fact(span, source, &name, value)
            }
            Rule::edge_fact => {
                let source = self.build_exp(context, next_pair(&mut inner))?;
                let edge_label = next_pair(&mut next_pair(&mut inner).into_inner());
                let kind = match edge_label.as_rule() {
                    Rule::dont_care => None,
                    _ => Some(self.nonempty_label(context, edge_label)?),
                };
                let mut next = next_pair(&mut inner);
                let ordinal = if next.as_rule() == Rule::ordinal {
                    let atom = next_pair(&mut next.into_inner());
                    next = next_pair(&mut inner);
                    Some(self.build_atom(context, atom)?)
                } else {
                    None
                };
                let target = self.build_exp(context, next)?;
                self.arena.create_simple_edge_fact(span, source, kind.as_deref(), target, ordinal)
            }
            Rule::constraint => {
                let lhs = self.build_atom(context, next_pair(&mut inner))?;
                let rhs = self.build_exp(context, next_pair(&mut inner))?;
                self.arena.create_equality_constraint(span, lhs, rhs)
            }
            other => unreachable!("unexpected goal rule {other:?}"),
        };
        self.group.goals.push(node);
        Ok(())
    }

    /// Text of an edge kind or fact name, which may not be empty
    fn nonempty_label(&self, context: &BlockContext<'_, '_>, pair: Pair<'_, Rule>) -> Result<String, ParseError> {
        let span = self.span_of(context, &pair);
        let text = label_text(pair);
        if text.is_empty() {
            return Err(ParseError::Syntax {
                path: self.group.name.clone(),
                span,
                message: "empty label".to_string(),
            });
        }
        Ok(text)
    }

    fn build_exp(&mut self, context: &mut BlockContext<'_, '_>, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let exp = next_pair(&mut pair.into_inner());
        let span = self.span_of(context, &exp);
        match exp.as_rule() {
            Rule::application => {
                let mut inner = exp.into_inner();
                let verb = self.build_atom(context, next_pair(&mut inner))?;
                let tuple = next_pair(&mut inner);
                let tuple_span = self.span_of(context, &tuple);
                let mut elements = Vec::new();
                for element in tuple.into_inner() {
                    elements.push(self.build_exp(context, element)?);
                }
                let args = self.arena.create_tuple(tuple_span, elements);
                Ok(self.arena.create_app(span, verb, args))
            }
            Rule::equality => {
                // The constraint is its own goal, placed before the goal using the atom.
                let mut inner = exp.into_inner();
                let lhs = self.build_atom(context, next_pair(&mut inner))?;
                let rhs = self.build_exp(context, next_pair(&mut inner))?;
                let goal = self.arena.create_equality_constraint(span, lhs, rhs);
                self.group.goals.push(goal);
                Ok(lhs)
            }
            Rule::atom => self.build_atom(context, exp),
            other => unreachable!("unexpected expression rule {other:?}"),
        }
    }

    fn build_atom(&mut self, context: &mut BlockContext<'_, '_>, pair: Pair<'_, Rule>) -> Result<NodeId, ParseError> {
        let atom = next_pair(&mut pair.into_inner());
        let span = self.span_of(context, &atom);
        match atom.as_rule() {
            Rule::location_spec => {
                let token = label_text(next_pair(&mut atom.into_inner()));
                self.create_anchor_spec(context, span, &token)
            }
            Rule::inspect => {
                let inner = next_pair(&mut atom.into_inner());
                Ok(self.create_inspect(span, inner.as_str()))
            }
            Rule::dont_care => Ok(self.arena.create_dont_care(span)),
            Rule::string => Ok(self.arena.create_atom(span, &string_text(atom))),
            Rule::number => Ok(self.arena.create_atom(span, atom.as_str())),
            Rule::identifier => Ok(self.create_identifier(span, atom.as_str())),
            other => unreachable!("unexpected atom rule {other:?}"),
        }
    }

    /// Variable or constant, depending on how `name` is spelled
    pub fn create_identifier(&mut self, span: Span, name: &str) -> NodeId {
        if !is_variable_name(name) {
            return self.arena.create_atom(span, name);
        }
        let var = match self.vars.get(name) {
            Some(var) => *var,
            None => {
                let var = self.arena.fresh_var();
                self.vars.insert(name.to_string(), var);
                var
            }
        };
        self.arena.create_identifier(span, name, var)
    }

    /// `X?` or `_?`: a variable whose value is reported on success
    pub fn create_inspect(&mut self, span: Span, name: &str) -> NodeId {
        let node = if name == "_" {
            let var = self.arena.fresh_var();
            self.arena.create_identifier(span, "_", var)
        } else {
            self.create_identifier(span, name)
        };
        self.group.inspections.push(Inspection {
            label: name.to_string(),
            node,
            span,
        });
        node
    }

    /// `@token`: a fresh variable constrained to be the anchor covering
    /// `token` on the source line below the block
    fn create_anchor_spec(
        &mut self,
        context: &mut BlockContext<'_, '_>,
        span: Span,
        token: &str,
    ) -> Result<NodeId, ParseError> {
        if let Some(anchor) = context.anchors.get(token) {
            return Ok(*anchor);
        }
        let error = |message: String| ParseError::AnchorSpec {
            path: self.group.name.clone(),
            span,
            message,
        };
        if !context.block.inline {
            return Err(error(format!("anchor spec @{token} outside an inline rule file")));
        }
        let Some(target) = context.block.target else {
            return Err(error(format!("no source line follows anchor spec @{token}")));
        };
        let Some((start, end)) = target.find(token) else {
            return Err(error(format!("could not find \"{token}\" on line {}", target.number)));
        };

        let var = self.arena.fresh_var();
        let anchor = self.arena.create_identifier(span, &format!("@{token}"), var);
        let kind = self.arena.create_atom(span, ANCHOR_KIND);
        let start = self.arena.create_atom(span, &start.to_string());
        let end = self.arena.create_atom(span, &end.to_string());
        for (name, value) in [(NODE_KIND_FACT, kind), (ANCHOR_START_FACT, start), (ANCHOR_END_FACT, end)] {
            let goal = self.arena.create_simple_node_fact(span, anchor, name, value);
            self.group.goals.push(goal);
        }
        context.anchors.insert(token.to_string(), anchor);
        Ok(anchor)
    }
}

/// The grammar guarantees the shape of every rule, so a missing child is a bug.
fn next_pair<'i>(pairs: &mut pest::iterators::Pairs<'i, Rule>) -> Pair<'i, Rule> {
    pairs.next().unwrap_or_else(|| unreachable!("grammar produced a truncated pair"))
}

fn label_text(pair: Pair<'_, Rule>) -> String {
    let inner = next_pair(&mut pair.into_inner());
    match inner.as_rule() {
        Rule::string => string_text(inner),
        _ => inner.as_str().to_string(),
    }
}

fn string_text(pair: Pair<'_, Rule>) -> String {
    let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(other) => text.push(other),
            None => {}
        }
    }
    text
}
