//! Term representation - arena-allocated assertion AST
//!
//! Goals parsed from rule text and facts loaded from the database are both
//! stored as terms in one [`AstArena`]:
//! - `Atom`: interned constant, compared by symbol identity
//! - `Identifier`: named logic variable (bindings live in `unify::Environment`)
//! - `DontCare`: anonymous variable, fresh at every occurrence
//! - `Tuple`: fixed-arity sequence
//! - `App`: a verb atom applied to an argument tuple
//!
//! Nodes are immutable once built and are never freed individually; the
//! arena is dropped as a whole at the end of a verification run.

pub mod pretty;

use crate::fact::{self, Fact};
use crate::vname::VName;
use pretty::QuoteEscaper;
use std::collections::HashMap;
use std::fmt::{self, Write};

/// Handle to a node in an [`AstArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a logic variable. Names are only a parsing convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interned string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// 1-based line/column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range of a node, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub begin: Position,
    pub end: Position,
}

impl Span {
    pub fn new(begin: Position, end: Position) -> Self {
        Self { begin, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin == self.end || self.begin.line != self.end.line {
            write!(f, "{}:{}", self.begin.line, self.begin.column)
        } else {
            write!(f, "{}:{}-{}", self.begin.line, self.begin.column, self.end.column)
        }
    }
}

/// One term node
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Atom { span: Span, symbol: Symbol },
    Identifier { span: Span, name: Symbol, var: VarId },
    DontCare { span: Span },
    Tuple { span: Span, elements: Box<[NodeId]> },
    App { span: Span, verb: NodeId, args: NodeId },
}

impl AstNode {
    pub fn span(&self) -> Span {
        match self {
            AstNode::Atom { span, .. }
            | AstNode::Identifier { span, .. }
            | AstNode::DontCare { span }
            | AstNode::Tuple { span, .. }
            | AstNode::App { span, .. } => *span,
        }
    }
}

/// Symbols the engine itself relies on
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    /// Verb of fact terms and fact goals
    pub fact: Symbol,
    /// Verb of equality goals
    pub equals: Symbol,
    /// Verb of VName terms
    pub vname: Symbol,
    /// The empty string
    pub empty: Symbol,
}

/// Variable bindings consulted while rendering terms
pub trait Bindings {
    fn lookup(&self, var: VarId) -> Option<NodeId>;
}

/// Renders variables as themselves
pub struct Unbound;

impl Bindings for Unbound {
    fn lookup(&self, _var: VarId) -> Option<NodeId> {
        None
    }
}

/// Owner of every node built during one run
#[derive(Debug)]
pub struct AstArena {
    nodes: Vec<AstNode>,
    symbols: Vec<String>,
    symbol_ids: HashMap<String, Symbol>,
    var_count: u32,
    builtins: Builtins,
}

impl Default for AstArena {
    fn default() -> Self {
        Self::new()
    }
}

impl AstArena {
    pub fn new() -> Self {
        let mut arena = Self {
            nodes: Vec::new(),
            symbols: Vec::new(),
            symbol_ids: HashMap::new(),
            var_count: 0,
            builtins: Builtins {
                fact: Symbol(0),
                equals: Symbol(0),
                vname: Symbol(0),
                empty: Symbol(0),
            },
        };
        arena.builtins = Builtins {
            fact: arena.intern("fact"),
            equals: arena.intern("="),
            vname: arena.intern("vname"),
            empty: arena.intern(""),
        };
        arena
    }

    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    /// Intern `text`, returning the same symbol for equal strings
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(symbol) = self.symbol_ids.get(text) {
            return *symbol;
        }
        let symbol = Symbol(self.symbols.len() as u32);
        self.symbols.push(text.to_string());
        self.symbol_ids.insert(text.to_string(), symbol);
        symbol
    }

    /// Look up a symbol without interning
    pub fn find_symbol(&self, text: &str) -> Option<Symbol> {
        self.symbol_ids.get(text).copied()
    }

    pub fn symbol_text(&self, symbol: Symbol) -> &str {
        &self.symbols[symbol.0 as usize]
    }

    pub fn get(&self, node: NodeId) -> &AstNode {
        &self.nodes[node.index()]
    }

    /// Number of nodes allocated so far
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a new logic variable
    pub fn fresh_var(&mut self) -> VarId {
        let var = VarId(self.var_count);
        self.var_count += 1;
        var
    }

    pub fn var_count(&self) -> usize {
        self.var_count as usize
    }

    fn push(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    // ========== Builders ==========

    pub fn create_atom(&mut self, span: Span, text: &str) -> NodeId {
        let symbol = self.intern(text);
        self.push(AstNode::Atom { span, symbol })
    }

    pub fn create_symbol_atom(&mut self, span: Span, symbol: Symbol) -> NodeId {
        self.push(AstNode::Atom { span, symbol })
    }

    /// Create an occurrence of variable `var`. The caller owns the name → var scope.
    pub fn create_identifier(&mut self, span: Span, name: &str, var: VarId) -> NodeId {
        let name = self.intern(name);
        self.push(AstNode::Identifier { span, name, var })
    }

    pub fn create_dont_care(&mut self, span: Span) -> NodeId {
        self.push(AstNode::DontCare { span })
    }

    pub fn create_tuple(&mut self, span: Span, elements: Vec<NodeId>) -> NodeId {
        self.push(AstNode::Tuple {
            span,
            elements: elements.into_boxed_slice(),
        })
    }

    /// Apply `verb` to `args`. `args` must be a tuple.
    pub fn create_app(&mut self, span: Span, verb: NodeId, args: NodeId) -> NodeId {
        debug_assert!(matches!(self.get(args), AstNode::Tuple { .. }));
        self.push(AstNode::App { span, verb, args })
    }

    fn create_builtin_app(&mut self, span: Span, verb: Symbol, elements: Vec<NodeId>) -> NodeId {
        let verb = self.create_symbol_atom(span, verb);
        let args = self.create_tuple(span, elements);
        self.create_app(span, verb, args)
    }

    /// `vname(signature, corpus, root, path, language)`
    pub fn create_vname(&mut self, span: Span, vname: &VName) -> NodeId {
        let fields = vname
            .fields()
            .iter()
            .map(|field| self.create_atom(span, field))
            .collect();
        self.create_builtin_app(span, self.builtins.vname, fields)
    }

    /// The term a loaded fact is matched through:
    /// `fact(source, edge_kind, target, fact_name, fact_value)`
    pub fn create_fact_term(&mut self, fact: &Fact) -> NodeId {
        let span = Span::default();
        let source = self.create_vname(span, &fact.source);
        let edge_kind = self.create_atom(span, &fact.edge_kind);
        let target = match &fact.target {
            Some(target) => self.create_vname(span, target),
            None => self.create_symbol_atom(span, self.builtins.empty),
        };
        let fact_name = self.create_atom(span, &fact.fact_name);
        let fact_value = self.create_atom(span, &fact.value_text());
        self.create_builtin_app(
            span,
            self.builtins.fact,
            vec![source, edge_kind, target, fact_name, fact_value],
        )
    }

    /// Goal `source edge_name target` (optionally `edge_name.ordinal`).
    ///
    /// A missing `edge_name` matches any edge kind. Without an ordinal the
    /// fact name and value are left open.
    pub fn create_simple_edge_fact(
        &mut self,
        span: Span,
        source: NodeId,
        edge_name: Option<&str>,
        target: NodeId,
        ordinal: Option<NodeId>,
    ) -> NodeId {
        let edge_kind = match edge_name {
            Some(edge_name) => self.create_atom(span, &fact::expand_edge_kind(edge_name)),
            None => self.create_dont_care(span),
        };
        let (fact_name, fact_value) = match ordinal {
            Some(ordinal) => (self.create_atom(span, fact::ORDINAL_FACT), ordinal),
            None => (self.create_dont_care(span), self.create_dont_care(span)),
        };
        self.create_builtin_app(
            span,
            self.builtins.fact,
            vec![source, edge_kind, target, fact_name, fact_value],
        )
    }

    /// Goal `source.fact_name value`
    pub fn create_simple_node_fact(
        &mut self,
        span: Span,
        source: NodeId,
        fact_name: &str,
        value: NodeId,
    ) -> NodeId {
        let edge_kind = self.create_symbol_atom(span, self.builtins.empty);
        let target = self.create_symbol_atom(span, self.builtins.empty);
        let fact_name = self.create_atom(span, &fact::expand_fact_name(fact_name));
        self.create_builtin_app(
            span,
            self.builtins.fact,
            vec![source, edge_kind, target, fact_name, value],
        )
    }

    /// Goal `lhs = rhs`
    pub fn create_equality_constraint(&mut self, span: Span, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.create_builtin_app(span, self.builtins.equals, vec![lhs, rhs])
    }

    // ========== Inspection ==========

    /// Elements of a tuple node, or of the argument tuple of an App
    pub fn tuple_elements(&self, node: NodeId) -> Option<&[NodeId]> {
        match self.get(node) {
            AstNode::Tuple { elements, .. } => Some(elements),
            AstNode::App { args, .. } => self.tuple_elements(*args),
            _ => None,
        }
    }

    /// Verb symbol of an App whose verb is an atom
    pub fn app_verb(&self, node: NodeId) -> Option<Symbol> {
        match self.get(node) {
            AstNode::App { verb, .. } => match self.get(*verb) {
                AstNode::Atom { symbol, .. } => Some(*symbol),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render `node` with variables shown by name
    pub fn display(&self, node: NodeId) -> NodeDisplay<'_, Unbound> {
        NodeDisplay {
            arena: self,
            node,
            bindings: &Unbound,
        }
    }

    /// Render `node`, substituting bound variables
    pub fn display_with<'a, B: Bindings>(&'a self, node: NodeId, bindings: &'a B) -> NodeDisplay<'a, B> {
        NodeDisplay {
            arena: self,
            node,
            bindings,
        }
    }
}

/// `Display` adapter for terms
pub struct NodeDisplay<'a, B: Bindings> {
    arena: &'a AstArena,
    node: NodeId,
    bindings: &'a B,
}

impl<B: Bindings> NodeDisplay<'_, B> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, node: NodeId) -> fmt::Result {
        match self.arena.get(node) {
            AstNode::Atom { symbol, .. } => {
                f.write_char('"')?;
                QuoteEscaper::new(&mut *f).write_str(self.arena.symbol_text(*symbol))?;
                f.write_char('"')
            }
            AstNode::Identifier { name, var, .. } => match self.bindings.lookup(*var) {
                Some(bound) => self.write_node(f, bound),
                None => f.write_str(self.arena.symbol_text(*name)),
            },
            AstNode::DontCare { .. } => f.write_char('_'),
            AstNode::Tuple { elements, .. } => {
                f.write_char('(')?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.write_node(f, *element)?;
                }
                f.write_char(')')
            }
            AstNode::App { verb, args, .. } => {
                let equals = self.arena.builtins.equals;
                if self.arena.app_verb(node) == Some(equals) {
                    if let Some([lhs, rhs]) = self.arena.tuple_elements(*args) {
                        self.write_node(f, *lhs)?;
                        f.write_str(" = ")?;
                        return self.write_node(f, *rhs);
                    }
                }
                match self.arena.get(*verb) {
                    AstNode::Atom { symbol, .. } => f.write_str(self.arena.symbol_text(*symbol))?,
                    _ => self.write_node(f, *verb)?,
                }
                self.write_node(f, *args)
            }
        }
    }
}

impl<B: Bindings> fmt::Display for NodeDisplay<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let mut arena = AstArena::new();
        let a = arena.intern("/kythe/edge/ref");
        let b = arena.intern("/kythe/edge/ref");
        assert_eq!(a, b);
        assert_eq!(arena.symbol_text(a), "/kythe/edge/ref");
        assert_eq!(arena.find_symbol(""), Some(arena.builtins().empty));
    }

    #[test]
    fn test_fact_term_shape() {
        let mut arena = AstArena::new();
        let fact = Fact::edge(VName::with_signature("a"), "/kythe/edge/ref", VName::with_signature("b"));
        let term = arena.create_fact_term(&fact);

        assert_eq!(arena.app_verb(term), Some(arena.builtins().fact));
        let elements = arena.tuple_elements(term).unwrap();
        assert_eq!(elements.len(), 5);
        assert_eq!(arena.app_verb(elements[0]), Some(arena.builtins().vname));
        assert_eq!(
            arena.display(elements[2]).to_string(),
            r#"vname("b", "", "", "", "")"#
        );
    }

    #[test]
    fn test_node_fact_goal_expands_name() {
        let mut arena = AstArena::new();
        let var = arena.fresh_var();
        let source = arena.create_identifier(Span::default(), "X", var);
        let value = arena.create_atom(Span::default(), "record");
        let goal = arena.create_simple_node_fact(Span::default(), source, "node/kind", value);
        assert_eq!(
            arena.display(goal).to_string(),
            r#"fact(X, "", "", "/kythe/node/kind", "record")"#
        );
    }

    #[test]
    fn test_equality_display() {
        let mut arena = AstArena::new();
        let var = arena.fresh_var();
        let lhs = arena.create_identifier(Span::default(), "X", var);
        let rhs = arena.create_atom(Span::default(), "say \"hi\"");
        let goal = arena.create_equality_constraint(Span::default(), lhs, rhs);
        assert_eq!(arena.display(goal).to_string(), r#"X = "say \"hi\"""#);
    }

    #[test]
    fn test_span_display() {
        let span = Span::new(Position::new(3, 5), Position::new(3, 9));
        assert_eq!(span.to_string(), "3:5-9");
        let multiline = Span::new(Position::new(3, 5), Position::new(4, 2));
        assert_eq!(multiline.to_string(), "3:5");
    }
}
