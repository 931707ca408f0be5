//! Unification with a trailed binding environment
//!
//! Bindings are stored by [`VarId`], never in the AST. Every binding is
//! pushed on the trail so a search branch can be undone by truncating back
//! to a [`Mark`]. A failed [`unify`] call undoes its own partial bindings
//! before returning, so callers only ever see all-or-nothing.

use crate::ast::{AstArena, AstNode, Bindings, NodeDisplay, NodeId, VarId};
use tracing::trace;

/// Position in the trail to undo back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Variable bindings plus the undo log
#[derive(Debug, Default, Clone)]
pub struct Environment {
    bindings: Vec<Option<NodeId>>,
    trail: Vec<VarId>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for `var_count` variables
    pub fn with_capacity(var_count: usize) -> Self {
        Self {
            bindings: vec![None; var_count],
            trail: Vec::new(),
        }
    }

    pub fn mark(&self) -> Mark {
        Mark(self.trail.len())
    }

    /// Drop every binding made after `mark`
    pub fn undo_to(&mut self, mark: Mark) {
        while self.trail.len() > mark.0 {
            if let Some(var) = self.trail.pop() {
                self.bindings[var.index()] = None;
            }
        }
    }

    /// Number of bindings on the trail, which is the number of bound variables
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub fn lookup(&self, var: VarId) -> Option<NodeId> {
        self.bindings.get(var.index()).copied().flatten()
    }

    /// Bind an unbound variable. Rebinding is a logic error.
    pub fn bind(&mut self, var: VarId, term: NodeId) {
        let index = var.index();
        if index >= self.bindings.len() {
            self.bindings.resize(index + 1, None);
        }
        debug_assert!(self.bindings[index].is_none(), "variable bound twice");
        self.bindings[index] = Some(term);
        self.trail.push(var);
    }

    /// Follow variable bindings until reaching an unbound variable or a non-variable
    pub fn resolve(&self, arena: &AstArena, mut node: NodeId) -> NodeId {
        while let AstNode::Identifier { var, .. } = arena.get(node) {
            match self.lookup(*var) {
                Some(bound) => node = bound,
                None => break,
            }
        }
        node
    }

    /// True when `node` contains no unbound variables or don't-cares
    pub fn is_ground(&self, arena: &AstArena, node: NodeId) -> bool {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match arena.get(self.resolve(arena, node)) {
                AstNode::Atom { .. } => {}
                AstNode::Identifier { .. } | AstNode::DontCare { .. } => return false,
                AstNode::Tuple { elements, .. } => stack.extend(elements.iter().copied()),
                AstNode::App { verb, args, .. } => {
                    stack.push(*verb);
                    stack.push(*args);
                }
            }
        }
        true
    }

    /// Render `node` with bindings substituted
    pub fn display<'a>(&'a self, arena: &'a AstArena, node: NodeId) -> NodeDisplay<'a, Self> {
        arena.display_with(node, self)
    }
}

impl Bindings for Environment {
    fn lookup(&self, var: VarId) -> Option<NodeId> {
        Environment::lookup(self, var)
    }
}

/// Does `var` occur in `node` under the current bindings?
fn occurs(arena: &AstArena, env: &Environment, var: VarId, node: NodeId) -> bool {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        match arena.get(env.resolve(arena, node)) {
            AstNode::Identifier { var: other, .. } if *other == var => return true,
            AstNode::Tuple { elements, .. } => stack.extend(elements.iter().copied()),
            AstNode::App { verb, args, .. } => {
                stack.push(*verb);
                stack.push(*args);
            }
            _ => {}
        }
    }
    false
}

/// Unify `a` and `b`, extending `env`.
///
/// Returns false and leaves `env` exactly as it was when the terms do not
/// unify, including when a binding would make a term contain itself.
pub fn unify(arena: &AstArena, env: &mut Environment, a: NodeId, b: NodeId) -> bool {
    let mark = env.mark();
    if unify_pairs(arena, env, a, b) {
        true
    } else {
        env.undo_to(mark);
        false
    }
}

fn unify_pairs(arena: &AstArena, env: &mut Environment, a: NodeId, b: NodeId) -> bool {
    let mut pending = vec![(a, b)];
    while let Some((a, b)) = pending.pop() {
        let a = env.resolve(arena, a);
        let b = env.resolve(arena, b);
        if a == b {
            continue;
        }
        match (arena.get(a), arena.get(b)) {
            (AstNode::DontCare { .. }, _) | (_, AstNode::DontCare { .. }) => {}
            (AstNode::Identifier { var: va, .. }, AstNode::Identifier { var: vb, .. }) => {
                if va != vb {
                    env.bind(*va, b);
                }
            }
            (AstNode::Identifier { var, .. }, _) => {
                if occurs(arena, env, *var, b) {
                    trace!("recursive binding rejected");
                    return false;
                }
                env.bind(*var, b);
            }
            (_, AstNode::Identifier { var, .. }) => {
                if occurs(arena, env, *var, a) {
                    trace!("recursive binding rejected");
                    return false;
                }
                env.bind(*var, a);
            }
            (AstNode::Atom { symbol: sa, .. }, AstNode::Atom { symbol: sb, .. }) => {
                if sa != sb {
                    return false;
                }
            }
            (AstNode::Tuple { elements: ea, .. }, AstNode::Tuple { elements: eb, .. }) => {
                if ea.len() != eb.len() {
                    return false;
                }
                pending.extend(ea.iter().copied().zip(eb.iter().copied()).rev());
            }
            (
                AstNode::App { verb: fa, args: xa, .. },
                AstNode::App { verb: fb, args: xb, .. },
            ) => {
                pending.push((*xa, *xb));
                pending.push((*fa, *fb));
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn atom(arena: &mut AstArena, text: &str) -> NodeId {
        arena.create_atom(Span::default(), text)
    }

    fn var(arena: &mut AstArena, name: &str) -> (VarId, NodeId) {
        let var = arena.fresh_var();
        (var, arena.create_identifier(Span::default(), name, var))
    }

    fn pair(arena: &mut AstArena, a: NodeId, b: NodeId) -> NodeId {
        arena.create_tuple(Span::default(), vec![a, b])
    }

    #[test]
    fn test_atoms_unify_by_symbol() {
        let mut arena = AstArena::new();
        let a = atom(&mut arena, "x");
        let b = atom(&mut arena, "x");
        let c = atom(&mut arena, "y");
        let mut env = Environment::new();
        assert!(unify(&arena, &mut env, a, b));
        assert!(!unify(&arena, &mut env, a, c));
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_ground_self_unify_leaves_trail() {
        let mut arena = AstArena::new();
        let a = atom(&mut arena, "a");
        let b = atom(&mut arena, "b");
        let t = pair(&mut arena, a, b);
        let mut env = Environment::new();
        assert!(unify(&arena, &mut env, t, t));
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_variable_binding_and_undo() {
        let mut arena = AstArena::new();
        let (x, xn) = var(&mut arena, "X");
        let a = atom(&mut arena, "a");
        let mut env = Environment::new();

        let mark = env.mark();
        assert!(unify(&arena, &mut env, xn, a));
        assert_eq!(env.lookup(x), Some(a));
        assert_eq!(env.display(&arena, xn).to_string(), "\"a\"");

        env.undo_to(mark);
        assert_eq!(env.lookup(x), None);
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_partial_tuple_failure_rolls_back() {
        let mut arena = AstArena::new();
        let (x, xn) = var(&mut arena, "X");
        let a = atom(&mut arena, "a");
        let b = atom(&mut arena, "b");
        let c = atom(&mut arena, "c");
        let lhs = pair(&mut arena, xn, b);
        let rhs = pair(&mut arena, a, c);
        let mut env = Environment::new();
        assert!(!unify(&arena, &mut env, lhs, rhs));
        assert_eq!(env.lookup(x), None);
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_dont_care_binds_nothing() {
        let mut arena = AstArena::new();
        let d = arena.create_dont_care(Span::default());
        let a = atom(&mut arena, "a");
        let mut env = Environment::new();
        assert!(unify(&arena, &mut env, d, a));
        assert!(unify(&arena, &mut env, a, d));
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_occurs_check() {
        let mut arena = AstArena::new();
        let (x, xn) = var(&mut arena, "X");
        let a = atom(&mut arena, "a");
        let t = pair(&mut arena, xn, a);
        let mut env = Environment::new();
        assert!(!unify(&arena, &mut env, xn, t));
        assert_eq!(env.lookup(x), None);
    }

    #[test]
    fn test_variable_self_unify() {
        let mut arena = AstArena::new();
        let (x, xn) = var(&mut arena, "X");
        let again = arena.create_identifier(Span::default(), "X", x);
        let mut env = Environment::new();
        assert!(unify(&arena, &mut env, xn, again));
        assert_eq!(env.trail_len(), 0);
    }

    #[test]
    fn test_app_requires_equal_verbs() {
        let mut arena = AstArena::new();
        let f = atom(&mut arena, "f");
        let g = atom(&mut arena, "g");
        let a = atom(&mut arena, "a");
        let args = arena.create_tuple(Span::default(), vec![a]);
        let fa = arena.create_app(Span::default(), f, args);
        let ga = arena.create_app(Span::default(), g, args);
        let (_, xn) = var(&mut arena, "X");
        let xargs = arena.create_tuple(Span::default(), vec![xn]);
        let fx = arena.create_app(Span::default(), f, xargs);

        let mut env = Environment::new();
        assert!(!unify(&arena, &mut env, fa, ga));
        assert!(unify(&arena, &mut env, fa, fx));
        assert!(env.is_ground(&arena, fx));
    }
}
