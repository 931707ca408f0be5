//! Goal solver - ordered depth-first search over the fact database
//!
//! A goal list is a conjunction. Goals are tried left to right; for a fact
//! goal every candidate fact is unified in turn and the search recurses into
//! the remaining goals, undoing the environment to the branch point before
//! moving to the next candidate. Equality goals unify their two sides
//! directly.
//!
//! The database is static during solving and no facts are derived, so the
//! search always terminates.

use crate::ast::{AstArena, NodeId, Span};
use crate::database::FactDatabase;
use crate::unify::{Environment, unify};
use std::ops::ControlFlow;
use tracing::{debug, trace};

/// Lifecycle of one solve call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalState {
    #[default]
    Pending,
    Searching,
    Satisfied,
    Exhausted,
}

/// A variable the rules asked to have reported (`X?`)
#[derive(Debug, Clone)]
pub struct Inspection {
    /// Text shown for the variable
    pub label: String,
    /// Node whose resolved value gets reported
    pub node: NodeId,
    pub span: Span,
}

/// One conjunction of goals sharing a variable scope
#[derive(Debug, Clone, Default)]
pub struct GoalGroup {
    /// Where the goals came from (usually a rule file path)
    pub name: String,
    pub goals: Vec<NodeId>,
    pub inspections: Vec<Inspection>,
}

impl GoalGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

/// Bindings of one solution
#[derive(Debug, Clone)]
pub struct Solution {
    env: Environment,
}

impl Solution {
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Render `node` with this solution's bindings applied
    pub fn render(&self, arena: &AstArena, node: NodeId) -> String {
        self.env.display(arena, node).to_string()
    }
}

/// Resolved value of an inspection in a satisfied group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionResult {
    pub label: String,
    pub value: String,
    pub span: Span,
}

/// Result of solving one goal group
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub state: GoalState,
    /// 0-based index of the deepest goal attempted; the goal count when satisfied
    pub highest_goal_reached: usize,
    pub inspections: Vec<InspectionResult>,
}

impl GroupOutcome {
    pub fn is_satisfied(&self) -> bool {
        self.state == GoalState::Satisfied
    }
}

enum GoalShape {
    Fact { source: NodeId, edge_kind: NodeId },
    Equality { lhs: NodeId, rhs: NodeId },
}

/// Depth-first solver over one arena and fact database
pub struct Solver<'a> {
    arena: &'a AstArena,
    database: &'a FactDatabase,
    env: Environment,
    state: GoalState,
    highest_goal_reached: usize,
    unifications: usize,
}

impl<'a> Solver<'a> {
    pub fn new(arena: &'a AstArena, database: &'a FactDatabase) -> Self {
        Self {
            arena,
            database,
            env: Environment::with_capacity(arena.var_count()),
            state: GoalState::Pending,
            highest_goal_reached: 0,
            unifications: 0,
        }
    }

    pub fn state(&self) -> GoalState {
        self.state
    }

    /// Deepest goal index attempted by the last solve call
    pub fn highest_goal_reached(&self) -> usize {
        self.highest_goal_reached
    }

    /// Number of unifications attempted against facts and equalities
    pub fn unifications(&self) -> usize {
        self.unifications
    }

    /// Call `on_solution` for every solution of `goals`, until it breaks.
    ///
    /// The environment passed to the callback is only valid for the call;
    /// it is unwound before the search continues.
    pub fn for_each_solution<F>(&mut self, goals: &[NodeId], mut on_solution: F) -> ControlFlow<()>
    where
        F: FnMut(&Environment) -> ControlFlow<()>,
    {
        self.state = GoalState::Searching;
        self.highest_goal_reached = 0;

        let mut found = false;
        let flow = self.search(goals, 0, &mut |env| {
            found = true;
            on_solution(env)
        });

        self.state = if found {
            GoalState::Satisfied
        } else {
            GoalState::Exhausted
        };
        flow
    }

    /// First solution of `goals`, if any
    pub fn solve_first(&mut self, goals: &[NodeId]) -> Option<Solution> {
        let mut first = None;
        let _ = self.for_each_solution(goals, |env| {
            first = Some(Solution { env: env.clone() });
            ControlFlow::Break(())
        });
        first
    }

    /// Up to `limit` solutions of `goals`, in search order
    pub fn solutions(&mut self, goals: &[NodeId], limit: usize) -> Vec<Solution> {
        let mut solutions = Vec::new();
        if limit == 0 {
            return solutions;
        }
        let _ = self.for_each_solution(goals, |env| {
            solutions.push(Solution { env: env.clone() });
            if solutions.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        solutions
    }

    /// Solve a group for its first solution and report its inspections
    pub fn solve_group(&mut self, group: &GoalGroup) -> GroupOutcome {
        let solution = self.solve_first(&group.goals);
        debug!(
            group = %group.name,
            goals = group.len(),
            satisfied = solution.is_some(),
            highest_goal_reached = self.highest_goal_reached,
            unifications = self.unifications,
            "Solved goal group"
        );

        let inspections = match &solution {
            Some(solution) => group
                .inspections
                .iter()
                .map(|inspection| InspectionResult {
                    label: inspection.label.clone(),
                    value: solution.render(self.arena, inspection.node),
                    span: inspection.span,
                })
                .collect(),
            None => Vec::new(),
        };

        GroupOutcome {
            state: self.state,
            highest_goal_reached: self.highest_goal_reached,
            inspections,
        }
    }

    fn search(
        &mut self,
        goals: &[NodeId],
        index: usize,
        on_solution: &mut dyn FnMut(&Environment) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        self.highest_goal_reached = self.highest_goal_reached.max(index);
        let Some(&goal) = goals.get(index) else {
            return on_solution(&self.env);
        };

        let arena = self.arena;
        let database = self.database;
        match classify(arena, goal) {
            GoalShape::Equality { lhs, rhs } => {
                self.unifications += 1;
                let mark = self.env.mark();
                if unify(arena, &mut self.env, lhs, rhs) {
                    let flow = self.search(goals, index + 1, on_solution);
                    self.env.undo_to(mark);
                    if flow.is_break() {
                        return flow;
                    }
                }
            }
            GoalShape::Fact { source, edge_kind } => {
                let candidates = database.facts_matching(arena, &self.env, source, edge_kind);
                trace!(goal = index, indexed = candidates.is_indexed(), "Matching facts");
                for candidate in candidates {
                    self.unifications += 1;
                    let mark = self.env.mark();
                    if unify(arena, &mut self.env, goal, candidate.term) {
                        let flow = self.search(goals, index + 1, on_solution);
                        self.env.undo_to(mark);
                        if flow.is_break() {
                            return flow;
                        }
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Goals are only ever `fact(...)` with five arguments or `=(lhs, rhs)`.
/// Anything else means a builder produced a malformed goal.
fn classify(arena: &AstArena, goal: NodeId) -> GoalShape {
    let builtins = arena.builtins();
    let verb = arena.app_verb(goal);
    match (verb, arena.tuple_elements(goal)) {
        (Some(verb), Some(&[source, edge_kind, _, _, _])) if verb == builtins.fact => {
            GoalShape::Fact { source, edge_kind }
        }
        (Some(verb), Some(&[lhs, rhs])) if verb == builtins.equals => GoalShape::Equality { lhs, rhs },
        _ => panic!("malformed goal node: {}", arena.display(goal)),
    }
}
