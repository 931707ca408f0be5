use kverify::ast::Span;
use kverify::fact::{ANCHOR_END_FACT, ANCHOR_KIND, ANCHOR_START_FACT, NODE_KIND_FACT};
use kverify::session::LoadStats;
use kverify::storage::{encode_delimited, FactStore};
use kverify::{unify, AstArena, Environment, Error, Fact, RuleFormat, VName, VerificationSession};

fn vname(signature: &str) -> VName {
    VName::with_signature(signature)
}

fn ref_edge(source: &str, target: &str) -> Fact {
    Fact::edge(vname(source), "/kythe/edge/ref", vname(target))
}

fn session_with(facts: &[Fact]) -> VerificationSession {
    let mut session = VerificationSession::new();
    for (index, fact) in facts.iter().enumerate() {
        session.assert_single_fact(index, fact.clone());
    }
    session
}

fn verify(facts: &[Fact], rules: &str) -> VerificationSession {
    let mut session = session_with(facts);
    session.load_rule_text("rules", rules, RuleFormat::Plain).unwrap();
    session.verify_all_goals();
    session
}

#[test]
fn duplicate_fact_leaves_cardinality_unchanged() {
    let mut session = VerificationSession::new();
    session.ignore_duplicate_facts();
    session.assert_single_fact(0, ref_edge("a", "b"));
    assert_eq!(session.database().len(), 1);
    session.assert_single_fact(1, ref_edge("a", "b"));
    assert_eq!(session.database().len(), 1);

    // Without the policy both copies are kept.
    let session = session_with(&[ref_edge("a", "b"), ref_edge("a", "b")]);
    assert_eq!(session.database().len(), 2);
}

#[test]
fn ground_self_unification_keeps_trail() {
    let mut arena = AstArena::new();
    let term = arena.create_fact_term(&ref_edge("a", "b"));
    let mut env = Environment::new();
    let before = env.trail_len();
    assert!(unify(&arena, &mut env, term, term));
    assert_eq!(env.trail_len(), before);
    assert_eq!(before, 0);
}

#[test]
fn bind_then_undo_restores_environment() {
    let mut arena = AstArena::new();
    let x = arena.fresh_var();
    let y = arena.fresh_var();
    let span = Span::default();
    let xs = arena.create_identifier(span, "X", x);
    let ys = arena.create_identifier(span, "Y", y);
    let a = arena.create_atom(span, "a");
    let b = arena.create_atom(span, "b");
    let left = arena.create_tuple(span, vec![xs, ys]);
    let right = arena.create_tuple(span, vec![a, b]);

    let mut env = Environment::with_capacity(arena.var_count());
    let mark = env.mark();
    assert!(unify(&arena, &mut env, left, right));
    assert_eq!(env.trail_len(), 2);
    assert_eq!(env.lookup(x), Some(a));

    env.undo_to(mark);
    assert_eq!(env.trail_len(), 0);
    assert_eq!(env.lookup(x), None);
    assert_eq!(env.lookup(y), None);
}

#[test]
fn first_unsatisfiable_goal_sets_highest_goal() {
    let session = verify(&[ref_edge("a", "b"), ref_edge("b", "c")], "X ref Y\nY ref Z\nZ ref W\nW ref V");
    // The third goal (1-indexed) can never hold.
    assert_eq!(session.highest_goal_reached(), 2);
    assert!(!session.outcomes()[0].is_satisfied());

    let session = verify(&[ref_edge("a", "b"), ref_edge("b", "c")], "X ref Y\nY ref Z");
    assert!(session.outcomes()[0].is_satisfied());
    assert_eq!(session.highest_goal_reached(), 2);
}

#[test]
fn source_is_found_from_target_through_any_edge() {
    let node1 = VName::new("node1", "", "", "", "");
    let facts = [
        Fact::node(node1.clone(), NODE_KIND_FACT, "record"),
        Fact::edge(node1, "/kythe/edge/ref", VName::new("node2", "", "", "", "")),
    ];
    let session = verify(&facts, r#"X? _ vname("node2", "", "", "", "")"#);
    assert!(session.outcomes()[0].is_satisfied());

    let inspection = &session.outcomes()[0].inspections[0];
    assert_eq!(inspection.label, "X");
    assert_eq!(inspection.value, r#"vname("node1", "", "", "", "")"#);

    let session = verify(&facts, r#"X _ vname("node3", "", "", "", "")"#);
    assert!(!session.outcomes()[0].is_satisfied());
}

#[test]
fn edges_do_not_chain_transitively() {
    let facts = [ref_edge("A", "B"), ref_edge("B", "C")];
    let a = r#"vname("A", "", "", "", "")"#;
    let b = r#"vname("B", "", "", "", "")"#;
    let c = r#"vname("C", "", "", "", "")"#;

    let chain = verify(&facts, &format!("{a} ref {b}\n{b} ref {c}"));
    assert!(chain.outcomes()[0].is_satisfied());

    let direct = verify(&facts, &format!("{a} ref {c}"));
    assert!(!direct.outcomes()[0].is_satisfied());
    assert_eq!(direct.highest_goal_reached(), 0);
}

#[test]
fn unbound_self_equality_holds() {
    let mut session = VerificationSession::new();
    session.load_rule_text("rules", "X = X", RuleFormat::Plain).unwrap();
    assert!(session.verify_all_goals());
    assert_eq!(session.highest_goal_reached(), 1);
}

#[test]
fn malformed_store_key_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FactStore::open(&dir.path().join("facts.db")).unwrap();
    store.begin_transaction().unwrap();
    store.put_fact(&ref_edge("a", "b")).unwrap();
    store.put_entry(b"missing the separators", b"").unwrap();
    store
        .put_fact(&Fact::node(vname("a"), NODE_KIND_FACT, "record"))
        .unwrap();
    store.commit().unwrap();

    let mut session = VerificationSession::new();
    session.load_rule_text("rules", "X.node/kind record\nX ref Y", RuleFormat::Plain).unwrap();
    let stats = session.load_store(&store, |_, _| {}).unwrap();
    assert_eq!(
        stats,
        LoadStats {
            records: 3,
            accepted: 2,
            duplicates_ignored: 0,
            skipped: 1,
        }
    );
    assert_eq!(session.database().len(), 2);
    assert!(session.verify_all_goals());
}

#[test]
fn undecodable_stream_record_is_skipped() {
    let mut bytes = vec![2u8, 0x08, 0xff];
    encode_delimited(&ref_edge("a", "b"), &mut bytes);
    encode_delimited(&Fact::node(vname("b"), NODE_KIND_FACT, "record"), &mut bytes);

    let mut session = VerificationSession::new();
    let mut seen = Vec::new();
    let stats = session
        .load_stream(&bytes[..], |index, fact| seen.push((index, fact.clone())))
        .unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.accepted, 2);
    assert_eq!(seen[0], (1, ref_edge("a", "b")));

    session.load_rule_text("rules", "X ref Y\nY.node/kind record", RuleFormat::Plain).unwrap();
    assert!(session.verify_all_goals());
}

#[test]
fn truncated_stream_is_fatal() {
    let mut bytes = Vec::new();
    encode_delimited(&ref_edge("a", "b"), &mut bytes);
    bytes.extend([40u8, 1]);

    let mut session = VerificationSession::new();
    let err = session.load_stream(&bytes[..], |_, _| {}).unwrap_err();
    assert!(matches!(err, Error::Record(_)), "{err}");
}

#[test]
fn inline_rule_file_resolves_anchors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foo.cc");
    std::fs::write(&path, "//- @foo defines/binding X\nint foo;\n").unwrap();

    let anchor = vname("anchor0");
    let facts = [
        Fact::node(anchor.clone(), NODE_KIND_FACT, ANCHOR_KIND),
        Fact::node(anchor.clone(), ANCHOR_START_FACT, "31"),
        Fact::node(anchor.clone(), ANCHOR_END_FACT, "34"),
        Fact::edge(anchor, "/kythe/edge/defines/binding", vname("foo")),
    ];
    let mut session = session_with(&facts);
    let group = session.load_rule_file(&path, RuleFormat::Detect).unwrap();
    assert_eq!(group.len(), 4);
    assert!(session.verify_all_goals());

    // Moving the token breaks the anchor offsets.
    std::fs::write(&path, "//- @foo defines/binding X\nint  foo;\n").unwrap();
    let mut session = session_with(&facts);
    session.load_rule_file(&path, RuleFormat::Detect).unwrap();
    assert!(!session.verify_all_goals());
    assert_eq!(session.highest_goal_reached(), 1);
}

#[test]
fn missing_rule_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = VerificationSession::new();
    let err = session
        .load_rule_file(&dir.path().join("absent.txt"), RuleFormat::Plain)
        .unwrap_err();
    assert!(matches!(err, Error::ReadRules { .. }));
}

#[test]
fn source_file_without_rules_has_no_goals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.cc");
    std::fs::write(&path, "int foo;\nint bar;\n").unwrap();

    let mut session = session_with(&[ref_edge("a", "b")]);
    let group = session.load_rule_file(&path, RuleFormat::Detect).unwrap();
    assert!(group.is_empty());
    assert!(session.verify_all_goals());
    assert_eq!(session.goal_count(), 0);
}
