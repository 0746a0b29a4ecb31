//! End-to-end analysis tests.
//!
//! The scenarios use textual event names and literal gate logic, and
//! check the minimal cut sets (and probabilities) of the whole pipeline.

use std::collections::BTreeSet;

use fta_rs::analysis::{Analysis, FaultTreeAnalysis};
use fta_rs::bdd::Bdd;
use fta_rs::graph::BooleanGraph;
use fta_rs::model::{FaultTree, Formula};
use fta_rs::preprocessor::Preprocessor;
use fta_rs::reference::Ref;
use fta_rs::settings::Settings;
use fta_rs::types::Operator;
use fta_rs::zbdd::Zbdd;

fn formula(operator: Operator, events: &[&str]) -> Formula {
    let mut f = Formula::new(operator);
    for event in events {
        f.add_event(*event).unwrap();
    }
    f
}

fn mcs(analysis: &Analysis) -> BTreeSet<BTreeSet<String>> {
    analysis.cut_sets().iter().cloned().collect()
}

fn expected(sets: &[&[&str]]) -> BTreeSet<BTreeSet<String>> {
    sets.iter()
        .map(|set| set.iter().map(|s| s.to_string()).collect())
        .collect()
}

// ─── Benchmark Scenarios ───────────────────────────────────────────────────────

/// The Theatre fault tree from OpenFTA: a backup generator and a relay
/// behind the mains supply.
fn theatre() -> FaultTree {
    let mut tree = FaultTree::new("theatre");
    tree.add_basic_event("mains_fail").unwrap();
    tree.add_basic_event("gen_fail").unwrap();
    tree.add_basic_event("relay_fail").unwrap();
    tree.set_probability("mains_fail", 0.1).unwrap();
    tree.set_probability("gen_fail", 0.02).unwrap();
    tree.set_probability("relay_fail", 7.0e-4).unwrap();
    tree.add_gate("no_gen_power", formula(Operator::And, &["mains_fail", "gen_fail"]))
        .unwrap();
    tree.add_gate("no_relay_power", formula(Operator::And, &["mains_fail", "relay_fail"]))
        .unwrap();
    tree.add_gate("no_power", formula(Operator::Or, &["no_gen_power", "no_relay_power"]))
        .unwrap();
    tree.set_top("no_power");
    tree
}

#[test]
fn theatre_minimal_cut_sets_and_probability() {
    let mut settings = Settings::default();
    settings.set_probability_analysis(true);
    let analysis = FaultTreeAnalysis::new(settings).analyze(&theatre()).unwrap();

    assert_eq!(analysis.num_cut_sets(), 2);
    assert_eq!(
        mcs(&analysis),
        expected(&[&["gen_fail", "mains_fail"], &["mains_fail", "relay_fail"]])
    );
    let p_total = analysis.p_total().unwrap();
    assert!((p_total - 0.00207).abs() < 1e-12, "p_total = {}", p_total);
}

#[test]
fn theatre_mcub_bound() {
    let mut settings = Settings::default();
    settings.set_probability_analysis(true);
    let analysis = FaultTreeAnalysis::new(settings).analyze(&theatre()).unwrap();

    let mcub = analysis.mcub_probability().unwrap();
    let rare = analysis.rare_event_probability().unwrap();
    // MCUB is never above the rare-event sum and both stay close here.
    assert!(mcub <= rare);
    assert!((mcub - rare).abs() < 1e-6);
}

// ─── Structural Scenarios ──────────────────────────────────────────────────────

#[test]
fn single_and() {
    let mut tree = FaultTree::new("single_and");
    tree.add_basic_event("a").unwrap();
    tree.add_basic_event("b").unwrap();
    tree.add_gate("top", formula(Operator::And, &["a", "b"])).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    assert_eq!(mcs(&analysis), expected(&[&["a", "b"]]));
}

#[test]
fn absorption() {
    // Top = OR(a, AND(a, b)) -> {{a}}.
    let mut tree = FaultTree::new("absorption");
    tree.add_basic_event("a").unwrap();
    tree.add_basic_event("b").unwrap();
    tree.add_gate("g1", formula(Operator::And, &["a", "b"])).unwrap();
    tree.add_gate("top", formula(Operator::Or, &["a", "g1"])).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    assert_eq!(mcs(&analysis), expected(&[&["a"]]));
}

#[test]
fn atleast_two_of_three() {
    let mut tree = FaultTree::new("atleast");
    for name in ["a", "b", "c"] {
        tree.add_basic_event(name).unwrap();
    }
    let mut top = formula(Operator::AtLeast, &["a", "b", "c"]);
    top.set_vote_number(2).unwrap();
    tree.add_gate("top", top).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    assert_eq!(
        mcs(&analysis),
        expected(&[&["a", "b"], &["a", "c"], &["b", "c"]])
    );
}

#[test]
fn multiple_definitions_merge() {
    // G1 = AND(a, b) and G2 = AND(b, a) are one definition.
    let mut tree = FaultTree::new("multi_def");
    tree.add_basic_event("a").unwrap();
    tree.add_basic_event("b").unwrap();
    tree.add_gate("g1", formula(Operator::And, &["a", "b"])).unwrap();
    tree.add_gate("g2", formula(Operator::And, &["b", "a"])).unwrap();
    tree.add_gate("top", formula(Operator::Or, &["g1", "g2"])).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    assert_eq!(mcs(&analysis), expected(&[&["a", "b"]]));
}

#[test]
fn xor_normalization_only() {
    // XOR inputs are rejected by the coherent analysis path; the
    // normalized graph still yields the singleton sets through the
    // decision diagrams directly.
    let mut tree = FaultTree::new("xor");
    tree.add_basic_event("a").unwrap();
    tree.add_basic_event("b").unwrap();
    tree.add_gate("top", formula(Operator::Xor, &["a", "b"])).unwrap();
    tree.set_top("top");
    assert!(FaultTreeAnalysis::new(Settings::default()).analyze(&tree).is_err());

    let mut graph = BooleanGraph::new();
    let a = graph.add_variable("a");
    let b = graph.add_variable("b");
    let top = graph.add_gate(Operator::Xor);
    graph.add_arg(top, Ref::positive(a));
    graph.add_arg(top, Ref::positive(b));
    graph.set_root(top);

    Preprocessor::new(&mut graph).process();
    let bdd = Bdd::from_graph(&graph);
    let mut zbdd = Zbdd::from_bdd(&bdd, &Settings::default());
    let mut sets = zbdd.analyze();
    sets.sort();
    // The coherent interpretation keeps only the positive literals.
    assert_eq!(sets, vec![vec![a], vec![b]]);
}

// ─── Properties ────────────────────────────────────────────────────────────────

#[test]
fn minimality() {
    // No returned cut set is a proper subset of another.
    let mut tree = FaultTree::new("minimality");
    for name in ["a", "b", "c", "d", "s"] {
        tree.add_basic_event(name).unwrap();
    }
    tree.add_gate("g1", formula(Operator::And, &["s", "a", "b"])).unwrap();
    tree.add_gate("g2", formula(Operator::And, &["s", "c"])).unwrap();
    tree.add_gate("g3", formula(Operator::And, &["c", "d"])).unwrap();
    tree.add_gate("top", formula(Operator::Or, &["g1", "g2", "g3", "s"])).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    let sets = analysis.cut_sets();
    for x in sets {
        for y in sets {
            if x != y {
                assert!(!x.is_subset(y), "{:?} subsumes {:?}", y, x);
            }
        }
    }
    assert_eq!(mcs(&analysis), expected(&[&["s"], &["c", "d"]]));
}

#[test]
fn invariant_under_declaration_order() {
    // The same tree declared in a different event order yields the same
    // cut sets (the variable ordering changes, the MCS do not).
    fn build(order: &[&str]) -> FaultTree {
        let mut tree = FaultTree::new("reorder");
        for name in order {
            tree.add_basic_event(*name).unwrap();
        }
        tree.add_gate("g1", formula(Operator::And, &["a", "b"])).unwrap();
        tree.add_gate("g2", formula(Operator::And, &["c", "d"])).unwrap();
        tree.add_gate("top", formula(Operator::Or, &["g1", "g2"])).unwrap();
        tree.set_top("top");
        tree
    }

    let forward = FaultTreeAnalysis::new(Settings::default())
        .analyze(&build(&["a", "b", "c", "d"]))
        .unwrap();
    let backward = FaultTreeAnalysis::new(Settings::default())
        .analyze(&build(&["d", "c", "b", "a"]))
        .unwrap();
    assert_eq!(mcs(&forward), mcs(&backward));
}

#[test]
fn atleast_equals_expanded_form() {
    // ATLEAST(2; a, b, c) == OR(AND(a,b), AND(a,c), AND(b,c)).
    let mut tree = FaultTree::new("atleast_direct");
    for name in ["a", "b", "c"] {
        tree.add_basic_event(name).unwrap();
    }
    let mut top = formula(Operator::AtLeast, &["a", "b", "c"]);
    top.set_vote_number(2).unwrap();
    tree.add_gate("top", top).unwrap();
    tree.set_top("top");

    let mut expanded = FaultTree::new("atleast_expanded");
    for name in ["a", "b", "c"] {
        expanded.add_basic_event(name).unwrap();
    }
    expanded.add_gate("g1", formula(Operator::And, &["a", "b"])).unwrap();
    expanded.add_gate("g2", formula(Operator::And, &["a", "c"])).unwrap();
    expanded.add_gate("g3", formula(Operator::And, &["b", "c"])).unwrap();
    expanded.add_gate("top", formula(Operator::Or, &["g1", "g2", "g3"])).unwrap();
    expanded.set_top("top");

    let direct = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    let via_or = FaultTreeAnalysis::new(Settings::default()).analyze(&expanded).unwrap();
    assert_eq!(mcs(&direct), mcs(&via_or));
}

#[test]
fn shared_subtree_with_modules() {
    // A deeper tree with shared logic across two branches.
    let mut tree = FaultTree::new("shared");
    for name in ["p1", "p2", "v1", "v2", "cc"] {
        tree.add_basic_event(name).unwrap();
    }
    tree.add_gate("train_a", formula(Operator::Or, &["p1", "cc"])).unwrap();
    tree.add_gate("train_b", formula(Operator::Or, &["p2", "cc"])).unwrap();
    tree.add_gate("pumps", formula(Operator::And, &["train_a", "train_b"])).unwrap();
    tree.add_gate("valves", formula(Operator::And, &["v1", "v2"])).unwrap();
    tree.add_gate("top", formula(Operator::Or, &["pumps", "valves"])).unwrap();
    tree.set_top("top");

    let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
    assert_eq!(
        mcs(&analysis),
        expected(&[&["cc"], &["p1", "p2"], &["v1", "v2"]])
    );
}

#[test]
fn cut_set_limit_drops_larger_sets() {
    let mut tree = FaultTree::new("limited");
    for name in ["a", "b", "c"] {
        tree.add_basic_event(name).unwrap();
    }
    tree.add_gate("g1", formula(Operator::And, &["a", "b", "c"])).unwrap();
    tree.add_gate("top", formula(Operator::Or, &["g1", "a"])).unwrap();
    tree.set_top("top");

    let mut settings = Settings::default();
    settings.set_cut_set_limit(2);
    let analysis = FaultTreeAnalysis::new(settings).analyze(&tree).unwrap();
    assert_eq!(mcs(&analysis), expected(&[&["a"]]));
}
