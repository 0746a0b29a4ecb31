//! # fta-rs: Fault-Tree Analysis in Rust
//!
//! **`fta-rs`** is a probabilistic risk-analysis engine. It reads fault-tree
//! models expressed as Boolean logic over named events and computes
//! **minimal cut sets (MCS)** --- the minimal combinations of basic-event
//! failures that cause the top event to occur.
//!
//! ## How it works
//!
//! The analysis pipeline has two tightly coupled halves:
//!
//! 1. An **indexed Boolean-graph preprocessor** rewrites the fault-tree
//!    formula into a normalized (AND/OR), structurally simplified, modular
//!    graph: constants are propagated, NAND/NOR/XOR/ATLEAST logic is
//!    expanded, complements are pushed out, duplicate definitions are
//!    merged, common nodes are optimized, gates are coalesced, and
//!    independent sub-trees are detected as modules.
//! 2. A **decision-diagram engine** converts the preprocessed graph into a
//!    Reduced Ordered BDD with attributed edges, then into a
//!    **Zero-Suppressed BDD** over which minimal cut sets are canonical:
//!    subsumed sets are removed and the survivors enumerated.
//!
//! ## Quick Start
//!
//! ```rust
//! use fta_rs::analysis::FaultTreeAnalysis;
//! use fta_rs::model::{FaultTree, Formula};
//! use fta_rs::settings::Settings;
//! use fta_rs::types::Operator;
//!
//! // Top = OR(AND(mains, gen), AND(mains, relay))
//! let mut tree = FaultTree::new("power");
//! tree.add_basic_event("mains").unwrap();
//! tree.add_basic_event("gen").unwrap();
//! tree.add_basic_event("relay").unwrap();
//! for (name, args) in [("g1", ["mains", "gen"]), ("g2", ["mains", "relay"])] {
//!     let mut f = Formula::new(Operator::And);
//!     for arg in args {
//!         f.add_event(arg).unwrap();
//!     }
//!     tree.add_gate(name, f).unwrap();
//! }
//! let mut top = Formula::new(Operator::Or);
//! top.add_event("g1").unwrap();
//! top.add_event("g2").unwrap();
//! tree.add_gate("top", top).unwrap();
//! tree.set_top("top");
//!
//! let analysis = FaultTreeAnalysis::new(Settings::default())
//!     .analyze(&tree)
//!     .unwrap();
//! assert_eq!(analysis.num_cut_sets(), 2); // {mains, gen}, {mains, relay}
//! ```
//!
//! ## Core Components
//!
//! - **[`model`]**: The validated in-memory fault tree (events, formulas,
//!   well-formedness and cycle checks).
//! - **[`graph`]**: The indexed Boolean graph with signed argument edges
//!   and weak parent back-links.
//! - **[`preprocessor`]**: The rewriting pipeline over the graph.
//! - **[`bdd`]** / **[`zbdd`]**: The decision-diagram engines.
//! - **[`analysis`]**: The driver tying everything together and the
//!   cut-set sink with probability figures.
//!
//! The engine is single-threaded and synchronous; a graph or diagram
//! manager serves one analysis at a time.

pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod error;
pub mod graph;
pub mod model;
pub mod preprocessor;
pub mod reference;
pub mod settings;
pub mod storage;
pub mod types;
pub mod utils;
pub mod zbdd;
