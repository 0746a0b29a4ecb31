//! Zero-Suppressed BDD engine for minimal cut sets.
//!
//! A ZBDD represents a family of sets: `SetNode(v, H, L)` denotes
//! `{ {v} U s : s in sets(H) } U sets(L)` with two terminals, **Base**
//! (the family containing the empty set) and **Empty** (no sets). The
//! zero-suppression rule collapses any node with an Empty high branch
//! into its low branch, which keeps sparse families compact.
//!
//! The engine converts a BDD (or a preprocessed Boolean graph directly)
//! into a ZBDD, removes non-minimal sets with the subsume operation, and
//! enumerates the remaining sets. Module proxies are recursed into their
//! own ZBDDs and expanded during enumeration.
//!
//! The analysis assumes a coherent fault tree: inner families never
//! contain the empty set, which the subsume terminal cases rely on.

use std::collections::HashMap;

use log::debug;

use crate::bdd::Bdd;
use crate::cache::Cache;
use crate::graph::BooleanGraph;
use crate::reference::Ref;
use crate::settings::Settings;
use crate::storage::Storage;
use crate::types::{Operator, State};
use crate::utils::{pairing3, MyHash};

/// A reference to a ZBDD vertex: a plain index, no complement edges.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SetId(u32);

impl SetId {
    const fn new(index: u32) -> Self {
        SetId(index)
    }
    const fn index(self) -> usize {
        self.0 as usize
    }
    const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            1 => write!(f, "empty"),
            2 => write!(f, "base"),
            _ => write!(f, "#{}", self.0),
        }
    }
}

/// A non-terminal ZBDD vertex.
///
/// `index` is the Boolean-graph index of the variable (or module gate for
/// proxies); `order` drives all variable comparisons. The unique table is
/// keyed by the `(index, high, low)` triplet.
#[derive(Debug, Copy, Clone)]
pub struct SetNode {
    pub index: u32,
    pub order: u32,
    pub module: bool,
    pub high: SetId,
    pub low: SetId,
}

impl MyHash for SetNode {
    fn hash(&self) -> u64 {
        pairing3(self.index as u64, self.high.raw() as u64, self.low.raw() as u64)
    }
}

impl PartialEq for SetNode {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.high == other.high && self.low == other.low
    }
}

impl Eq for SetNode {}

/// The ZBDD manager: unique table, computed tables, and module graphs.
pub struct Zbdd {
    storage: Storage<SetNode>,
    empty: SetId,
    base: SetId,
    /// Results of Apply, keyed by `(op, min(id), max(id))`.
    compute_table: Cache<(u64, u64, u64), SetId>,
    /// Results of subsume operations over sets.
    subsume_table: Cache<(u64, u64), SetId>,
    /// Memorized minimal forms.
    minimal_results: HashMap<SetId, SetId>,
    /// Converted BDD functions with their limit order.
    ites: HashMap<(Ref, i32), SetId>,
    /// Processed Boolean-graph gates (direct-conversion path).
    gates: HashMap<u32, SetId>,
    /// Module graphs by module index.
    modules: HashMap<u32, SetId>,
    /// Enumerated families per vertex.
    cut_sets_cache: HashMap<SetId, Vec<Vec<u32>>>,
    /// Set-count cache.
    count_cache: HashMap<SetId, u64>,
    /// Maximum set cardinality; sets above it are pruned.
    limit_order: i32,
    root: SetId,
}

impl Zbdd {
    const STORAGE_BITS: usize = 18;
    const CACHE_BITS: usize = 16;

    fn with_settings(settings: &Settings) -> Self {
        let mut storage = Storage::new(Self::STORAGE_BITS);
        let empty = SetId::new(storage.alloc() as u32);
        let base = SetId::new(storage.alloc() as u32);
        debug_assert_eq!(empty, SetId::new(1));
        debug_assert_eq!(base, SetId::new(2));

        let limit_order = if settings.cut_set_limit() == 0 {
            i32::MAX
        } else {
            settings.cut_set_limit() as i32
        };

        Self {
            storage,
            empty,
            base,
            compute_table: Cache::new(Self::CACHE_BITS),
            subsume_table: Cache::new(Self::CACHE_BITS),
            minimal_results: HashMap::new(),
            ites: HashMap::new(),
            gates: HashMap::new(),
            modules: HashMap::new(),
            cut_sets_cache: HashMap::new(),
            count_cache: HashMap::new(),
            limit_order,
            root: base,
        }
    }

    /// Converts a Reduced Ordered BDD into a ZBDD.
    pub fn from_bdd(bdd: &Bdd, settings: &Settings) -> Self {
        let mut zbdd = Self::with_settings(settings);
        let limit = zbdd.limit_order;
        zbdd.root = zbdd.convert_bdd(bdd, bdd.root(), false, limit);
        debug!("ZBDD from BDD: {} vertices", zbdd.storage.real_size());
        zbdd
    }

    /// Builds a ZBDD directly from a preprocessed coherent Boolean graph.
    pub fn from_graph(graph: &BooleanGraph, settings: &Settings) -> Self {
        let mut zbdd = Self::with_settings(settings);
        let root_gate = graph.root();
        zbdd.root = match graph.gate(root_gate).state() {
            State::Null => zbdd.empty,
            State::Unity => zbdd.base,
            State::Normal => zbdd.convert_graph_gate(graph, root_gate),
        };
        debug!("ZBDD from graph: {} vertices", zbdd.storage.real_size());
        zbdd
    }

    pub fn root(&self) -> SetId {
        self.root
    }
    pub fn base(&self) -> SetId {
        self.base
    }
    pub fn empty(&self) -> SetId {
        self.empty
    }
    pub fn is_terminal(&self, id: SetId) -> bool {
        id == self.base || id == self.empty
    }

    fn node(&self, id: SetId) -> SetNode {
        debug_assert!(!self.is_terminal(id));
        self.storage.value(id.index())
    }

    /// Finds or creates the vertex `(index, high, low)`, applying
    /// zero-suppression.
    fn mk_node(&mut self, index: u32, order: u32, module: bool, high: SetId, low: SetId) -> SetId {
        if high == self.empty {
            return low; // Zero-suppression.
        }
        let i = self.storage.put(SetNode {
            index,
            order,
            module,
            high,
            low,
        });
        SetId::new(i as u32)
    }
}

// Conversion from the BDD.
impl Zbdd {
    /// Recursive descent over the ROBDD with attributed edges.
    ///
    /// `limit_order` bounds the cardinality of the represented sets: once
    /// it reaches zero, the remaining subgraph is pruned to Empty.
    fn convert_bdd(&mut self, bdd: &Bdd, node: Ref, complement: bool, limit_order: i32) -> SetId {
        let complement = complement ^ node.is_negated();
        if bdd.is_terminal(node) {
            return if complement { self.empty } else { self.base };
        }
        let key = (Ref::new(node.index(), complement), limit_order);
        if let Some(&result) = self.ites.get(&key) {
            return result;
        }
        if limit_order <= 0 {
            return self.empty; // Cut-off on set cardinality.
        }

        let ite = bdd.ite(node);
        if ite.module && !self.modules.contains_key(&ite.index) {
            // Modules get their own set graphs with the full limit.
            self.modules.insert(ite.index, self.base); // Break recursion.
            let limit = self.limit_order;
            let converted = self.convert_bdd(bdd, bdd.module(ite.index), false, limit);
            self.modules.insert(ite.index, converted);
        }

        let high = self.convert_bdd(bdd, ite.high, complement, limit_order - 1);
        let low = self.convert_bdd(bdd, ite.low, complement, limit_order);
        let result = self.mk_node(ite.index, ite.order, ite.module, high, low);

        self.ites.insert(key, result);
        result
    }
}

// Direct conversion from the Boolean graph.
impl Zbdd {
    fn convert_graph_gate(&mut self, graph: &BooleanGraph, gate: u32) -> SetId {
        if let Some(&result) = self.gates.get(&gate) {
            return result;
        }
        let operator = graph.gate(gate).operator();
        let args: Vec<Ref> = graph.gate(gate).args().iter().copied().collect();
        debug_assert!(!args.is_empty());

        let mut result: Option<SetId> = None;
        for arg in args {
            let arg_set = self.convert_graph_arg(graph, arg);
            result = Some(match result {
                None => arg_set,
                Some(acc) => match operator {
                    Operator::And | Operator::Or => self.apply(operator, acc, arg_set),
                    other => unreachable!("operator {} in a preprocessed graph", other),
                },
            });
        }
        let result = result.expect("at least one argument");
        self.gates.insert(gate, result);
        result
    }

    fn convert_graph_arg(&mut self, graph: &BooleanGraph, arg: Ref) -> SetId {
        debug_assert!(!arg.is_negated(), "coherent graphs have no complements");
        let index = arg.index();
        if graph.is_variable(index) {
            let order = graph.node(index).order();
            let (base, empty) = (self.base, self.empty);
            self.mk_node(index, order, false, base, empty)
        } else {
            debug_assert!(graph.is_gate(index), "constants are preprocessed away");
            if graph.gate(index).is_module() {
                if !self.modules.contains_key(&index) {
                    self.modules.insert(index, self.base); // Break recursion.
                    let converted = self.convert_graph_gate(graph, index);
                    self.modules.insert(index, converted);
                }
                let order = graph.num_variables() as u32 + index;
                let (base, empty) = (self.base, self.empty);
                self.mk_node(index, order, true, base, empty)
            } else {
                self.convert_graph_gate(graph, index)
            }
        }
    }
}

// The Apply operation.
impl Zbdd {
    /// Applies a Boolean set operation to two set graphs.
    ///
    /// For OR the result is the union of the families; for AND it is the
    /// pairwise union of their member sets.
    fn apply(&mut self, op: Operator, a: SetId, b: SetId) -> SetId {
        // Terminal cases; Base acts as the empty-set singleton.
        match op {
            Operator::Or => {
                if a == self.base || b == self.base {
                    return self.base;
                }
                if a == self.empty {
                    return b;
                }
                if b == self.empty || a == b {
                    return a;
                }
            }
            Operator::And => {
                if a == self.empty || b == self.empty {
                    return self.empty;
                }
                if a == self.base {
                    return b;
                }
                if b == self.base || a == b {
                    return a;
                }
            }
            other => unreachable!("apply of operator {}", other),
        }

        // Canonical signature of the computation.
        let key = (
            op.index() as u64,
            a.raw().min(b.raw()) as u64,
            a.raw().max(b.raw()) as u64,
        );
        if let Some(&result) = self.compute_table.get(&key) {
            return result;
        }

        // Let `a` carry the lower (higher-priority) order.
        let (mut a, mut b) = (a, b);
        if self.node(a).order > self.node(b).order {
            std::mem::swap(&mut a, &mut b);
        }
        let a_node = self.node(a);
        let b_node = self.node(b);

        let result = if a_node.order == b_node.order {
            debug_assert_eq!(a_node.index, b_node.index);
            let (high, low) = match op {
                Operator::Or => {
                    let high = self.apply(Operator::Or, a_node.high, b_node.high);
                    let low = self.apply(Operator::Or, a_node.low, b_node.low);
                    (high, low)
                }
                Operator::And => {
                    // (x.H + x.L)(y.H + y.L) distributes over the branches.
                    let hh = self.apply(Operator::And, a_node.high, b_node.high);
                    let hl = self.apply(Operator::And, a_node.high, b_node.low);
                    let lh = self.apply(Operator::And, a_node.low, b_node.high);
                    let hh_hl = self.apply(Operator::Or, hh, hl);
                    let high = self.apply(Operator::Or, hh_hl, lh);
                    let low = self.apply(Operator::And, a_node.low, b_node.low);
                    (high, low)
                }
                _ => unreachable!(),
            };
            self.mk_node(a_node.index, a_node.order, a_node.module, high, low)
        } else {
            let (high, low) = match op {
                Operator::Or => (a_node.high, self.apply(Operator::Or, a_node.low, b)),
                Operator::And => {
                    let high = self.apply(Operator::And, a_node.high, b);
                    let low = self.apply(Operator::And, a_node.low, b);
                    (high, low)
                }
                _ => unreachable!(),
            };
            self.mk_node(a_node.index, a_node.order, a_node.module, high, low)
        };

        self.compute_table.insert(key, result);
        result
    }
}

// Minimization.
impl Zbdd {
    /// Removes non-minimal sets from the family.
    pub fn minimize(&mut self, vertex: SetId) -> SetId {
        if self.is_terminal(vertex) {
            return vertex;
        }
        if let Some(&result) = self.minimal_results.get(&vertex) {
            return result;
        }
        let node = self.node(vertex);
        let low = self.minimize(node.low);
        let high = self.minimize(node.high);
        let high = self.subsume(high, low);
        let result = self.mk_node(node.index, node.order, node.module, high, low);
        self.minimal_results.insert(vertex, result);
        result
    }

    /// Removes from `high` every set that has a subset in `low`.
    fn subsume(&mut self, high: SetId, low: SetId) -> SetId {
        if low == self.empty {
            return high;
        }
        if low == self.base {
            return self.empty; // The empty set subsumes everything.
        }
        if self.is_terminal(high) {
            return high; // Inner families of coherent graphs lack the empty set.
        }
        let key = (high.raw() as u64, low.raw() as u64);
        if let Some(&result) = self.subsume_table.get(&key) {
            return result;
        }

        let high_node = self.node(high);
        let low_node = self.node(low);
        let result = if high_node.order > low_node.order {
            // The low family's top variable is not in the high sets.
            self.subsume(high, low_node.low)
        } else if high_node.order < low_node.order {
            let subhigh = self.subsume(high_node.high, low);
            let sublow = self.subsume(high_node.low, low);
            self.mk_node(
                high_node.index,
                high_node.order,
                high_node.module,
                subhigh,
                sublow,
            )
        } else {
            // {v} U s is subsumed by {v} U t (t in low.high) or by
            // t in low.low alone.
            let subhigh = self.subsume(high_node.high, low_node.high);
            let subhigh = self.subsume(subhigh, low_node.low);
            let sublow = self.subsume(high_node.low, low_node.low);
            self.mk_node(
                high_node.index,
                high_node.order,
                high_node.module,
                subhigh,
                sublow,
            )
        };

        self.subsume_table.insert(key, result);
        result
    }
}

// Analysis: minimization plus enumeration.
impl Zbdd {
    /// Minimizes the set graphs and enumerates the minimal cut sets as
    /// sorted vectors of variable indices.
    pub fn analyze(&mut self) -> Vec<Vec<u32>> {
        self.root = self.minimize(self.root);
        let module_indices: Vec<u32> = self.modules.keys().copied().collect();
        for index in module_indices {
            let minimal = self.minimize(self.modules[&index]);
            self.modules.insert(index, minimal);
        }

        let mut cut_sets = self.generate_cut_sets(self.root);
        for cut_set in &mut cut_sets {
            cut_set.sort_unstable();
        }
        debug!("generated {} minimal cut sets", cut_sets.len());
        cut_sets
    }

    /// Traverses the reduced graph, expanding module proxies by
    /// concatenating their member sets into the outer sets.
    fn generate_cut_sets(&mut self, vertex: SetId) -> Vec<Vec<u32>> {
        if vertex == self.base {
            return vec![Vec::new()]; // The set of the empty set.
        }
        if vertex == self.empty {
            return Vec::new();
        }
        if let Some(cached) = self.cut_sets_cache.get(&vertex) {
            return cached.clone();
        }

        let node = self.node(vertex);
        let low_sets = self.generate_cut_sets(node.low);
        let high_sets = self.generate_cut_sets(node.high);

        let mut result = low_sets;
        if node.module {
            let module_root = self.modules[&node.index];
            let module_sets = self.generate_cut_sets(module_root);
            for cut_set in high_sets {
                for module_set in &module_sets {
                    let mut combined = cut_set.clone();
                    combined.extend_from_slice(module_set);
                    result.push(combined);
                }
            }
        } else {
            for mut cut_set in high_sets {
                cut_set.push(node.index);
                result.push(cut_set);
            }
        }

        self.cut_sets_cache.insert(vertex, result.clone());
        result
    }

    /// Counts the sets in the family without enumerating them.
    /// Module proxies count as single elements.
    pub fn count_cut_sets(&mut self, vertex: SetId) -> u64 {
        if vertex == self.base {
            return 1;
        }
        if vertex == self.empty {
            return 0;
        }
        if let Some(&count) = self.count_cache.get(&vertex) {
            return count;
        }
        let node = self.node(vertex);
        let count = self.count_cut_sets(node.high) + self.count_cut_sets(node.low);
        self.count_cache.insert(vertex, count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::Bdd;
    use crate::graph::BooleanGraph;
    use crate::preprocessor::Preprocessor;

    fn analyze_graph(graph: &mut BooleanGraph) -> Vec<Vec<u32>> {
        Preprocessor::new(graph).process();
        let bdd = Bdd::from_graph(graph);
        let mut zbdd = Zbdd::from_bdd(&bdd, &Settings::default());
        zbdd.analyze()
    }

    fn sorted(mut sets: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
        sets.sort();
        sets
    }

    #[test]
    fn test_single_and() {
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");
        let top = graph.add_gate(Operator::And);
        graph.add_arg(top, Ref::positive(a));
        graph.add_arg(top, Ref::positive(b));
        graph.set_root(top);

        assert_eq!(analyze_graph(&mut graph), vec![vec![a, b]]);
    }

    #[test]
    fn test_or_of_ands() {
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");
        let c = graph.add_variable("c");
        let d = graph.add_variable("d");
        let g1 = graph.add_gate(Operator::And);
        graph.add_arg(g1, Ref::positive(a));
        graph.add_arg(g1, Ref::positive(b));
        let g2 = graph.add_gate(Operator::And);
        graph.add_arg(g2, Ref::positive(c));
        graph.add_arg(g2, Ref::positive(d));
        let top = graph.add_gate(Operator::Or);
        graph.add_arg(top, Ref::positive(g1));
        graph.add_arg(top, Ref::positive(g2));
        graph.set_root(top);

        let mcs = sorted(analyze_graph(&mut graph));
        assert_eq!(mcs, vec![vec![a, b], vec![c, d]]);
    }

    #[test]
    fn test_absorption() {
        // OR(a, AND(a, b)) -> {{a}}.
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");
        let g1 = graph.add_gate(Operator::And);
        graph.add_arg(g1, Ref::positive(a));
        graph.add_arg(g1, Ref::positive(b));
        let top = graph.add_gate(Operator::Or);
        graph.add_arg(top, Ref::positive(a));
        graph.add_arg(top, Ref::positive(g1));
        graph.set_root(top);

        assert_eq!(analyze_graph(&mut graph), vec![vec![a]]);
    }

    #[test]
    fn test_graph_path_matches_bdd_path() {
        // ATLEAST(2; a, b, c) through both construction paths.
        fn make_graph() -> (BooleanGraph, [u32; 3]) {
            let mut graph = BooleanGraph::new();
            let a = graph.add_variable("a");
            let b = graph.add_variable("b");
            let c = graph.add_variable("c");
            let top = graph.add_gate(Operator::AtLeast);
            graph.set_vote_number(top, 2);
            graph.add_arg(top, Ref::positive(a));
            graph.add_arg(top, Ref::positive(b));
            graph.add_arg(top, Ref::positive(c));
            graph.set_root(top);
            (graph, [a, b, c])
        }

        let (mut graph, [a, b, c]) = make_graph();
        let via_bdd = sorted(analyze_graph(&mut graph));
        assert_eq!(via_bdd, vec![vec![a, b], vec![a, c], vec![b, c]]);

        let (mut graph, _) = make_graph();
        Preprocessor::new(&mut graph).process();
        let mut zbdd = Zbdd::from_graph(&graph, &Settings::default());
        let via_graph = sorted(zbdd.analyze());
        assert_eq!(via_graph, via_bdd);
    }

    #[test]
    fn test_subsume_removes_supersets() {
        let settings = Settings::default();
        let mut zbdd = Zbdd::with_settings(&settings);
        let (base, empty) = (zbdd.base, zbdd.empty);

        // {{1}, {1, 2}} minimizes to {{1}}.
        let inner = zbdd.mk_node(2, 2, false, base, base); // {{}, {2}}
        let family = zbdd.mk_node(1, 1, false, inner, empty); // {{1}, {1, 2}}
        let minimal = zbdd.minimize(family);
        assert_eq!(zbdd.count_cut_sets(minimal), 1);
        assert_eq!(zbdd.generate_cut_sets(minimal), vec![vec![1]]);

        // {{1, 3}, {3}} minimizes to {{3}}: subsumption across branches.
        let v3 = zbdd.mk_node(3, 3, false, base, empty); // {{3}}
        let family = zbdd.mk_node(1, 1, false, v3, v3); // {{1, 3}, {3}}
        let minimal = zbdd.minimize(family);
        assert_eq!(zbdd.count_cut_sets(minimal), 1);
        assert_eq!(zbdd.generate_cut_sets(minimal), vec![vec![3]]);
    }

    #[test]
    fn test_cut_set_limit_prunes_large_sets() {
        // AND(a, b, c) with a limit of 2 yields nothing.
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");
        let c = graph.add_variable("c");
        let top = graph.add_gate(Operator::And);
        graph.add_arg(top, Ref::positive(a));
        graph.add_arg(top, Ref::positive(b));
        graph.add_arg(top, Ref::positive(c));
        graph.set_root(top);

        Preprocessor::new(&mut graph).process();
        let bdd = Bdd::from_graph(&graph);
        let mut settings = Settings::default();
        settings.set_cut_set_limit(2);
        let mut zbdd = Zbdd::from_bdd(&bdd, &settings);
        assert_eq!(zbdd.analyze(), Vec::<Vec<u32>>::new());
    }

    #[test]
    fn test_unity_and_null_roots() {
        let settings = Settings::default();
        let mut zbdd = Zbdd::with_settings(&settings);
        let base = zbdd.base;
        zbdd.root = base;
        assert_eq!(zbdd.analyze(), vec![Vec::<u32>::new()]);

        let mut zbdd = Zbdd::with_settings(&settings);
        let empty = zbdd.empty;
        zbdd.root = empty;
        assert_eq!(zbdd.analyze(), Vec::<Vec<u32>>::new());
    }
}
