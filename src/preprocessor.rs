//! Preprocessing of the indexed Boolean graph.
//!
//! The preprocessor rewrites an arbitrary fault-tree graph into a
//! normalized, structurally simplified, modular form for decision-diagram
//! analysis. The passes run in a fixed order; each assumes the
//! preconditions established by the previous ones and re-establishes the
//! graph invariants it disturbs:
//!
//! 1. constant propagation,
//! 2. gate normalization (AND/OR/NULL form),
//! 3. NULL-gate removal and root sign resolution,
//! 4. complement propagation,
//! 5. multiple-definition merge (to a fixed point),
//! 6. Boolean optimization of common nodes (coherent graphs only),
//! 7. gate coalescence (to a fixed point),
//! 8. module detection.
//!
//! The graph is assumed valid and well-formed; the passes check their
//! contracts with debug assertions only and report no user errors.

use std::collections::HashMap;

use log::debug;

use crate::graph::BooleanGraph;
use crate::reference::Ref;
use crate::types::{Operator, State};

/// Runs the preprocessing pipeline over a Boolean graph.
///
/// The preprocessor owns the graph exclusively for the duration of the
/// run; worklists of constant and NULL gates are kept here, not in the
/// graph.
pub struct Preprocessor<'a> {
    graph: &'a mut BooleanGraph,
    /// Implicit sign of the root gate: -1 after an odd number of
    /// NOT/NOR/NAND roots has been stripped.
    root_sign: i32,
    /// Gates that turned constant and await upward propagation.
    const_gates: Vec<u32>,
    /// NULL-type pass-through gates that await removal.
    null_gates: Vec<u32>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(graph: &'a mut BooleanGraph) -> Self {
        Self {
            graph,
            root_sign: 1,
            const_gates: Vec::new(),
            null_gates: Vec::new(),
        }
    }

    /// Runs all the passes in order.
    pub fn process(&mut self) {
        let root = self.graph.root();
        debug_assert!(self.graph.node(root).parents().is_empty());
        self.graph.clear_gate_marks();

        debug!("preprocessing...");

        if self.graph.has_constants() {
            debug!("propagating constants...");
            self.propagate_constants(self.graph.root());
        }

        if !self.graph.is_normal() {
            debug!("normalizing gates...");
            debug_assert_eq!(self.root_sign, 1);
            self.normalize_gates();
        }

        self.remove_null_gates();

        let mut root = self.graph.root();
        if self.graph.gate(root).state() != State::Normal {
            // The root gate has become constant.
            if self.root_sign < 0 {
                let orig_state = self.graph.gate(root).state();
                let new_root = self.graph.add_gate(Operator::Null);
                self.graph.set_root(new_root);
                if orig_state == State::Null {
                    self.graph.make_unity(new_root);
                } else {
                    debug_assert_eq!(orig_state, State::Unity);
                    self.graph.nullify(new_root);
                }
                self.root_sign = 1;
            }
            return;
        }
        if self.graph.gate(root).operator() == Operator::Null {
            // A pass-through root delegates to its only gate argument.
            debug_assert_eq!(self.graph.gate(root).args().len(), 1);
            if let Some(&edge) = self.graph.gate(root).gate_args().iter().next() {
                self.graph.erase_arg(root, edge);
                self.graph.set_root(edge.index());
                root = edge.index();
                debug_assert!(self.graph.node(root).parents().is_empty());
                self.root_sign *= if edge.is_negated() { -1 } else { 1 };
            }
        }

        if !self.graph.is_coherent() {
            debug!("propagating complements...");
            if self.root_sign < 0 {
                match self.graph.gate(root).operator() {
                    Operator::Or => self.graph.set_operator(root, Operator::And),
                    Operator::And => self.graph.set_operator(root, Operator::Or),
                    Operator::Null => {}
                    other => unreachable!("root operator {} after normalization", other),
                }
                self.graph.invert_args(root);
                self.root_sign = 1;
            }
            let mut complements = HashMap::new();
            self.graph.clear_gate_marks();
            self.propagate_complements(root, &mut complements);
        }

        debug!("detecting multiple definitions...");
        while self.process_multiple_definitions() {}

        if self.graph.is_coherent() {
            self.graph.clear_gate_marks();
            self.boolean_optimization();
        }

        debug!("coalescing gates...");
        self.graph.clear_gate_marks();
        self.remove_null_gates();
        let mut tree_changed = true;
        while tree_changed {
            debug_assert!(self.const_gates.is_empty());
            debug_assert!(self.null_gates.is_empty());

            tree_changed = false;
            self.graph.clear_gate_marks();
            let changed = self.join_gates(self.graph.root());

            if !self.const_gates.is_empty() {
                self.clear_const_gates();
                tree_changed = true;
            } else if changed {
                tree_changed = true;
            }
        }

        // From here on the structure alternates OR and AND, all gates are
        // positive toward gates, and each gate has at least two arguments.
        let root = self.graph.root();
        if self.graph.gate(root).args().is_empty() {
            return; // Constant root.
        }
        self.detect_modules();
        debug!("preprocessing is done");
    }

    pub fn root_sign(&self) -> i32 {
        self.root_sign
    }
}

// Constant propagation.
impl Preprocessor<'_> {
    /// DFS constant propagation: constant arguments and constant-state
    /// argument gates are folded into their parents. Returns true if the
    /// graph changed.
    fn propagate_constants(&mut self, gate: u32) -> bool {
        if self.graph.node(gate).mark() {
            return false;
        }
        self.graph.node_mut(gate).set_mark(true);
        if self.graph.gate(gate).state() != State::Normal {
            return false;
        }

        let mut changed = false;
        let mut to_erase: Vec<Ref> = Vec::new();

        let constant_args: Vec<Ref> = self.graph.gate(gate).constant_args().iter().copied().collect();
        for arg in constant_args {
            let state = self.graph.constant_state(arg.index()) ^ arg.is_negated();
            if self.process_constant_arg(gate, arg, state, &mut to_erase) {
                return true; // The gate itself has become constant.
            }
        }

        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            let ret = self.propagate_constants(arg.index());
            changed |= ret;

            let arg_state = self.graph.gate(arg.index()).state();
            if arg_state == State::Normal {
                continue;
            }
            let state = (arg_state == State::Unity) ^ arg.is_negated();
            if self.process_constant_arg(gate, arg, state, &mut to_erase) {
                return true;
            }
        }
        if !to_erase.is_empty() {
            changed = true;
        }
        self.remove_args(gate, &to_erase);
        changed
    }

    /// Folds one constant argument into the gate per the operator table.
    ///
    /// Arguments to be erased are collected into `to_erase` so the caller
    /// controls when edges disappear. Returns true when the gate itself
    /// becomes constant.
    fn process_constant_arg(
        &mut self,
        gate: u32,
        arg: Ref,
        state: bool,
        to_erase: &mut Vec<Ref>,
    ) -> bool {
        let operator = self.graph.gate(gate).operator();
        if !state {
            // The argument is the constant False.
            match operator {
                Operator::Nor | Operator::Xor | Operator::Or => {
                    to_erase.push(arg);
                    return false;
                }
                Operator::Null | Operator::And => self.graph.nullify(gate),
                Operator::Nand | Operator::Not => self.graph.make_unity(gate),
                Operator::AtLeast => {
                    // K / (N - 1).
                    to_erase.push(arg);
                    let k = self.graph.gate(gate).vote_number() as usize;
                    let n = self.graph.gate(gate).args().len() - to_erase.len();
                    if k == n {
                        self.graph.set_operator(gate, Operator::And);
                    }
                    return false;
                }
            }
        } else {
            // The argument is the constant True.
            match operator {
                Operator::Null | Operator::Or => self.graph.make_unity(gate),
                Operator::Nand | Operator::And => {
                    to_erase.push(arg);
                    return false;
                }
                Operator::Nor | Operator::Not => self.graph.nullify(gate),
                Operator::Xor => {
                    // One True argument promotes XOR to NOT of the other.
                    debug_assert!(self.graph.gate(gate).args().len() == 2);
                    if to_erase.len() == 1 {
                        // The other argument is already the constant False.
                        self.graph.make_unity(gate);
                    } else {
                        debug_assert!(to_erase.is_empty());
                        self.graph.set_operator(gate, Operator::Not);
                        to_erase.push(arg);
                        return false;
                    }
                }
                Operator::AtLeast => {
                    // (K - 1) / (N - 1).
                    let k = self.graph.gate(gate).vote_number() - 1;
                    if k == 1 {
                        self.graph.set_operator(gate, Operator::Or);
                    } else {
                        self.graph.set_vote_number(gate, k);
                    }
                    to_erase.push(arg);
                    return false;
                }
            }
        }
        true // The gate became constant NULL or UNITY.
    }

    /// Erases the collected arguments and applies the degeneration rules
    /// for gates left with zero or one argument.
    fn remove_args(&mut self, gate: u32, to_erase: &[Ref]) {
        if to_erase.is_empty() {
            return;
        }
        debug_assert!(to_erase.len() <= self.graph.gate(gate).args().len());
        for &arg in to_erase {
            self.graph.erase_arg(gate, arg);
        }
        let operator = self.graph.gate(gate).operator();
        let num_args = self.graph.gate(gate).args().len();
        if num_args == 0 {
            debug_assert!(operator != Operator::Not && operator != Operator::Null);
            debug_assert!(operator != Operator::AtLeast);
            match operator {
                Operator::Nand | Operator::Xor | Operator::Or => self.graph.nullify(gate),
                Operator::Nor | Operator::And => self.graph.make_unity(gate),
                _ => {}
            }
        } else if num_args == 1 {
            debug_assert_ne!(operator, Operator::AtLeast);
            match operator {
                Operator::Xor | Operator::Or | Operator::And => {
                    self.graph.set_operator(gate, Operator::Null)
                }
                Operator::Nor | Operator::Nand => self.graph.set_operator(gate, Operator::Not),
                _ => {
                    debug_assert!(operator == Operator::Not || operator == Operator::Null);
                }
            }
        }
    }

    /// Propagates a constant gate to its parents until it is detached.
    fn propagate_const_gate(&mut self, gate: u32) {
        debug_assert_ne!(self.graph.gate(gate).state(), State::Normal);

        while let Some(&parent) = self.graph.node(gate).parents().iter().next() {
            let edge = self
                .graph
                .gate(parent)
                .arg_edge(gate)
                .expect("parent back-link is consistent");
            let state =
                (self.graph.gate(gate).state() == State::Unity) ^ edge.is_negated();

            let mut to_erase = Vec::new();
            if !self.process_constant_arg(parent, edge, state, &mut to_erase) {
                self.remove_args(parent, &to_erase);
            }

            if self.graph.gate(parent).state() != State::Normal {
                self.propagate_const_gate(parent);
            } else if self.graph.gate(parent).operator() == Operator::Null {
                self.propagate_null_gate(parent);
            }
        }
    }

    /// Collapses a NULL pass-through gate into its parents.
    fn propagate_null_gate(&mut self, gate: u32) {
        debug_assert_eq!(self.graph.gate(gate).operator(), Operator::Null);

        while let Some(&parent) = self.graph.node(gate).parents().iter().next() {
            let edge = self
                .graph
                .gate(parent)
                .arg_edge(gate)
                .expect("parent back-link is consistent");
            self.graph.join_null_gate(parent, edge);

            if self.graph.gate(parent).state() != State::Normal {
                self.propagate_const_gate(parent);
            } else if self.graph.gate(parent).operator() == Operator::Null {
                self.propagate_null_gate(parent);
            }
        }
    }

    /// Drains the constant-gate worklist.
    fn clear_const_gates(&mut self) {
        self.graph.clear_gate_marks(); // New gates may come without marks.
        let gates = std::mem::take(&mut self.const_gates);
        for gate in gates {
            if self.graph.gate(gate).state() == State::Normal {
                continue; // Stale entry.
            }
            self.propagate_const_gate(gate);
        }
    }

    /// Drains the NULL-gate worklist.
    fn clear_null_gates(&mut self) {
        self.graph.clear_gate_marks(); // New gates may come without marks.
        let gates = std::mem::take(&mut self.null_gates);
        for gate in gates {
            if self.graph.gate(gate).state() != State::Normal
                || self.graph.gate(gate).operator() != Operator::Null
            {
                continue; // Stale entry.
            }
            self.propagate_null_gate(gate);
        }
    }
}

// Normalization into AND/OR/NULL form.
impl Preprocessor<'_> {
    fn normalize_gates(&mut self) {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());

        // The root's own negation folds into the root sign.
        let root = self.graph.root();
        match self.graph.gate(root).operator() {
            Operator::Nor | Operator::Nand | Operator::Not => self.root_sign *= -1,
            _ => {}
        }

        self.graph.clear_gate_marks();
        self.notify_parents_of_negative_gates(root);

        self.graph.clear_gate_marks();
        self.normalize_gate(root);

        debug_assert!(self.const_gates.is_empty());
        if !self.null_gates.is_empty() {
            self.clear_null_gates();
        }
    }

    /// Bottom-up negation push-down: a parent complements every edge to a
    /// NOR/NAND/NOT argument; the argument is retyped later.
    fn notify_parents_of_negative_gates(&mut self, gate: u32) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);

        let mut to_negate: Vec<Ref> = Vec::new();
        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            self.notify_parents_of_negative_gates(arg.index());
            match self.graph.gate(arg.index()).operator() {
                Operator::Nor | Operator::Nand | Operator::Not => to_negate.push(arg),
                _ => {}
            }
        }
        for arg in to_negate {
            self.graph.invert_arg(gate, arg); // No constants or duplicates.
        }
    }

    fn normalize_gate(&mut self, gate: u32) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);
        debug_assert_eq!(self.graph.gate(gate).state(), State::Normal);
        debug_assert!(!self.graph.gate(gate).args().is_empty());

        // Depth-first traversal before the arguments may get changed.
        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            self.normalize_gate(arg.index());
        }

        match self.graph.gate(gate).operator() {
            // Negation is already pushed down.
            Operator::Not => {
                debug_assert_eq!(self.graph.gate(gate).args().len(), 1);
                self.graph.set_operator(gate, Operator::Null);
                self.null_gates.push(gate);
            }
            Operator::Nor => self.graph.set_operator(gate, Operator::Or),
            Operator::Nand => self.graph.set_operator(gate, Operator::And),
            Operator::Xor => {
                debug_assert_eq!(self.graph.gate(gate).args().len(), 2);
                self.normalize_xor_gate(gate);
            }
            Operator::AtLeast => {
                debug_assert!(self.graph.gate(gate).args().len() > 2);
                debug_assert!(self.graph.gate(gate).vote_number() > 1);
                self.normalize_atleast_gate(gate);
            }
            Operator::Null => self.null_gates.push(gate), // Register for removal.
            Operator::Or | Operator::And => {}
        }
    }

    /// `XOR(a, b) -> OR(AND(a, !b), AND(!a, b))`.
    fn normalize_xor_gate(&mut self, gate: u32) {
        let args: Vec<Ref> = self.graph.gate(gate).args().iter().copied().collect();
        debug_assert_eq!(args.len(), 2);

        let gate_one = self.graph.add_gate(Operator::And);
        let gate_two = self.graph.add_gate(Operator::And);
        self.graph.node_mut(gate_one).set_mark(true);
        self.graph.node_mut(gate_two).set_mark(true);

        self.graph.share_arg(args[0], gate, gate_one);
        self.graph.share_arg(args[0], gate, gate_two);
        self.graph.invert_arg(gate_two, args[0]);

        self.graph.share_arg(args[1], gate, gate_one);
        self.graph.invert_arg(gate_one, args[1]);
        self.graph.share_arg(args[1], gate, gate_two);

        self.graph.erase_all_args(gate);
        self.graph.set_operator(gate, Operator::Or);
        self.graph.add_arg(gate, Ref::positive(gate_one));
        self.graph.add_arg(gate, Ref::positive(gate_two));
    }

    /// The "pick first / don't pick first" decomposition:
    ///
    /// ```text
    /// ATLEAST(k, [x, rest..]) ->
    ///     OR(AND(x, ATLEAST(k-1, rest)), ATLEAST(k, rest))
    /// ```
    ///
    /// terminating at `k == 1` (an OR gate) and `|args| == k` (an AND).
    fn normalize_atleast_gate(&mut self, gate: u32) {
        debug_assert_eq!(self.graph.gate(gate).operator(), Operator::AtLeast);
        let vote = self.graph.gate(gate).vote_number();
        debug_assert!(vote > 0);
        debug_assert!(self.graph.gate(gate).args().len() > 1);

        if self.graph.gate(gate).args().len() as u32 == vote {
            self.graph.set_operator(gate, Operator::And);
            return;
        }
        if vote == 1 {
            self.graph.set_operator(gate, Operator::Or);
            return;
        }

        let args: Vec<Ref> = self.graph.gate(gate).args().iter().copied().collect();
        let first = args[0];

        let first_arg = self.graph.add_gate(Operator::And);
        self.graph.share_arg(first, gate, first_arg);

        let grand_arg = self.graph.add_gate(Operator::AtLeast);
        self.graph.set_vote_number(grand_arg, vote - 1);
        self.graph.add_arg(first_arg, Ref::positive(grand_arg));

        let second_arg = self.graph.add_gate(Operator::AtLeast);
        self.graph.set_vote_number(second_arg, vote);

        for &arg in &args[1..] {
            self.graph.share_arg(arg, gate, grand_arg);
            self.graph.share_arg(arg, gate, second_arg);
        }

        self.graph.node_mut(first_arg).set_mark(true);
        self.graph.node_mut(second_arg).set_mark(true);
        self.graph.node_mut(grand_arg).set_mark(true);

        self.graph.erase_all_args(gate);
        self.graph.set_operator(gate, Operator::Or);
        self.graph.add_arg(gate, Ref::positive(first_arg));
        self.graph.add_arg(gate, Ref::positive(second_arg));

        self.normalize_atleast_gate(grand_arg);
        self.normalize_atleast_gate(second_arg);
    }
}

// Complement propagation.
impl Preprocessor<'_> {
    /// Eliminates complemented gate edges by introducing (or reusing)
    /// complement twins with the opposite operator and inverted arguments.
    /// A single-parent child is rewritten in place instead of cloned.
    fn propagate_complements(&mut self, gate: u32, complements: &mut HashMap<u32, u32>) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);

        let mut to_swap: Vec<Ref> = Vec::new();
        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            let arg_gate = arg.index();
            let mut next = arg_gate;
            if arg.is_negated() {
                to_swap.push(arg);
                if let Some(&twin) = complements.get(&arg_gate) {
                    next = twin;
                } else {
                    let operator = self.graph.gate(arg_gate).operator();
                    debug_assert!(operator == Operator::And || operator == Operator::Or);
                    let complement_type = if operator == Operator::Or {
                        Operator::And
                    } else {
                        Operator::Or
                    };
                    let complement = if self.graph.node(arg_gate).parents().len() == 1 {
                        // Only this parent sees the gate: rewrite in place.
                        self.graph.set_operator(arg_gate, complement_type);
                        self.graph.invert_args(arg_gate);
                        arg_gate
                    } else {
                        let twin = self.graph.add_gate(complement_type);
                        self.graph.copy_args(twin, arg_gate);
                        self.graph.invert_args(twin);
                        twin
                    };
                    complements.insert(arg_gate, complement);
                    next = complement;
                }
            }
            self.propagate_complements(next, complements);
        }

        for arg in to_swap {
            debug_assert!(arg.is_negated());
            self.graph.erase_arg(gate, arg);
            let complement = complements[&arg.index()];
            let added = self.graph.add_arg(gate, Ref::positive(complement));
            debug_assert!(added); // No duplicates.
        }
    }
}

// NULL-gate removal.
impl Preprocessor<'_> {
    /// Sweeps NULL pass-through gates out of the graph. A lone NULL root
    /// is allowed to stay. Returns true if the graph changed.
    fn remove_null_gates(&mut self) -> bool {
        debug_assert!(self.null_gates.is_empty());
        self.graph.clear_gate_marks();
        self.gather_null_gates(self.graph.root());
        self.graph.clear_gate_marks();

        if self.null_gates.len() == 1 && self.null_gates[0] == self.graph.root() {
            self.null_gates.clear(); // Only the root; nothing to join into.
        }
        if !self.null_gates.is_empty() {
            self.clear_null_gates();
            return true;
        }
        false
    }

    fn gather_null_gates(&mut self, gate: u32) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);
        if self.graph.gate(gate).operator() == Operator::Null
            && self.graph.gate(gate).state() == State::Normal
        {
            self.null_gates.push(gate);
        }
        let gate_args: Vec<u32> = self
            .graph
            .gate(gate)
            .gate_args()
            .iter()
            .map(|r| r.index())
            .collect();
        for arg in gate_args {
            self.gather_null_gates(arg);
        }
    }
}

// Multiple-definition detection.
impl Preprocessor<'_> {
    /// Finds gates defined identically (same operator, same signed args,
    /// same vote number) and redirects their parents to one canonical
    /// definition. Returns true if any duplicate was found.
    fn process_multiple_definitions(&mut self) -> bool {
        debug_assert!(self.null_gates.is_empty());
        debug_assert!(self.const_gates.is_empty());

        let mut multi_def: Vec<(u32, Vec<u32>)> = Vec::new();
        let mut orig_gates: Vec<Vec<u32>> = vec![Vec::new(); Operator::ALL.len()];
        self.graph.clear_gate_marks();
        self.detect_multiple_definitions(self.graph.root(), &mut multi_def, &mut orig_gates);

        if multi_def.is_empty() {
            return false;
        }
        for (orig_gate, duplicates) in multi_def {
            debug!("gate {} has {} duplicate definitions", orig_gate, duplicates.len());
            for dup in duplicates {
                let parents: Vec<u32> = self.graph.node(dup).parents().iter().copied().collect();
                for parent in parents {
                    // Rewrites may have detached this parent already.
                    let Some(edge) = self.graph.gate(parent).arg_edge(dup) else {
                        continue;
                    };
                    self.graph.erase_arg(parent, edge);
                    self.graph
                        .add_arg(parent, Ref::new(orig_gate, edge.is_negated()));

                    if self.graph.gate(parent).state() != State::Normal {
                        self.const_gates.push(parent);
                        continue;
                    }
                    // Merging both polarities of a pair may leave one arg.
                    if self.graph.gate(parent).args().len() == 1 {
                        match self.graph.gate(parent).operator() {
                            Operator::And | Operator::Or => {
                                self.graph.set_operator(parent, Operator::Null)
                            }
                            _ => {}
                        }
                    }
                    if self.graph.gate(parent).operator() == Operator::Null {
                        self.null_gates.push(parent);
                    }
                }
            }
        }
        if !self.const_gates.is_empty() {
            self.clear_const_gates();
        }
        if !self.null_gates.is_empty() {
            self.clear_null_gates();
        }
        true
    }

    fn detect_multiple_definitions(
        &mut self,
        gate: u32,
        multi_def: &mut Vec<(u32, Vec<u32>)>,
        orig_gates: &mut Vec<Vec<u32>>,
    ) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);
        debug_assert_eq!(self.graph.gate(gate).state(), State::Normal);

        let operator = self.graph.gate(gate).operator();
        for &orig_gate in &orig_gates[operator.index()] {
            if self.graph.gate(orig_gate).args() != self.graph.gate(gate).args() {
                continue;
            }
            if operator == Operator::AtLeast
                && self.graph.gate(orig_gate).vote_number() != self.graph.gate(gate).vote_number()
            {
                continue;
            }
            // A multiple definition of the original gate.
            match multi_def.iter_mut().find(|(orig, _)| *orig == orig_gate) {
                Some((_, dups)) => dups.push(gate),
                None => multi_def.push((orig_gate, vec![gate])),
            }
            return; // Don't descend into a duplicate.
        }
        // No redefinition found. Descend before registering, so the gate
        // is never compared against its own descendants.
        let gate_args: Vec<u32> = self
            .graph
            .gate(gate)
            .gate_args()
            .iter()
            .map(|r| r.index())
            .collect();
        for arg in gate_args {
            self.detect_multiple_definitions(arg, multi_def, orig_gates);
        }
        orig_gates[operator.index()].push(gate);
    }
}

// Boolean optimization of common nodes.
impl Preprocessor<'_> {
    /// Detects nodes shared by several parents whose failure propagates to
    /// fewer destinations than its multiplicity, and removes the redundant
    /// occurrences.
    fn boolean_optimization(&mut self) {
        self.graph.clear_node_visits();
        self.graph.clear_gate_marks();

        let (common_gates, common_variables) = self.gather_common_nodes();

        self.graph.clear_node_visits();
        for gate in common_gates {
            self.process_common_node(gate);
        }
        for variable in common_variables {
            self.process_common_node(variable);
        }
    }

    /// BFS collection of gates and variables with more than one parent.
    fn gather_common_nodes(&mut self) -> (Vec<u32>, Vec<u32>) {
        let mut common_gates = Vec::new();
        let mut common_variables = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.graph.root());
        while let Some(gate) = queue.pop_front() {
            let gate_args: Vec<u32> = self
                .graph
                .gate(gate)
                .gate_args()
                .iter()
                .map(|r| r.index())
                .collect();
            for arg in gate_args {
                debug_assert_eq!(self.graph.gate(arg).state(), State::Normal);
                if self.graph.node(arg).visited() {
                    continue;
                }
                self.graph.node_mut(arg).visit(1);
                queue.push_back(arg);
                if self.graph.node(arg).parents().len() > 1 {
                    common_gates.push(arg);
                }
            }
            let var_args: Vec<u32> = self
                .graph
                .gate(gate)
                .variable_args()
                .iter()
                .map(|r| r.index())
                .collect();
            for arg in var_args {
                if self.graph.node(arg).visited() {
                    continue;
                }
                self.graph.node_mut(arg).visit(1);
                if self.graph.node(arg).parents().len() > 1 {
                    common_variables.push(arg);
                }
            }
        }
        (common_gates, common_variables)
    }

    /// Applies the failure-propagation analysis to one common node.
    fn process_common_node(&mut self, node: u32) {
        if self.graph.node(node).parents().len() <= 1 {
            return; // The parents have been rewritten away.
        }
        let root = self.graph.root();
        self.graph.clear_opti_values();

        debug_assert_eq!(self.graph.node(node).opti_value(), 0);
        self.graph.node_mut(node).set_opti_value(1);
        let mut mult_tot = self.graph.node(node).parents().len() as i32;
        debug_assert!(mult_tot > 1);
        mult_tot += self.propagate_failure(node);

        let mut destinations: Vec<u32> = Vec::new();
        let num_dest = if self.graph.node(root).opti_value() == 1 {
            // The root gate failed.
            destinations.push(root);
            1
        } else {
            debug_assert_eq!(self.graph.node(root).opti_value(), 0);
            self.collect_failure_destinations(root, node, &mut destinations)
        };

        if num_dest == 0 {
            return; // No failure destination detected.
        }
        debug_assert!(!destinations.is_empty());
        if num_dest < mult_tot {
            // The node is redundant under some of its parents.
            debug!(
                "common node {}: {} destinations < multiplicity {}",
                node, num_dest, mult_tot
            );
            let created_constant = self.process_redundant_parents(node, &mut destinations);
            self.process_failure_destinations(node, &destinations);
            if created_constant {
                self.graph.clear_gate_marks();
                self.propagate_constants(self.graph.root());
                self.graph.clear_gate_marks();
                self.remove_null_gates();
            }
        }
    }

    /// Marks ancestors failed per their operator's failure criterion.
    /// Returns the total multiplicity of the newly failed shared gates.
    fn propagate_failure(&mut self, node: u32) -> i32 {
        debug_assert_eq!(self.graph.node(node).opti_value(), 1);
        let mut mult_tot = 0;
        let parents: Vec<u32> = self.graph.node(node).parents().iter().copied().collect();
        for parent in parents {
            if self.graph.node(parent).opti_value() == 1 {
                continue;
            }
            self.graph.arg_failed(parent); // Send a notification.
            if self.graph.node(parent).opti_value() == 1 {
                let mult = self.graph.node(parent).parents().len() as i32;
                if mult > 1 {
                    mult_tot += mult;
                }
                mult_tot += self.propagate_failure(parent);
            }
        }
        mult_tot
    }

    /// Collects gates that did not fail themselves but have a failed
    /// argument gate other than the common node.
    fn collect_failure_destinations(
        &mut self,
        gate: u32,
        index: u32,
        destinations: &mut Vec<u32>,
    ) -> i32 {
        debug_assert_eq!(self.graph.node(gate).opti_value(), 0);
        if self.graph.gate(gate).has_arg_index(index) {
            self.graph.node_mut(gate).set_opti_value(3);
        } else {
            self.graph.node_mut(gate).set_opti_value(2);
        }
        let mut num_dest = 0;
        let gate_args: Vec<u32> = self
            .graph
            .gate(gate)
            .gate_args()
            .iter()
            .map(|r| r.index())
            .collect();
        for arg in gate_args {
            match self.graph.node(arg).opti_value() {
                0 => num_dest += self.collect_failure_destinations(arg, index, destinations),
                1 if arg != index => {
                    num_dest += 1;
                    if !destinations.contains(&arg) {
                        destinations.push(arg);
                    }
                }
                _ => {} // Already processed or the common node itself.
            }
        }
        num_dest
    }

    /// The node behaves like a constant False for its redundant parents.
    /// Returns true if any parent became constant.
    fn process_redundant_parents(&mut self, node: u32, destinations: &mut Vec<u32>) -> bool {
        let mut redundant_parents: Vec<u32> = Vec::new();
        let parents: Vec<u32> = self.graph.node(node).parents().iter().copied().collect();
        for parent in parents {
            if self.graph.node(parent).opti_value() < 3 {
                // A destination parent that is OR keeps the node as-is.
                if self.graph.gate(parent).operator() == Operator::Or {
                    if let Some(pos) = destinations.iter().position(|&d| d == parent) {
                        destinations.remove(pos);
                        continue;
                    }
                }
                redundant_parents.push(parent);
            }
        }
        let mut created_constant = false;
        for parent in redundant_parents {
            let edge = match self.graph.gate(parent).arg_edge(node) {
                Some(edge) => edge,
                None => continue, // Detached by an earlier rewrite.
            };
            match self.graph.gate(parent).operator() {
                Operator::And => {
                    self.graph.nullify(parent);
                    created_constant = true;
                }
                Operator::Or => {
                    debug_assert!(self.graph.gate(parent).args().len() > 1);
                    self.graph.erase_arg(parent, edge);
                    if self.graph.gate(parent).args().len() == 1 {
                        self.graph.set_operator(parent, Operator::Null);
                    }
                }
                Operator::AtLeast => {
                    debug_assert!(self.graph.gate(parent).args().len() > 2);
                    self.graph.erase_arg(parent, edge);
                    if self.graph.gate(parent).args().len()
                        == self.graph.gate(parent).vote_number() as usize
                    {
                        self.graph.set_operator(parent, Operator::And);
                    }
                }
                other => unreachable!("redundant parent of type {}", other),
            }
        }
        created_constant
    }

    /// Rewrites the destinations so they receive the node directly.
    fn process_failure_destinations(&mut self, node: u32, destinations: &[u32]) {
        for &target in destinations {
            if self.graph.gate(target).state() != State::Normal {
                continue; // Nullified as a redundant parent.
            }
            debug_assert_ne!(self.graph.gate(target).operator(), Operator::Null);
            match self.graph.gate(target).operator() {
                Operator::Or => {
                    self.graph.add_arg(target, Ref::positive(node));
                }
                Operator::And | Operator::AtLeast => {
                    // OR(old_destination_clone, node).
                    let operator = self.graph.gate(target).operator();
                    let new_gate = self.graph.add_gate(operator);
                    if operator == Operator::AtLeast {
                        let vote = self.graph.gate(target).vote_number();
                        self.graph.set_vote_number(new_gate, vote);
                    }
                    self.graph.copy_args(new_gate, target);
                    self.graph.erase_all_args(target);
                    self.graph.set_operator(target, Operator::Or);
                    self.graph.add_arg(target, Ref::positive(new_gate));
                    self.graph.add_arg(target, Ref::positive(node));
                }
                other => unreachable!("failure destination of type {}", other),
            }
        }
    }
}

// Gate coalescence.
impl Preprocessor<'_> {
    /// Absorbs same-operator positive non-module argument gates into their
    /// parents. Returns true if the graph changed; gates that turn
    /// constant through argument reductions are registered for
    /// propagation.
    fn join_gates(&mut self, gate: u32) -> bool {
        if self.graph.node(gate).mark() {
            return false;
        }
        self.graph.node_mut(gate).set_mark(true);

        let target_type = match self.graph.gate(gate).operator() {
            Operator::Nand | Operator::And => Some(Operator::And),
            Operator::Nor | Operator::Or => Some(Operator::Or),
            _ => None,
        };

        let mut to_join: Vec<Ref> = Vec::new();
        let mut changed = false;
        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            changed |= self.join_gates(arg.index());

            let Some(target) = target_type else { continue };
            if arg.is_negated() {
                continue; // Cannot join a complemented argument gate.
            }
            if self.graph.gate(arg.index()).is_module() {
                continue; // Modules stay intact.
            }
            if self.graph.gate(arg.index()).operator() == target {
                to_join.push(arg);
            }
        }

        if !to_join.is_empty() {
            changed = true;
        }
        for arg in to_join {
            self.graph.join_gate(gate, arg);
            if self.graph.gate(gate).state() != State::Normal {
                self.const_gates.push(gate); // Register for future processing.
                return true; // The parent is constant; stop joining.
            }
        }
        changed
    }
}

// Module detection.
impl Preprocessor<'_> {
    /// Two-pass module detection: DFS timing, then locality analysis.
    fn detect_modules(&mut self) {
        debug!("detecting modules...");
        self.graph.clear_node_visits();

        let root = self.graph.root();
        self.assign_timing(0, root);

        self.graph.clear_gate_marks();
        self.find_modules(root);

        debug_assert!(!self.graph.node(root).revisited());
        debug_assert_eq!(self.graph.node(root).min_time(), 1);
        debug_assert_eq!(
            self.graph.node(root).max_time(),
            self.graph.node(root).exit_time()
        );
    }

    /// Pre-order enter and post-order exit timestamps for gates; leaves
    /// get an enter == exit stamp on first encounter and last-visit
    /// updates afterwards.
    fn assign_timing(&mut self, mut time: i32, gate: u32) -> i32 {
        time += 1;
        if self.graph.node_mut(gate).visit(time) {
            return time; // Revisited gate.
        }
        debug_assert!(self.graph.gate(gate).constant_args().is_empty());

        let gate_args: Vec<u32> = self
            .graph
            .gate(gate)
            .gate_args()
            .iter()
            .map(|r| r.index())
            .collect();
        for arg in gate_args {
            time = self.assign_timing(time, arg);
        }

        let var_args: Vec<u32> = self
            .graph
            .gate(gate)
            .variable_args()
            .iter()
            .map(|r| r.index())
            .collect();
        for arg in var_args {
            time += 1;
            self.graph.node_mut(arg).visit(time); // Enter the leaf.
            self.graph.node_mut(arg).visit(time); // Exit at the same time.
        }

        time += 1;
        let re_visited = self.graph.node_mut(gate).visit(time); // Exit the gate.
        debug_assert!(!re_visited); // No cyclic visiting.
        time
    }

    /// Original-module detection plus grouping of modular arguments into
    /// new sub-modules.
    fn find_modules(&mut self, gate: u32) {
        if self.graph.node(gate).mark() {
            return;
        }
        self.graph.node_mut(gate).set_mark(true);
        let enter_time = self.graph.node(gate).enter_time();
        let exit_time = self.graph.node(gate).exit_time();
        let mut min_time = enter_time;
        let mut max_time = exit_time;

        let mut non_shared_args: Vec<Ref> = Vec::new();
        let mut modular_args: Vec<Ref> = Vec::new();
        let mut non_modular_args: Vec<Ref> = Vec::new();

        let gate_args: Vec<Ref> = self.graph.gate(gate).gate_args().iter().copied().collect();
        for arg in gate_args {
            let arg_gate = arg.index();
            self.find_modules(arg_gate);
            if self.graph.gate(arg_gate).is_module() && !self.graph.node(arg_gate).revisited() {
                debug_assert_eq!(self.graph.node(arg_gate).parents().len(), 1);
                debug_assert!(self.graph.node(arg_gate).parents().contains(&gate));

                non_shared_args.push(arg);
                continue; // The sub-tree's visit times are in (enter, exit).
            }
            let min = self.graph.node(arg_gate).min_time();
            let max = self.graph.node(arg_gate).max_time();
            debug_assert!(min > 0);
            debug_assert!(max > min);
            if min > enter_time && max < exit_time {
                modular_args.push(arg);
            } else {
                non_modular_args.push(arg);
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        let var_args: Vec<Ref> = self.graph.gate(gate).variable_args().iter().copied().collect();
        for arg in var_args {
            let node = self.graph.node(arg.index());
            let min = node.enter_time();
            let max = node.last_visit();
            debug_assert!(min > 0);
            debug_assert!(max > 0);
            if min == max {
                debug_assert!(min > enter_time && max < exit_time);
                debug_assert_eq!(node.parents().len(), 1);
                non_shared_args.push(arg);
                continue; // The single-parent argument.
            }
            debug_assert!(max > min);
            if min > enter_time && max < exit_time {
                modular_args.push(arg);
            } else {
                non_modular_args.push(arg);
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        // This gate is an original module iff all descendants are local.
        if min_time == enter_time && max_time == exit_time {
            debug!("found original module: gate {}", gate);
            debug_assert_eq!(
                modular_args.len() + non_shared_args.len(),
                self.graph.gate(gate).args().len()
            );
            self.graph.turn_module(gate);
        }

        max_time = max_time.max(self.graph.node(gate).last_visit());
        self.graph.node_mut(gate).set_min_time(min_time);
        self.graph.node_mut(gate).set_max_time(max_time);

        // New sub-modules only make sense under AND/OR logic.
        match self.graph.gate(gate).operator() {
            Operator::And | Operator::Or | Operator::Nand | Operator::Nor => {
                self.create_new_module(gate, &non_shared_args);

                self.filter_modular_args(&mut modular_args, &mut non_modular_args);
                debug_assert_ne!(modular_args.len(), 1); // One modular arg is non-shared.
                let groups = self.group_modular_args(&modular_args);
                self.create_new_modules(gate, &modular_args, &groups);
            }
            _ => {}
        }
    }

    /// Wraps the given arguments of the gate into a fresh module gate of
    /// the same base operator. Returns None when the group is trivial or
    /// covers the whole gate.
    fn create_new_module(&mut self, gate: u32, args: &[Ref]) -> Option<u32> {
        if args.len() < 2 {
            return None;
        }
        if args.len() == self.graph.gate(gate).args().len() {
            debug_assert!(self.graph.gate(gate).is_module());
            return None;
        }
        debug_assert!(args.len() < self.graph.gate(gate).args().len());
        let operator = match self.graph.gate(gate).operator() {
            Operator::Nand | Operator::And => Operator::And,
            Operator::Nor | Operator::Or => Operator::Or,
            _ => return None, // Cannot create sub-modules for other types.
        };
        let module = self.graph.add_gate(operator);
        self.graph.turn_module(module);
        self.graph.node_mut(module).set_mark(true);
        for &arg in args {
            self.graph.transfer_arg(arg, gate, module);
        }
        self.graph.add_arg(gate, Ref::positive(module));
        debug_assert!(self.graph.gate(gate).args().len() > 1);
        debug!(
            "created module gate {} for gate {} with {} non-shared arguments",
            module,
            gate,
            args.len()
        );
        Some(module)
    }

    /// Moves modular candidates whose time ranges overlap any non-modular
    /// range into the non-modular set, to a fixed point.
    fn filter_modular_args(
        &mut self,
        modular_args: &mut Vec<Ref>,
        non_modular_args: &mut Vec<Ref>,
    ) {
        if modular_args.is_empty() || non_modular_args.is_empty() {
            return;
        }
        let mut still_modular: Vec<Ref> = Vec::new();
        let mut new_non_modular: Vec<Ref> = Vec::new();
        for &arg in modular_args.iter() {
            let min = self.graph.node(arg.index()).min_time();
            let max = self.graph.node(arg.index()).max_time();
            let overlaps = non_modular_args.iter().any(|&other| {
                let lower = self.graph.node(other.index()).min_time();
                let upper = self.graph.node(other.index()).max_time();
                min.max(lower) <= max.min(upper)
            });
            if overlaps {
                new_non_modular.push(arg);
            } else {
                still_modular.push(arg);
            }
        }
        self.filter_modular_args(&mut still_modular, &mut new_non_modular);
        *modular_args = still_modular;
        non_modular_args.extend(new_non_modular);
    }

    /// Groups modular arguments with pairwise-overlapping time ranges.
    fn group_modular_args(&self, modular_args: &[Ref]) -> Vec<Vec<Ref>> {
        let mut groups: Vec<Vec<Ref>> = Vec::new();
        if modular_args.is_empty() {
            return groups;
        }
        debug_assert!(modular_args.len() > 1);
        let mut to_check: Vec<Ref> = modular_args.to_vec();
        while let Some(first) = to_check.pop() {
            let mut group = vec![first];
            let mut low = self.graph.node(first.index()).min_time();
            let mut high = self.graph.node(first.index()).max_time();

            let mut prev_size = 0;
            while prev_size < group.len() {
                prev_size = group.len();
                let mut next_check: Vec<Ref> = Vec::new();
                for &arg in to_check.iter() {
                    let min = self.graph.node(arg.index()).min_time();
                    let max = self.graph.node(arg.index()).max_time();
                    if min.max(low) <= max.min(high) {
                        // Overlapping time ranges share variables.
                        group.push(arg);
                        low = low.min(min);
                        high = high.max(max);
                    } else {
                        next_check.push(arg);
                    }
                }
                to_check = next_check;
            }
            debug_assert!(group.len() > 1);
            groups.push(group);
        }
        groups
    }

    /// Materializes the groups as sub-module gates.
    fn create_new_modules(&mut self, gate: u32, modular_args: &[Ref], groups: &[Vec<Ref>]) {
        if modular_args.is_empty() {
            return;
        }
        debug_assert!(modular_args.len() > 1);
        debug_assert!(!groups.is_empty());
        if modular_args.len() == self.graph.gate(gate).args().len() && groups.len() == 1 {
            debug_assert!(self.graph.gate(gate).is_module());
            return;
        }
        let main_arg = if modular_args.len() == self.graph.gate(gate).args().len() {
            debug_assert!(groups.len() > 1);
            debug_assert!(self.graph.gate(gate).is_module());
            gate
        } else {
            match self.create_new_module(gate, modular_args) {
                Some(module) => module,
                None => return,
            }
        };
        for group in groups {
            self.create_new_module(main_arg, group);
        }
    }
}
