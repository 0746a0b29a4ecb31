//! The indexed Boolean graph of a fault tree.
//!
//! The graph is an arena of integer-indexed nodes: gates, variables
//! (basic events), and constants (house events). Gates reference their
//! arguments through signed [`Ref`] edges; a negative edge means the
//! logical complement of the argument. Every node keeps a set of parent
//! indices as weak back-links: the gate-to-argument direction owns the
//! structure, and parent entries are re-checked on traversal because graph
//! rewrites detach them.
//!
//! All mutations go through the graph so the parent invariant holds at
//! every step: `g` is in `parents(h)` exactly when some signed edge to `h`
//! is among `args(g)`.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::error::Result;
use crate::model::{FaultTree, Formula};
use crate::reference::Ref;
use crate::types::{Operator, State};

/// The payload of an indexed node.
///
/// Dispatch is on this tag; there is no virtual anything.
#[derive(Debug)]
pub enum NodeKind {
    Gate(Gate),
    Variable,
    Constant(bool),
}

/// A node of the indexed graph: common bookkeeping plus the kind payload.
///
/// The visit area (three timestamps), the mark, and `opti_value` are
/// scratch space for the preprocessing passes; they carry no meaning
/// between passes.
#[derive(Debug)]
pub struct Node {
    index: u32,
    order: u32,
    visits: [i32; 3],
    min_time: i32,
    max_time: i32,
    mark: bool,
    opti_value: i32,
    parents: BTreeSet<u32>,
    kind: NodeKind,
}

impl Node {
    fn new(index: u32, kind: NodeKind) -> Self {
        Self {
            index,
            order: 0,
            visits: [0; 3],
            min_time: 0,
            max_time: 0,
            mark: false,
            opti_value: 0,
            parents: BTreeSet::new(),
            kind,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
    pub fn order(&self) -> u32 {
        self.order
    }
    pub fn parents(&self) -> &BTreeSet<u32> {
        &self.parents
    }
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn mark(&self) -> bool {
        self.mark
    }
    pub fn set_mark(&mut self, mark: bool) {
        self.mark = mark;
    }

    pub fn opti_value(&self) -> i32 {
        self.opti_value
    }
    pub fn set_opti_value(&mut self, value: i32) {
        self.opti_value = value;
    }

    /// Registers a visit and returns true if this is a re-visit
    /// (the third or later).
    ///
    /// The first two timestamps are the enter and exit times of the DFS;
    /// the third slot records the latest extra encounter.
    pub fn visit(&mut self, time: i32) -> bool {
        if self.visits[0] == 0 {
            self.visits[0] = time;
            false
        } else if self.visits[1] == 0 {
            self.visits[1] = time;
            false
        } else {
            self.visits[2] = time;
            true
        }
    }

    pub fn visited(&self) -> bool {
        self.visits[0] != 0
    }
    pub fn revisited(&self) -> bool {
        self.visits[2] != 0
    }
    pub fn enter_time(&self) -> i32 {
        self.visits[0]
    }
    pub fn exit_time(&self) -> i32 {
        self.visits[1]
    }
    /// The latest visit time of any kind.
    pub fn last_visit(&self) -> i32 {
        if self.visits[2] != 0 {
            self.visits[2]
        } else if self.visits[1] != 0 {
            self.visits[1]
        } else {
            self.visits[0]
        }
    }
    pub fn clear_visits(&mut self) {
        self.visits = [0; 3];
        self.min_time = 0;
        self.max_time = 0;
    }

    pub fn min_time(&self) -> i32 {
        self.min_time
    }
    pub fn max_time(&self) -> i32 {
        self.max_time
    }
    pub fn set_min_time(&mut self, time: i32) {
        self.min_time = time;
    }
    pub fn set_max_time(&mut self, time: i32) {
        self.max_time = time;
    }
}

/// An indexed gate: operator, state, and signed argument edges.
///
/// Arguments live in one set keyed by signed reference, with per-kind
/// subsets maintained alongside so passes can walk gate, variable, and
/// constant arguments without re-dispatching on the arena.
#[derive(Debug)]
pub struct Gate {
    operator: Operator,
    vote_number: u32,
    state: State,
    module: bool,
    num_failed_args: i32,
    args: BTreeSet<Ref>,
    gate_args: BTreeSet<Ref>,
    variable_args: BTreeSet<Ref>,
    constant_args: BTreeSet<Ref>,
}

impl Gate {
    fn new(operator: Operator) -> Self {
        Self {
            operator,
            vote_number: 0,
            state: State::Normal,
            module: false,
            num_failed_args: 0,
            args: BTreeSet::new(),
            gate_args: BTreeSet::new(),
            variable_args: BTreeSet::new(),
            constant_args: BTreeSet::new(),
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }
    pub fn state(&self) -> State {
        self.state
    }
    pub fn is_module(&self) -> bool {
        self.module
    }
    pub fn vote_number(&self) -> u32 {
        self.vote_number
    }

    pub fn args(&self) -> &BTreeSet<Ref> {
        &self.args
    }
    pub fn gate_args(&self) -> &BTreeSet<Ref> {
        &self.gate_args
    }
    pub fn variable_args(&self) -> &BTreeSet<Ref> {
        &self.variable_args
    }
    pub fn constant_args(&self) -> &BTreeSet<Ref> {
        &self.constant_args
    }

    /// Whether any polarity of the node is among the arguments.
    pub fn has_arg_index(&self, index: u32) -> bool {
        self.args.contains(&Ref::positive(index)) || self.args.contains(&Ref::negative(index))
    }

    /// The signed edge to the node, if any polarity of it is an argument.
    pub fn arg_edge(&self, index: u32) -> Option<Ref> {
        if self.args.contains(&Ref::positive(index)) {
            Some(Ref::positive(index))
        } else if self.args.contains(&Ref::negative(index)) {
            Some(Ref::negative(index))
        } else {
            None
        }
    }
}

/// The indexed Boolean graph with its root gate.
pub struct BooleanGraph {
    nodes: Vec<Node>,
    root: u32,
    coherent: bool,
    normal: bool,
    constants: bool,
    variables: Vec<u32>,
    var_names: HashMap<u32, String>,
}

impl BooleanGraph {
    /// An empty graph. The root must be set before use.
    pub fn new() -> Self {
        Self {
            // The 0th cell is a sentry so that node indices start from 1.
            nodes: vec![Node::new(0, NodeKind::Constant(false))],
            root: 0,
            coherent: true,
            normal: true,
            constants: false,
            variables: Vec::new(),
            var_names: HashMap::new(),
        }
    }

    pub fn root(&self) -> u32 {
        self.root
    }
    pub fn set_root(&mut self, gate: u32) {
        debug_assert!(self.is_gate(gate));
        self.root = gate;
    }
    pub fn is_coherent(&self) -> bool {
        self.coherent
    }
    pub fn is_normal(&self) -> bool {
        self.normal
    }
    pub fn has_constants(&self) -> bool {
        self.constants
    }
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }
    pub fn variables(&self) -> &[u32] {
        &self.variables
    }
    pub fn variable_name(&self, index: u32) -> &str {
        &self.var_names[&index]
    }

    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }
    pub fn node_mut(&mut self, index: u32) -> &mut Node {
        &mut self.nodes[index as usize]
    }

    pub fn is_gate(&self, index: u32) -> bool {
        matches!(self.node(index).kind, NodeKind::Gate(_))
    }
    pub fn is_variable(&self, index: u32) -> bool {
        matches!(self.node(index).kind, NodeKind::Variable)
    }
    pub fn is_constant(&self, index: u32) -> bool {
        matches!(self.node(index).kind, NodeKind::Constant(_))
    }

    /// The gate payload of the node. The node must be a gate.
    pub fn gate(&self, index: u32) -> &Gate {
        match &self.node(index).kind {
            NodeKind::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }
    fn gate_mut(&mut self, index: u32) -> &mut Gate {
        match &mut self.nodes[index as usize].kind {
            NodeKind::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }

    /// The boolean state of a constant node.
    pub fn constant_state(&self, index: u32) -> bool {
        match self.node(index).kind {
            NodeKind::Constant(state) => state,
            _ => panic!("node {} is not a constant", index),
        }
    }
}

impl Default for BooleanGraph {
    fn default() -> Self {
        Self::new()
    }
}

// Node creation.
impl BooleanGraph {
    fn next_index(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn add_gate(&mut self, operator: Operator) -> u32 {
        if !matches!(operator, Operator::And | Operator::Or) {
            self.normal = false;
        }
        if !operator.is_coherent() {
            self.coherent = false;
        }
        let index = self.next_index();
        self.nodes.push(Node::new(index, NodeKind::Gate(Gate::new(operator))));
        index
    }

    pub fn add_variable(&mut self, name: impl Into<String>) -> u32 {
        let index = self.next_index();
        let mut node = Node::new(index, NodeKind::Variable);
        // Creation order of variables is the initial variable ordering.
        node.order = self.variables.len() as u32 + 1;
        self.nodes.push(node);
        self.variables.push(index);
        self.var_names.insert(index, name.into());
        index
    }

    pub fn add_constant(&mut self, state: bool) -> u32 {
        let index = self.next_index();
        self.nodes.push(Node::new(index, NodeKind::Constant(state)));
        self.constants = true;
        index
    }
}

// Gate mutations. Each maintains the parent invariant.
impl BooleanGraph {
    pub fn set_operator(&mut self, gate: u32, operator: Operator) {
        self.gate_mut(gate).operator = operator;
    }

    pub fn set_vote_number(&mut self, gate: u32, vote: u32) {
        let g = self.gate_mut(gate);
        debug_assert_eq!(g.operator, Operator::AtLeast);
        g.vote_number = vote;
    }

    pub fn turn_module(&mut self, gate: u32) {
        self.gate_mut(gate).module = true;
    }

    /// Adds a signed argument edge to the gate.
    ///
    /// Duplicate absolute indices are reduced on insertion: a same-sign
    /// duplicate is folded idempotently, and an opposite-sign pair applies
    /// the operator's annihilator (`x AND !x -> 0`, `x OR !x -> 1`),
    /// possibly turning the gate constant. Returns `false` when the edge
    /// was not inserted as-is for either reason.
    pub fn add_arg(&mut self, gate: u32, arg: Ref) -> bool {
        debug_assert_eq!(self.gate(gate).state, State::Normal);
        debug_assert_ne!(gate, arg.index(), "a gate cannot be its own argument");

        if self.gate(gate).args.contains(&arg) {
            self.process_duplicate_arg(gate, arg);
            return false;
        }
        if self.gate(gate).args.contains(&-arg) {
            self.process_complement_arg(gate, arg);
            return false;
        }

        // The arena node kind is read before the gate is mutated.
        let is_gate_arg = self.is_gate(arg.index());
        let is_var_arg = self.is_variable(arg.index());
        let g = self.gate_mut(gate);
        g.args.insert(arg);
        if is_gate_arg {
            g.gate_args.insert(arg);
        } else if is_var_arg {
            g.variable_args.insert(arg);
        } else {
            g.constant_args.insert(arg);
        }
        self.nodes[arg.index() as usize].parents.insert(gate);
        true
    }

    /// `x AND x -> x` and friends; the duplicate edge is simply not added,
    /// except for the operators where duplication changes the logic.
    fn process_duplicate_arg(&mut self, gate: u32, arg: Ref) {
        match self.gate(gate).operator {
            Operator::And | Operator::Or | Operator::Nand | Operator::Nor | Operator::Not
            | Operator::Null => {} // Idempotent.
            Operator::Xor => {
                // x XOR x = 0.
                debug!("duplicate arg {} collapses XOR gate {}", arg, gate);
                self.nullify(gate);
            }
            Operator::AtLeast => self.process_atleast_duplicate(gate, arg),
        }
    }

    /// `ATLEAST(k; x, x, R) = (x AND ATLEAST(k-2; R)) OR ATLEAST(k; R)`.
    ///
    /// The gate is restructured in place into an OR over two fresh gates.
    fn process_atleast_duplicate(&mut self, gate: u32, arg: Ref) {
        let vote = self.gate(gate).vote_number;
        debug_assert!(vote >= 2);
        let rest: Vec<Ref> = self.gate(gate).args.iter().copied().filter(|&a| a != arg).collect();
        debug!(
            "duplicate arg {} restructures ATLEAST({}) gate {}",
            arg, vote, gate
        );

        self.erase_all_args(gate);
        self.set_operator(gate, Operator::Or);

        // ATLEAST(k; R) branch.
        if let Some(chance) = self.make_atleast(vote, &rest) {
            self.add_arg(gate, chance);
        }
        // (x AND ATLEAST(k-2; R)) branch.
        if vote == 2 {
            self.add_arg(gate, arg);
        } else if let Some(remainder) = self.make_atleast(vote - 2, &rest) {
            let and_gate = self.add_gate(Operator::And);
            self.add_arg(and_gate, arg);
            self.add_arg(and_gate, remainder);
            self.add_arg(gate, Ref::positive(and_gate));
        }

        let remaining = self.gate(gate).args.len();
        if remaining == 0 {
            self.nullify(gate);
        } else if remaining == 1 {
            self.set_operator(gate, Operator::Null);
        }
    }

    /// Builds a gate (or simpler) for "at least `vote` of `args`".
    /// Returns None for an unsatisfiable count.
    fn make_atleast(&mut self, vote: u32, args: &[Ref]) -> Option<Ref> {
        debug_assert!(vote >= 1);
        let n = args.len() as u32;
        if vote > n {
            return None;
        }
        if n == 1 {
            return Some(args[0]);
        }
        let operator = if vote == 1 {
            Operator::Or
        } else if vote == n {
            Operator::And
        } else {
            Operator::AtLeast
        };
        let new_gate = self.add_gate(operator);
        if operator == Operator::AtLeast {
            self.set_vote_number(new_gate, vote);
        }
        for &arg in args {
            self.add_arg(new_gate, arg);
        }
        Some(Ref::positive(new_gate))
    }

    /// Handles insertion of the complement of an existing argument.
    fn process_complement_arg(&mut self, gate: u32, arg: Ref) {
        debug!("complement arg {} reduces gate {}", arg, gate);
        match self.gate(gate).operator {
            Operator::And | Operator::Nor => self.nullify(gate),
            Operator::Or | Operator::Nand | Operator::Xor => self.make_unity(gate),
            Operator::AtLeast => {
                // Exactly one of the pair holds: ATLEAST(k-1) over the rest.
                let vote = self.gate(gate).vote_number - 1;
                self.erase_arg(gate, -arg);
                self.set_vote_number(gate, vote);
                let g = self.gate_mut(gate);
                if vote == 1 {
                    g.operator = Operator::Or;
                } else if g.args.len() as u32 == vote {
                    g.operator = Operator::And;
                }
                let remaining = self.gate(gate).args.len();
                if remaining == 0 {
                    // ATLEAST(k; x, !x) with k >= 2 counts exactly one.
                    self.nullify(gate);
                } else if remaining == 1 && self.gate(gate).operator != Operator::AtLeast {
                    self.set_operator(gate, Operator::Null);
                }
            }
            Operator::Not | Operator::Null => unreachable!("single-argument gate"),
        }
    }

    /// Removes the signed argument edge and the parent back-link.
    pub fn erase_arg(&mut self, gate: u32, arg: Ref) {
        let g = self.gate_mut(gate);
        let removed = g.args.remove(&arg);
        debug_assert!(removed, "gate {} has no arg {}", gate, arg);
        g.gate_args.remove(&arg);
        g.variable_args.remove(&arg);
        g.constant_args.remove(&arg);
        self.nodes[arg.index() as usize].parents.remove(&gate);
    }

    pub fn erase_all_args(&mut self, gate: u32) {
        let args: Vec<Ref> = self.gate(gate).args.iter().copied().collect();
        for arg in args {
            self.erase_arg(gate, arg);
        }
    }

    /// Flips the sign of an argument edge. Parent links are unaffected.
    pub fn invert_arg(&mut self, gate: u32, arg: Ref) {
        let g = self.gate_mut(gate);
        debug_assert!(g.args.contains(&arg));
        for set in [&mut g.args, &mut g.gate_args, &mut g.variable_args, &mut g.constant_args] {
            if set.remove(&arg) {
                set.insert(-arg);
            }
        }
    }

    /// Flips the signs of all argument edges.
    pub fn invert_args(&mut self, gate: u32) {
        let args: Vec<Ref> = self.gate(gate).args.iter().copied().collect();
        for arg in args {
            self.invert_arg(gate, arg);
        }
    }

    /// Copies one argument edge of `from` into gate `to`.
    pub fn share_arg(&mut self, arg: Ref, from: u32, to: u32) {
        debug_assert!(self.gate(from).args.contains(&arg));
        self.add_arg(to, arg);
    }

    /// Copies all argument edges of `from` into gate `to`.
    pub fn copy_args(&mut self, to: u32, from: u32) {
        let args: Vec<Ref> = self.gate(from).args.iter().copied().collect();
        for arg in args {
            if self.gate(to).state != State::Normal {
                break;
            }
            self.add_arg(to, arg);
        }
    }

    /// Moves one argument edge from gate `from` to gate `to`.
    pub fn transfer_arg(&mut self, arg: Ref, from: u32, to: u32) {
        self.erase_arg(from, arg);
        self.add_arg(to, arg);
    }

    /// Absorbs the argument gate referenced by `child` into `gate`
    /// (coalescing). The child edge must be positive.
    pub fn join_gate(&mut self, gate: u32, child: Ref) {
        debug_assert!(!child.is_negated(), "cannot join a complemented gate");
        let args: Vec<Ref> = self.gate(child.index()).args.iter().copied().collect();
        self.erase_arg(gate, child);
        for arg in args {
            self.add_arg(gate, arg);
            if self.gate(gate).state != State::Normal {
                return;
            }
        }
    }

    /// Replaces a NULL-typed child with its single argument,
    /// preserving the sign of the edge.
    pub fn join_null_gate(&mut self, gate: u32, child: Ref) {
        let child_gate = self.gate(child.index());
        debug_assert_eq!(child_gate.operator, Operator::Null);
        debug_assert_eq!(child_gate.args.len(), 1);
        let grand_arg = *child_gate.args.iter().next().expect("single argument");

        self.erase_arg(gate, child);
        self.add_arg(gate, grand_arg.with_sign(child.is_negated()));
    }

    /// Turns the gate into the constant False and detaches its arguments.
    pub fn nullify(&mut self, gate: u32) {
        self.gate_mut(gate).state = State::Null;
        self.erase_all_args(gate);
    }

    /// Turns the gate into the constant True and detaches its arguments.
    pub fn make_unity(&mut self, gate: u32) {
        self.gate_mut(gate).state = State::Unity;
        self.erase_all_args(gate);
    }
}

// Scratch state for the Boolean optimization pass.
impl BooleanGraph {
    /// Notifies the gate that one of its arguments has failed. Sets the
    /// gate's `opti_value` to 1 once the operator's failure criterion
    /// is met.
    pub fn arg_failed(&mut self, gate: u32) {
        if self.node(gate).opti_value == 1 {
            return;
        }
        let (operator, num_args, vote) = {
            let g = self.gate(gate);
            (g.operator, g.args.len() as i32, g.vote_number as i32)
        };
        let failed = match operator {
            Operator::Null | Operator::Or => true,
            Operator::And => {
                self.gate_mut(gate).num_failed_args += 1;
                self.gate(gate).num_failed_args == num_args
            }
            Operator::AtLeast => {
                self.gate_mut(gate).num_failed_args += 1;
                self.gate(gate).num_failed_args == vote
            }
            other => unreachable!("operator {} after normalization", other),
        };
        if failed {
            self.node_mut(gate).opti_value = 1;
        }
    }

    pub fn reset_arg_failure(&mut self, gate: u32) {
        self.gate_mut(gate).num_failed_args = 0;
    }
}

// Projection of the validated model onto the indexed graph.
impl BooleanGraph {
    /// Builds the indexed graph from a validated fault tree.
    ///
    /// Each basic event becomes one variable (ordered by first reference),
    /// each house event one constant, each gate and nested formula one
    /// indexed gate. The declared top gate becomes the root.
    pub fn from_model(tree: &FaultTree) -> Result<Self> {
        let top = tree.top()?;
        let mut graph = BooleanGraph::new();
        let mut variables: HashMap<String, u32> = HashMap::new();
        let mut constants: HashMap<String, u32> = HashMap::new();
        let mut gates: HashMap<String, u32> = HashMap::new();

        let root = graph.process_gate(tree, top, &mut variables, &mut constants, &mut gates);
        graph.root = root;
        debug!(
            "built graph: {} nodes, {} variables, root {}",
            graph.nodes.len() - 1,
            graph.variables.len(),
            root
        );
        Ok(graph)
    }

    fn process_gate(
        &mut self,
        tree: &FaultTree,
        name: &str,
        variables: &mut HashMap<String, u32>,
        constants: &mut HashMap<String, u32>,
        gates: &mut HashMap<String, u32>,
    ) -> u32 {
        if let Some(&index) = gates.get(name) {
            return index;
        }
        let formula = tree.gate(name).expect("validated gate reference");
        let index = self.process_formula(tree, formula, variables, constants, gates);
        gates.insert(name.to_string(), index);
        index
    }

    fn process_formula(
        &mut self,
        tree: &FaultTree,
        formula: &Formula,
        variables: &mut HashMap<String, u32>,
        constants: &mut HashMap<String, u32>,
        gates: &mut HashMap<String, u32>,
    ) -> u32 {
        let operator = formula.operator();
        let gate = self.add_gate(operator);
        if operator == Operator::AtLeast {
            let vote = formula.vote_number().expect("validated vote number");
            self.set_vote_number(gate, vote);
        }

        for arg in formula.event_args() {
            let arg_index = if tree.is_basic_event(arg) {
                *variables
                    .entry(arg.to_string())
                    .or_insert_with(|| self.add_variable(arg))
            } else if tree.is_house_event(arg) {
                let state = tree.house_event(arg).expect("checked house event");
                *constants
                    .entry(arg.to_string())
                    .or_insert_with(|| self.add_constant(state))
            } else {
                self.process_gate(tree, arg, variables, constants, gates)
            };
            self.add_arg(gate, Ref::positive(arg_index));
        }
        for nested in formula.formula_args() {
            let child = self.process_formula(tree, nested, variables, constants, gates);
            self.add_arg(gate, Ref::positive(child));
        }
        gate
    }
}

// Traversal helpers shared by the preprocessor and the decision diagrams.
impl BooleanGraph {
    /// Clears traversal marks of all gates reachable from the root.
    pub fn clear_gate_marks(&mut self) {
        self.clear_gate_marks_from(self.root);
    }

    fn clear_gate_marks_from(&mut self, gate: u32) {
        if !self.node(gate).mark {
            return;
        }
        self.node_mut(gate).set_mark(false);
        let children: Vec<u32> =
            self.gate(gate).gate_args.iter().map(|r| r.index()).collect();
        for child in children {
            self.clear_gate_marks_from(child);
        }
    }

    /// Clears visit times (and min/max) of every node under the root.
    pub fn clear_node_visits(&mut self) {
        self.clear_node_visits_from(self.root);
    }

    fn clear_node_visits_from(&mut self, gate: u32) {
        self.node_mut(gate).clear_visits();
        let gate_children: Vec<u32> =
            self.gate(gate).gate_args.iter().map(|r| r.index()).collect();
        let leaf_children: Vec<u32> = self
            .gate(gate)
            .variable_args
            .iter()
            .chain(self.gate(gate).constant_args.iter())
            .map(|r| r.index())
            .collect();
        for child in gate_children {
            self.clear_node_visits_from(child);
        }
        for leaf in leaf_children {
            self.node_mut(leaf).clear_visits();
        }
    }

    /// Clears `opti_value` and failure counters of every node under
    /// the root.
    pub fn clear_opti_values(&mut self) {
        self.clear_opti_values_from(self.root);
    }

    fn clear_opti_values_from(&mut self, gate: u32) {
        self.node_mut(gate).set_opti_value(0);
        self.reset_arg_failure(gate);
        let gate_children: Vec<u32> =
            self.gate(gate).gate_args.iter().map(|r| r.index()).collect();
        let var_children: Vec<u32> =
            self.gate(gate).variable_args.iter().map(|r| r.index()).collect();
        for child in gate_children {
            self.clear_opti_values_from(child);
        }
        for leaf in var_children {
            self.node_mut(leaf).set_opti_value(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        let mut graph = BooleanGraph::new();
        let g = graph.add_gate(Operator::And);
        let v = graph.add_variable("a");
        let c = graph.add_constant(true);
        assert_eq!((g, v, c), (1, 2, 3));
        assert_eq!(graph.node(v).order(), 1);
    }

    #[test]
    fn test_parent_invariant() {
        let mut graph = BooleanGraph::new();
        let g = graph.add_gate(Operator::And);
        let v = graph.add_variable("a");
        assert!(graph.add_arg(g, Ref::positive(v)));
        assert!(graph.node(v).parents().contains(&g));

        graph.erase_arg(g, Ref::positive(v));
        assert!(graph.node(v).parents().is_empty());
        assert!(graph.gate(g).args().is_empty());
    }

    #[test]
    fn test_duplicate_arg_idempotent() {
        let mut graph = BooleanGraph::new();
        let g = graph.add_gate(Operator::And);
        let v = graph.add_variable("a");
        assert!(graph.add_arg(g, Ref::positive(v)));
        assert!(!graph.add_arg(g, Ref::positive(v)));
        assert_eq!(graph.gate(g).args().len(), 1);
        assert_eq!(graph.gate(g).state(), State::Normal);
    }

    #[test]
    fn test_complement_annihilators() {
        let mut graph = BooleanGraph::new();
        let v = graph.add_variable("a");

        let and_gate = graph.add_gate(Operator::And);
        graph.add_arg(and_gate, Ref::positive(v));
        assert!(!graph.add_arg(and_gate, Ref::negative(v)));
        assert_eq!(graph.gate(and_gate).state(), State::Null);
        assert!(graph.gate(and_gate).args().is_empty());

        let or_gate = graph.add_gate(Operator::Or);
        graph.add_arg(or_gate, Ref::positive(v));
        assert!(!graph.add_arg(or_gate, Ref::negative(v)));
        assert_eq!(graph.gate(or_gate).state(), State::Unity);
    }

    #[test]
    fn test_complement_in_atleast() {
        // ATLEAST(2; x, !x, a, b) = ATLEAST(1; a, b) = OR(a, b).
        let mut graph = BooleanGraph::new();
        let x = graph.add_variable("x");
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");

        let gate = graph.add_gate(Operator::AtLeast);
        graph.set_vote_number(gate, 2);
        graph.add_arg(gate, Ref::negative(x));
        graph.add_arg(gate, Ref::positive(a));
        graph.add_arg(gate, Ref::positive(b));
        assert!(!graph.add_arg(gate, Ref::positive(x)));

        assert_eq!(graph.gate(gate).operator(), Operator::Or);
        assert_eq!(graph.gate(gate).args().len(), 2);
        assert!(!graph.gate(gate).has_arg_index(x));
    }

    #[test]
    fn test_join_null_gate_preserves_sign() {
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");

        let null_gate = graph.add_gate(Operator::Null);
        graph.add_arg(null_gate, Ref::positive(a));

        let parent = graph.add_gate(Operator::And);
        graph.add_arg(parent, Ref::negative(null_gate));
        graph.add_arg(parent, Ref::positive(b));

        graph.join_null_gate(parent, Ref::negative(null_gate));
        assert!(graph.gate(parent).args().contains(&Ref::negative(a)));
        assert!(!graph.gate(parent).has_arg_index(null_gate));
        assert!(!graph.node(null_gate).parents().contains(&parent));
    }

    #[test]
    fn test_join_gate_absorbs_args() {
        let mut graph = BooleanGraph::new();
        let a = graph.add_variable("a");
        let b = graph.add_variable("b");
        let c = graph.add_variable("c");

        let child = graph.add_gate(Operator::And);
        graph.add_arg(child, Ref::positive(b));
        graph.add_arg(child, Ref::positive(c));

        let parent = graph.add_gate(Operator::And);
        graph.add_arg(parent, Ref::positive(a));
        graph.add_arg(parent, Ref::positive(child));

        graph.join_gate(parent, Ref::positive(child));
        let args = graph.gate(parent).args();
        assert_eq!(args.len(), 3);
        assert!(args.contains(&Ref::positive(a)));
        assert!(args.contains(&Ref::positive(b)));
        assert!(args.contains(&Ref::positive(c)));
    }

    #[test]
    fn test_visit_protocol() {
        let mut graph = BooleanGraph::new();
        let v = graph.add_variable("a");
        let node = graph.node_mut(v);
        assert!(!node.visited());
        assert!(!node.visit(3));
        assert!(!node.visit(3));
        assert!(node.visit(7)); // Third visit is a re-visit.
        assert_eq!(node.enter_time(), 3);
        assert_eq!(node.exit_time(), 3);
        assert_eq!(node.last_visit(), 7);
        assert!(node.revisited());
    }

    #[test]
    fn test_from_model() {
        use crate::model::{FaultTree, Formula};

        let mut tree = FaultTree::new("small");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        tree.add_house_event("h", true).unwrap();
        let mut sub = Formula::new(Operator::And);
        sub.add_event("a").unwrap();
        sub.add_event("b").unwrap();
        tree.add_gate("g1", sub).unwrap();
        let mut top = Formula::new(Operator::Or);
        top.add_event("g1").unwrap();
        top.add_event("h").unwrap();
        tree.add_gate("top", top).unwrap();
        tree.set_top("top");
        tree.validate().unwrap();

        let graph = BooleanGraph::from_model(&tree).unwrap();
        assert!(graph.has_constants());
        assert!(graph.is_coherent());
        assert_eq!(graph.num_variables(), 2);
        let root = graph.gate(graph.root());
        assert_eq!(root.operator(), Operator::Or);
        assert_eq!(root.gate_args().len(), 1);
        assert_eq!(root.constant_args().len(), 1);
    }

    #[test]
    fn test_shared_gate_built_once() {
        use crate::model::{FaultTree, Formula};

        let mut tree = FaultTree::new("shared");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        let mut shared = Formula::new(Operator::And);
        shared.add_event("a").unwrap();
        shared.add_event("b").unwrap();
        tree.add_gate("shared", shared).unwrap();
        let mut g1 = Formula::new(Operator::Not);
        g1.add_event("shared").unwrap();
        tree.add_gate("g1", g1).unwrap();
        let mut top = Formula::new(Operator::Or);
        top.add_event("shared").unwrap();
        top.add_event("g1").unwrap();
        tree.add_gate("top", top).unwrap();
        tree.set_top("top");
        tree.validate().unwrap();

        let graph = BooleanGraph::from_model(&tree).unwrap();
        assert!(!graph.is_coherent());
        // The shared gate has two parents, not two copies.
        let root = graph.root();
        let shared_index = graph
            .gate(root)
            .gate_args()
            .iter()
            .map(|r| r.index())
            .find(|&g| graph.gate(g).operator() == Operator::And)
            .unwrap();
        assert_eq!(graph.node(shared_index).parents().len(), 2);
    }
}
