//! Reduced Ordered BDD with attributed (negation) edges.
//!
//! The BDD is built bottom-up from a preprocessed Boolean graph by ITE
//! composition of every gate's arguments. There is a single terminal
//! vertex; the constant False is the complemented edge to it. Canonical
//! form keeps the low edge positive, so the complement attribute lives on
//! the edge to the node itself.
//!
//! Each module gate of the graph induces an independent BDD rooted in its
//! own function; inside the parent function the module appears as a proxy
//! variable ordered after all basic events.

use std::collections::HashMap;

use log::debug;

use crate::cache::Cache;
use crate::graph::BooleanGraph;
use crate::reference::Ref;
use crate::storage::Storage;
use crate::types::{Operator, State};
use crate::utils::{pairing3, MyHash};

/// A non-terminal if-then-else vertex.
///
/// `index` is the Boolean-graph index of the variable (or of the module
/// gate for proxies); `order` is its position in the variable ordering.
/// The unique table key is the `(index, high, low)` triplet.
#[derive(Debug, Copy, Clone)]
pub struct Ite {
    pub index: u32,
    pub order: u32,
    pub module: bool,
    pub high: Ref,
    pub low: Ref,
}

impl MyHash for Ite {
    fn hash(&self) -> u64 {
        pairing3(self.index as u64, self.high.raw() as u64, self.low.raw() as u64)
    }
}

impl PartialEq for Ite {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.high == other.high && self.low == other.low
    }
}

impl Eq for Ite {}

/// The BDD manager holding the unique table and the computed table.
pub struct Bdd {
    storage: Storage<Ite>,
    ite_cache: Cache<(Ref, Ref, Ref), Ref>,
    /// Processed graph gates.
    gates: HashMap<u32, Ref>,
    /// Module index to the root function of its independent BDD.
    modules: HashMap<u32, Ref>,
    /// Order offset for module proxies: above every basic event.
    module_order_base: u32,
    root: Ref,
    one: Ref,
}

impl Bdd {
    const STORAGE_BITS: usize = 18;
    const CACHE_BITS: usize = 16;

    /// Converts a preprocessed, ordered Boolean graph into a BDD.
    pub fn from_graph(graph: &BooleanGraph) -> Self {
        let mut storage = Storage::new(Self::STORAGE_BITS);
        let terminal = storage.alloc();
        debug_assert_eq!(terminal, 1); // The terminal vertex is (1).
        let one = Ref::positive(terminal as u32);

        let mut bdd = Self {
            storage,
            ite_cache: Cache::new(Self::CACHE_BITS),
            gates: HashMap::new(),
            modules: HashMap::new(),
            module_order_base: graph.num_variables() as u32,
            root: one,
            one,
        };

        let root_gate = graph.root();
        bdd.root = match graph.gate(root_gate).state() {
            State::Null => bdd.zero(),
            State::Unity => bdd.one(),
            State::Normal => bdd.convert_gate(graph, root_gate),
        };
        debug!(
            "BDD built: {} vertices, {} modules",
            bdd.storage.real_size(),
            bdd.modules.len()
        );
        bdd
    }

    pub fn root(&self) -> Ref {
        self.root
    }
    pub fn one(&self) -> Ref {
        self.one
    }
    pub fn zero(&self) -> Ref {
        -self.one
    }

    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == self.one.index()
    }

    /// The stored vertex behind a non-terminal reference.
    pub fn ite(&self, node: Ref) -> Ite {
        debug_assert!(!self.is_terminal(node));
        self.storage.value(node.index() as usize)
    }

    /// The root function of a module's independent BDD.
    pub fn module(&self, index: u32) -> Ref {
        self.modules[&index]
    }

    fn order(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX // Terminals sort below every variable.
        } else {
            self.ite(node).order
        }
    }
}

// Construction from the Boolean graph.
impl Bdd {
    fn convert_gate(&mut self, graph: &BooleanGraph, gate: u32) -> Ref {
        if let Some(&result) = self.gates.get(&gate) {
            return result;
        }
        let operator = graph.gate(gate).operator();
        let args: Vec<Ref> = graph.gate(gate).args().iter().copied().collect();
        debug_assert!(!args.is_empty());

        let mut result: Option<Ref> = None;
        for arg in args {
            let arg_fn = self.convert_arg(graph, arg);
            result = Some(match result {
                None => arg_fn,
                Some(acc) => match operator {
                    Operator::And => self.apply_and(acc, arg_fn),
                    Operator::Or => self.apply_or(acc, arg_fn),
                    other => unreachable!("operator {} in a preprocessed graph", other),
                },
            });
        }
        let result = result.expect("at least one argument");
        self.gates.insert(gate, result);
        result
    }

    fn convert_arg(&mut self, graph: &BooleanGraph, arg: Ref) -> Ref {
        let index = arg.index();
        let positive = if graph.is_variable(index) {
            let order = graph.node(index).order();
            self.mk_var(index, order, false)
        } else {
            debug_assert!(graph.is_gate(index), "constants are preprocessed away");
            if graph.gate(index).is_module() {
                // The module becomes a proxy variable; its own function is
                // converted independently.
                if !self.modules.contains_key(&index) {
                    self.modules.insert(index, self.one); // Break recursion.
                    let function = self.convert_gate(graph, index);
                    self.modules.insert(index, function);
                }
                self.mk_var(index, self.module_order_base + index, true)
            } else {
                self.convert_gate(graph, index)
            }
        };
        positive.with_sign(arg.is_negated())
    }

    fn mk_var(&mut self, index: u32, order: u32, module: bool) -> Ref {
        self.mk_node(index, order, module, self.one, -self.one)
    }

    /// Finds or creates the vertex `(index, high, low)`.
    ///
    /// Keeps the canonical form: equal children collapse, and a
    /// complemented low edge is factored out to the result edge.
    fn mk_node(&mut self, index: u32, order: u32, module: bool, high: Ref, low: Ref) -> Ref {
        if high == low {
            return high;
        }
        if low.is_negated() {
            return -self.mk_node(index, order, module, -high, -low);
        }
        let i = self.storage.put(Ite {
            index,
            order,
            module,
            high,
            low,
        });
        Ref::positive(i as u32)
    }

    /// Cofactors of the function with respect to the variable at `order`.
    /// Returns `(high, low)`.
    fn cofactors(&self, node: Ref, order: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || order < self.order(node) {
            return (node, node);
        }
        debug_assert_eq!(order, self.order(node));
        let ite = self.ite(node);
        if node.is_negated() {
            (-ite.high, -ite.low)
        } else {
            (ite.high, ite.low)
        }
    }

    /// The `(index, module)` pair of the top vertex at `order` among the
    /// given functions.
    fn top_vertex(&self, order: u32, nodes: [Ref; 3]) -> (u32, bool) {
        for node in nodes {
            if !self.is_terminal(node) {
                let ite = self.ite(node);
                if ite.order == order {
                    return (ite.index, ite.module);
                }
            }
        }
        unreachable!("no vertex at order {}", order)
    }
}

// The ITE algorithm.
impl Bdd {
    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(f, g, h) = (f AND g) OR (NOT f AND h)
    /// ```
    pub fn apply_ite(&mut self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Terminal cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if f == self.one {
            return g;
        }
        if f == self.zero() {
            return h;
        }
        debug_assert!(!self.is_terminal(f));

        // More terminal cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if g == self.one && h == self.zero() {
            return f;
        }
        if g == self.zero() && h == self.one {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        let (mut g, mut h) = (g, h);
        if g == f {
            g = self.one;
        } else if g == -f {
            g = self.zero();
        }
        if h == f {
            h = self.zero();
        } else if h == -f {
            h = self.one;
        }
        if g == h {
            return g;
        }
        if g == self.one && h == self.zero() {
            return f;
        }
        if g == self.zero() && h == self.one {
            return -f;
        }

        // Make sure the first two arguments are regular (not negated).
        let mut f = f;
        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        debug_assert!(!f.is_negated());

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut complement = false;
        if g.is_negated() {
            complement = true;
            g = -g;
            h = -h;
        }
        debug_assert!(!g.is_negated());

        if let Some(&result) = self.ite_cache.get(&(f, g, h)) {
            return result.with_sign(complement);
        }

        // The top variable of the three functions.
        let order = self
            .order(f)
            .min(self.order(g))
            .min(self.order(h));
        debug_assert_ne!(order, u32::MAX);
        let (index, module) = self.top_vertex(order, [f, g, h]);

        let (f1, f0) = self.cofactors(f, order);
        let (g1, g0) = self.cofactors(g, order);
        let (h1, h0) = self.cofactors(h, order);

        let high = self.apply_ite(f1, g1, h1);
        let low = self.apply_ite(f0, g0, h0);

        let result = self.mk_node(index, order, module, high, low);
        self.ite_cache.insert((f, g, h), result);
        result.with_sign(complement)
    }

    pub fn apply_and(&mut self, u: Ref, v: Ref) -> Ref {
        let zero = self.zero();
        self.apply_ite(u, v, zero)
    }

    pub fn apply_or(&mut self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }
}
