//! Fault-tree analysis: the full pipeline and the cut-set sink.
//!
//! [`FaultTreeAnalysis`] drives a validated model through graph
//! construction, preprocessing, BDD and ZBDD construction, and
//! minimal-cut-set enumeration. The resulting [`Analysis`] holds the cut
//! sets translated back to event names, plus probability figures over
//! the enumerated sets when requested.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use itertools::Itertools;
use log::debug;

use crate::bdd::Bdd;
use crate::error::{Error, Result};
use crate::graph::BooleanGraph;
use crate::model::FaultTree;
use crate::preprocessor::Preprocessor;
use crate::settings::Settings;
use crate::types::State;
use crate::zbdd::Zbdd;

/// A cut set as an unordered collection of basic-event names.
pub type CutSet = BTreeSet<String>;

/// The analysis driver.
pub struct FaultTreeAnalysis {
    settings: Settings,
}

impl FaultTreeAnalysis {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the minimal-cut-set analysis over a fault-tree model.
    ///
    /// The model is validated first; only coherent trees (no NOT, NAND,
    /// NOR, XOR logic) are accepted for cut-set generation.
    pub fn analyze(&self, tree: &FaultTree) -> Result<Analysis> {
        tree.validate()?;
        let mut graph = BooleanGraph::from_model(tree)?;
        if !graph.is_coherent() {
            return Err(Error::Validation(
                "the fault tree is not coherent; \
                 only coherent analysis is supported"
                    .to_string(),
            ));
        }

        Preprocessor::new(&mut graph).process();

        let root_state = graph.gate(graph.root()).state();
        let index_sets: Vec<Vec<u32>> = match root_state {
            State::Null => Vec::new(), // The top event is unreachable.
            State::Unity => vec![Vec::new()], // The top event is certain.
            State::Normal => {
                let bdd = Bdd::from_graph(&graph);
                let mut zbdd = Zbdd::from_bdd(&bdd, &self.settings);
                zbdd.analyze()
            }
        };

        // Module expansion can exceed the requested cardinality bound.
        let limit = self.settings.cut_set_limit();
        let index_sets: Vec<Vec<u32>> = if limit > 0 {
            index_sets.into_iter().filter(|s| s.len() <= limit).collect()
        } else {
            index_sets
        };

        let cut_sets: Vec<CutSet> = index_sets
            .iter()
            .map(|set| {
                set.iter()
                    .map(|&index| graph.variable_name(index).to_string())
                    .collect()
            })
            .collect();
        debug!("analysis produced {} minimal cut sets", cut_sets.len());

        let mut analysis = Analysis {
            cut_sets,
            probabilities: HashMap::new(),
            p_total: None,
        };
        if self.settings.probability_analysis() {
            analysis.probabilities = Self::gather_probabilities(tree, &analysis.cut_sets)?;
            analysis.p_total = Some(analysis.rare_event_probability()?);
        }
        Ok(analysis)
    }

    fn gather_probabilities(
        tree: &FaultTree,
        cut_sets: &[CutSet],
    ) -> Result<HashMap<String, f64>> {
        let mut probabilities = HashMap::new();
        for cut_set in cut_sets {
            for event in cut_set {
                if probabilities.contains_key(event) {
                    continue;
                }
                let p = tree.probability(event).ok_or_else(|| {
                    Error::Validation(format!(
                        "basic event '{}' has no probability for probability analysis",
                        event
                    ))
                })?;
                probabilities.insert(event.clone(), p);
            }
        }
        Ok(probabilities)
    }
}

/// The result of a cut-set analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    cut_sets: Vec<CutSet>,
    probabilities: HashMap<String, f64>,
    p_total: Option<f64>,
}

impl Analysis {
    /// The minimal cut sets, in no particular order. An empty collection
    /// means the top event is unreachable; a single empty set means it is
    /// certain.
    pub fn cut_sets(&self) -> &[CutSet] {
        &self.cut_sets
    }

    pub fn num_cut_sets(&self) -> usize {
        self.cut_sets.len()
    }

    /// The total probability computed during the analysis, if probability
    /// analysis was requested in the settings.
    pub fn p_total(&self) -> Option<f64> {
        self.p_total
    }

    /// The probability of one cut set: the product over its events.
    fn cut_set_probability(&self, cut_set: &CutSet) -> Result<f64> {
        let mut product = 1.0;
        for event in cut_set {
            let p = self.probabilities.get(event).ok_or_else(|| {
                Error::Validation(format!("no probability for basic event '{}'", event))
            })?;
            product *= p;
        }
        Ok(product)
    }

    /// The rare-event approximation: the sum of cut-set probabilities.
    pub fn rare_event_probability(&self) -> Result<f64> {
        let mut total = 0.0;
        for cut_set in &self.cut_sets {
            total += self.cut_set_probability(cut_set)?;
        }
        Ok(total)
    }

    /// The min-cut-set upper bound: `1 - prod(1 - P(cs))`.
    pub fn mcub_probability(&self) -> Result<f64> {
        let mut complement = 1.0;
        for cut_set in &self.cut_sets {
            complement *= 1.0 - self.cut_set_probability(cut_set)?;
        }
        Ok(1.0 - complement)
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.cut_sets
                .iter()
                .map(|cut_set| format!("{{{}}}", cut_set.iter().join(", ")))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Formula;
    use crate::types::Operator;

    fn formula(operator: Operator, events: &[&str]) -> Formula {
        let mut f = Formula::new(operator);
        for event in events {
            f.add_event(*event).unwrap();
        }
        f
    }

    fn names(sets: &[&[&str]]) -> Vec<CutSet> {
        sets.iter()
            .map(|set| set.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn assert_mcs(analysis: &Analysis, expected: &[&[&str]]) {
        let mut actual: Vec<CutSet> = analysis.cut_sets().to_vec();
        let mut expected = names(expected);
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_single_and() {
        let mut tree = FaultTree::new("single_and");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        tree.add_gate("top", formula(Operator::And, &["a", "b"])).unwrap();
        tree.set_top("top");

        let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
        assert_mcs(&analysis, &[&["a", "b"]]);
    }

    #[test]
    fn test_non_coherent_rejected() {
        let mut tree = FaultTree::new("non_coherent");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        tree.add_gate("top", formula(Operator::Xor, &["a", "b"])).unwrap();
        tree.set_top("top");

        let result = FaultTreeAnalysis::new(Settings::default()).analyze(&tree);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_unreachable_top() {
        // top = AND(a, house_false) can never occur.
        let mut tree = FaultTree::new("unreachable");
        tree.add_basic_event("a").unwrap();
        tree.add_house_event("h", false).unwrap();
        tree.add_gate("top", formula(Operator::And, &["a", "h"])).unwrap();
        tree.set_top("top");

        let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
        assert!(analysis.cut_sets().is_empty());
    }

    #[test]
    fn test_certain_top() {
        // top = OR(a, house_true) always occurs.
        let mut tree = FaultTree::new("certain");
        tree.add_basic_event("a").unwrap();
        tree.add_house_event("h", true).unwrap();
        tree.add_gate("top", formula(Operator::Or, &["a", "h"])).unwrap();
        tree.set_top("top");

        let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
        assert_eq!(analysis.num_cut_sets(), 1);
        assert!(analysis.cut_sets()[0].is_empty());
    }

    #[test]
    fn test_probability_requires_data() {
        let mut tree = FaultTree::new("missing_probability");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        tree.add_gate("top", formula(Operator::And, &["a", "b"])).unwrap();
        tree.set_top("top");

        let mut settings = Settings::default();
        settings.set_probability_analysis(true);
        let result = FaultTreeAnalysis::new(settings).analyze(&tree);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_display() {
        let mut tree = FaultTree::new("display");
        tree.add_basic_event("a").unwrap();
        tree.add_basic_event("b").unwrap();
        tree.add_gate("top", formula(Operator::And, &["a", "b"])).unwrap();
        tree.set_top("top");

        let analysis = FaultTreeAnalysis::new(Settings::default()).analyze(&tree).unwrap();
        assert_eq!(analysis.to_string(), "{a, b}");
    }
}
