//! The in-memory fault-tree model.
//!
//! This is the validated input of the analysis core: named basic events,
//! house events (boolean constants), and gates whose formulas are Boolean
//! logic over event references. The model owns all user-facing validation;
//! once [`FaultTree::validate`] has passed, the core assumes a well-formed
//! tree and never reports user errors again.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::types::Operator;

/// A Boolean formula over named events and nested formulas.
#[derive(Debug, Clone)]
pub struct Formula {
    operator: Operator,
    vote_number: Option<u32>,
    event_args: Vec<String>,
    formula_args: Vec<Formula>,
}

impl Formula {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            vote_number: None,
            event_args: Vec::new(),
            formula_args: Vec::new(),
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The vote number of an ATLEAST formula.
    pub fn vote_number(&self) -> Result<u32> {
        self.vote_number
            .ok_or_else(|| Error::Logic("vote number is not set".to_string()))
    }

    pub fn set_vote_number(&mut self, number: u32) -> Result<()> {
        if self.operator != Operator::AtLeast {
            return Err(Error::Logic(format!(
                "the vote number can only be defined for 'atleast' formulas; \
                 the operator of this formula is '{}'",
                self.operator
            )));
        }
        if number < 2 {
            return Err(Error::InvalidArgument(
                "vote number cannot be less than 2".to_string(),
            ));
        }
        if self.vote_number.is_some() {
            return Err(Error::Logic("trying to re-assign a vote number".to_string()));
        }
        self.vote_number = Some(number);
        Ok(())
    }

    /// Adds a reference to a named event (basic, house, or gate).
    pub fn add_event(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.event_args.contains(&name) {
            return Err(Error::DuplicateArgument(name));
        }
        self.event_args.push(name);
        Ok(())
    }

    /// Adds a nested formula argument.
    pub fn add_formula(&mut self, formula: Formula) {
        self.formula_args.push(formula);
    }

    pub fn event_args(&self) -> &[String] {
        &self.event_args
    }
    pub fn formula_args(&self) -> &[Formula] {
        &self.formula_args
    }
    pub fn num_args(&self) -> usize {
        self.event_args.len() + self.formula_args.len()
    }

    /// Checks the arity rules of the operator.
    pub fn validate(&self) -> Result<()> {
        match self.operator {
            Operator::And | Operator::Or | Operator::Nand | Operator::Nor => {
                if self.num_args() < 2 {
                    return Err(Error::Validation(format!(
                        "'{}' formula must have 2 or more arguments",
                        self.operator
                    )));
                }
            }
            Operator::Not | Operator::Null => {
                if self.num_args() != 1 {
                    return Err(Error::Validation(format!(
                        "'{}' formula must have only one argument",
                        self.operator
                    )));
                }
            }
            Operator::Xor => {
                if self.num_args() != 2 {
                    return Err(Error::Validation(
                        "'xor' formula must have exactly 2 arguments".to_string(),
                    ));
                }
            }
            Operator::AtLeast => {
                let vote = self.vote_number()?;
                if self.num_args() <= vote as usize {
                    return Err(Error::Validation(format!(
                        "'atleast' formula must have more arguments than its vote number {}",
                        vote
                    )));
                }
            }
        }
        for nested in &self.formula_args {
            nested.validate()?;
        }
        Ok(())
    }
}

/// A fault tree: named events, gate formulas, and a declared top gate.
///
/// Iteration order of the containers is declaration order, which fixes the
/// variable ordering of the downstream decision diagrams.
#[derive(Debug, Clone, Default)]
pub struct FaultTree {
    name: String,
    basic_events: IndexMap<String, Option<f64>>,
    house_events: IndexMap<String, bool>,
    gates: IndexMap<String, Formula>,
    top: Option<String>,
}

impl FaultTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_basic_event(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.check_redefinition(&name)?;
        self.basic_events.insert(name, None);
        Ok(())
    }

    /// Assigns a failure probability to a basic event.
    pub fn set_probability(&mut self, name: &str, probability: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidArgument(format!(
                "probability of '{}' must be in [0, 1]: {}",
                name, probability
            )));
        }
        match self.basic_events.get_mut(name) {
            Some(slot) => {
                *slot = Some(probability);
                Ok(())
            }
            None => Err(Error::Validation(format!("undefined basic event '{}'", name))),
        }
    }

    pub fn add_house_event(&mut self, name: impl Into<String>, state: bool) -> Result<()> {
        let name = name.into();
        self.check_redefinition(&name)?;
        self.house_events.insert(name, state);
        Ok(())
    }

    pub fn add_gate(&mut self, name: impl Into<String>, formula: Formula) -> Result<()> {
        let name = name.into();
        self.check_redefinition(&name)?;
        self.gates.insert(name, formula);
        Ok(())
    }

    /// Declares the top gate of the tree.
    pub fn set_top(&mut self, name: impl Into<String>) {
        self.top = Some(name.into());
    }

    pub fn basic_events(&self) -> impl Iterator<Item = &str> {
        self.basic_events.keys().map(String::as_str)
    }
    pub fn probability(&self, name: &str) -> Option<f64> {
        self.basic_events.get(name).copied().flatten()
    }
    pub fn house_event(&self, name: &str) -> Option<bool> {
        self.house_events.get(name).copied()
    }
    pub fn gate(&self, name: &str) -> Option<&Formula> {
        self.gates.get(name)
    }
    pub fn is_basic_event(&self, name: &str) -> bool {
        self.basic_events.contains_key(name)
    }
    pub fn is_house_event(&self, name: &str) -> bool {
        self.house_events.contains_key(name)
    }

    /// The declared top gate.
    pub fn top(&self) -> Result<&str> {
        self.top
            .as_deref()
            .ok_or_else(|| Error::Validation("no top gate is declared".to_string()))
    }

    /// Validates the whole tree: arities, references, and acyclicity.
    pub fn validate(&self) -> Result<()> {
        let top = self.top()?;
        if !self.gates.contains_key(top) {
            return Err(Error::Validation(format!("undefined top gate '{}'", top)));
        }
        for (name, formula) in &self.gates {
            formula.validate()?;
            self.check_references(name, formula)?;
        }
        self.detect_cycles(top)?;
        Ok(())
    }

    fn check_redefinition(&self, name: &str) -> Result<()> {
        if self.basic_events.contains_key(name)
            || self.house_events.contains_key(name)
            || self.gates.contains_key(name)
        {
            return Err(Error::Validation(format!("redefinition of event '{}'", name)));
        }
        Ok(())
    }

    fn check_references(&self, gate: &str, formula: &Formula) -> Result<()> {
        for arg in formula.event_args() {
            if !self.basic_events.contains_key(arg)
                && !self.house_events.contains_key(arg)
                && !self.gates.contains_key(arg)
            {
                return Err(Error::Validation(format!(
                    "gate '{}' references undefined event '{}'",
                    gate, arg
                )));
            }
        }
        for nested in formula.formula_args() {
            self.check_references(gate, nested)?;
        }
        Ok(())
    }

    fn detect_cycles(&self, top: &str) -> Result<()> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            OnPath,
            Done,
        }

        fn visit(
            tree: &FaultTree,
            gate: &str,
            marks: &mut HashMap<String, Mark>,
            path: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(gate) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::OnPath) => {
                    let start = path.iter().position(|name| name == gate).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(gate.to_string());
                    return Err(Error::Cycle { path: cycle });
                }
                None => {}
            }
            marks.insert(gate.to_string(), Mark::OnPath);
            path.push(gate.to_string());
            let formula = tree.gates.get(gate).expect("checked references");
            descend(tree, formula, marks, path)?;
            path.pop();
            marks.insert(gate.to_string(), Mark::Done);
            Ok(())
        }

        fn descend(
            tree: &FaultTree,
            formula: &Formula,
            marks: &mut HashMap<String, Mark>,
            path: &mut Vec<String>,
        ) -> Result<()> {
            for arg in formula.event_args() {
                if tree.gates.contains_key(arg) {
                    visit(tree, arg, marks, path)?;
                }
            }
            for nested in formula.formula_args() {
                descend(tree, nested, marks, path)?;
            }
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut path = Vec::new();
        visit(self, top, &mut marks, &mut path)
    }
}
