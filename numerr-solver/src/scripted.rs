#![forbid(unsafe_code)]

//! A [`SolverBackend`] that answers from a script and records what it was asked.

use std::collections::{HashMap, VecDeque};

use numerr_expr::{ArrayRef, ExprRef};

use crate::solver::{BoundTriple, Numeral, SatResult, SessionMode, SolverBackend, SolverParams};

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Open(SessionMode, SolverParams),
    /// Printed form of the asserted constraint.
    AssertConstraint(String),
    AssertNegatedGoal(String),
    Maximize(String),
    Check,
    Close,
}

/// Scripted answers are consumed one per `check`; once exhausted, checks answer `Unknown`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    answers: VecDeque<SatResult>,
    reason: String,
    model: HashMap<(String, u32), Numeral>,
    bounds: Vec<BoundTriple>,
    calls: Vec<BackendCall>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            reason: "unknown".to_string(),
            ..Self::default()
        }
    }

    pub fn answer(mut self, answer: SatResult) -> Self {
        self.answers.push_back(answer);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn model_value(mut self, array: &str, offset: u32, value: Numeral) -> Self {
        self.model.insert((array.to_string(), offset), value);
        self
    }

    /// Bound of the next objective, in objective order.
    pub fn bound(mut self, bound: BoundTriple) -> Self {
        self.bounds.push(bound);
        self
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }
}

impl SolverBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open_session(&mut self, mode: SessionMode, params: &SolverParams) {
        self.calls.push(BackendCall::Open(mode, *params));
    }

    fn assert_constraint(&mut self, constraint: &ExprRef) {
        self.calls
            .push(BackendCall::AssertConstraint(constraint.to_string()));
    }

    fn assert_negated_goal(&mut self, goal: &ExprRef) {
        self.calls
            .push(BackendCall::AssertNegatedGoal(goal.to_string()));
    }

    fn maximize(&mut self, object: &ArrayRef) {
        self.calls.push(BackendCall::Maximize(object.name.clone()));
    }

    fn check(&mut self) -> SatResult {
        self.calls.push(BackendCall::Check);
        self.answers.pop_front().unwrap_or(SatResult::Unknown)
    }

    fn reason_unknown(&mut self) -> String {
        self.reason.clone()
    }

    fn model_value(&mut self, array: &ArrayRef, offset: u32) -> Option<Numeral> {
        Some(
            self.model
                .get(&(array.name.clone(), offset))
                .copied()
                .unwrap_or(Numeral::Int(0)),
        )
    }

    fn upper_bound(&mut self, index: usize) -> Option<BoundTriple> {
        self.bounds.get(index).copied()
    }

    fn close_session(&mut self) {
        self.calls.push(BackendCall::Close);
    }
}
