#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use numerr_expr::{ArrayRef, Assignment, Expr, ExprKind, ExprRef};
use tracing::{debug, trace};

use crate::solver::{BoundTriple, Numeral, SatResult, SessionMode, SolverBackend, SolverParams};

/// Default cap on the number of assignments one check may try.
pub const DEFAULT_MAX_ASSIGNMENTS: u64 = 1 << 20;

// how often the time budget is consulted
const CLOCK_STRIDE: u64 = 4096;

/// Decision procedure by enumeration of every byte a query reads.
///
/// Only queries whose reads all have constant indices are in scope, and only while the
/// number of candidate assignments stays under `max_assignments`. Anything else, including
/// optimization, is answered `Unknown` with reason `"unknown"`.
#[derive(Debug)]
pub struct ExhaustiveBackend {
    max_assignments: u64,
    mode: SessionMode,
    budget: Option<Duration>,
    formulas: Vec<ExprRef>,
    model: Option<Assignment>,
    reason: &'static str,
}

impl Default for ExhaustiveBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ASSIGNMENTS)
    }
}

impl ExhaustiveBackend {
    pub fn new(max_assignments: u64) -> Self {
        Self {
            max_assignments,
            mode: SessionMode::Check,
            budget: None,
            formulas: Vec::new(),
            model: None,
            reason: "unknown",
        }
    }

    fn give_up(&mut self, reason: &'static str) -> SatResult {
        self.reason = reason;
        SatResult::Unknown
    }

    fn search(&mut self, cells: &[(ArrayRef, u32)]) -> SatResult {
        let started = Instant::now();
        let mut buffers: HashMap<ArrayRef, Vec<u8>> = HashMap::new();
        for (array, _) in cells {
            buffers
                .entry(array.clone())
                .or_insert_with(|| vec![0; array.size as usize]);
        }

        let total = 1u64 << (8 * cells.len() as u32);
        for counter in 0..total {
            if counter % CLOCK_STRIDE == 0 && counter > 0 {
                if let Some(budget) = self.budget {
                    if started.elapsed() >= budget {
                        return self.give_up("timeout");
                    }
                }
            }
            for (i, (array, offset)) in cells.iter().enumerate() {
                let byte = (counter >> (8 * i)) as u8;
                if let Some(buf) = buffers.get_mut(array) {
                    buf[*offset as usize] = byte;
                }
            }

            let mut candidate = Assignment::default();
            for (array, bytes) in &buffers {
                candidate.bind(array.clone(), bytes.clone());
            }
            if candidate.satisfies(&self.formulas) {
                trace!(tried = counter + 1, "found model");
                self.model = Some(candidate);
                return SatResult::Sat;
            }
        }
        SatResult::Unsat
    }
}

/// Every `(array, byte)` read by `formulas`, or `None` if some index is symbolic.
fn read_cells(formulas: &[ExprRef]) -> Option<Vec<(ArrayRef, u32)>> {
    let mut cells = Vec::new();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<ExprRef> = formulas.iter().rev().cloned().collect();
    while let Some(e) = stack.pop() {
        if !visited.insert(e.clone()) {
            continue;
        }
        if let ExprKind::Read { array, index } = e.kind() {
            let offset = u32::try_from(index.as_constant()?).ok()?;
            if offset >= array.size {
                return None;
            }
            if seen.insert((array.clone(), offset)) {
                cells.push((array.clone(), offset));
            }
            continue;
        }
        stack.extend(e.kids().into_iter().rev().cloned());
    }
    Some(cells)
}

impl SolverBackend for ExhaustiveBackend {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn open_session(&mut self, mode: SessionMode, params: &SolverParams) {
        self.mode = mode;
        self.budget =
            (params.timeout_ms != u32::MAX).then(|| Duration::from_millis(params.timeout_ms.into()));
        self.formulas.clear();
        self.model = None;
        self.reason = "unknown";
    }

    fn assert_constraint(&mut self, constraint: &ExprRef) {
        self.formulas.push(constraint.clone());
    }

    fn assert_negated_goal(&mut self, goal: &ExprRef) {
        self.formulas.push(Expr::not(goal.clone()));
    }

    fn maximize(&mut self, _object: &ArrayRef) {}

    fn check(&mut self) -> SatResult {
        if self.mode == SessionMode::Optimize {
            return self.give_up("unknown");
        }
        let Some(cells) = read_cells(&self.formulas) else {
            debug!("symbolic read index, query out of scope");
            return self.give_up("unknown");
        };
        let within_cap = u32::try_from(8 * cells.len())
            .ok()
            .and_then(|bits| 1u64.checked_shl(bits))
            .is_some_and(|n| n <= self.max_assignments);
        if !within_cap {
            debug!(cells = cells.len(), cap = self.max_assignments, "too many bytes to enumerate");
            return self.give_up("unknown");
        }
        self.search(&cells)
    }

    fn reason_unknown(&mut self) -> String {
        self.reason.to_string()
    }

    fn model_value(&mut self, array: &ArrayRef, offset: u32) -> Option<Numeral> {
        let model = self.model.as_ref()?;
        // Model completion: bytes the query never read are zero.
        let byte = model
            .get(array)
            .and_then(|bytes| bytes.get(offset as usize))
            .copied()
            .unwrap_or(0);
        Some(Numeral::Int(byte.into()))
    }

    fn upper_bound(&mut self, _index: usize) -> Option<BoundTriple> {
        None
    }

    fn close_session(&mut self) {
        self.formulas.clear();
    }
}
