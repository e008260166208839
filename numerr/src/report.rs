#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::Path;

use numerr_core::location_prefix;
use numerr_solver::SolverStats;
use serde::Serialize;

use crate::trace::BoundCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Holds,
    Violated,
    Undecided,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectValue {
    pub array: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckVerdict {
    pub check: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub bound: f64,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub counterexample: Vec<ObjectValue>,
}

impl CheckVerdict {
    pub fn undecided(check: &BoundCheck) -> Self {
        let location = location_prefix(&check.inst);
        Self {
            check: check.inst.to_string(),
            location: location.trim_end_matches(": ").to_string(),
            bound: check.bound,
            outcome: Outcome::Undecided,
            reason: None,
            counterexample: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub queries: u64,
    pub counterexamples: u64,
    pub valid: u64,
    pub invalid: u64,
    pub seconds: f64,
}

impl From<&SolverStats> for StatsReport {
    fn from(s: &SolverStats) -> Self {
        Self {
            queries: s.queries,
            counterexamples: s.query_counterexamples,
            valid: s.queries_valid,
            invalid: s.queries_invalid,
            seconds: s.query_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub schema: &'static str,
    pub trace: String,
    pub backend: &'static str,
    pub checks: Vec<CheckVerdict>,
    pub stats: StatsReport,
}

impl CheckReport {
    pub fn new(
        trace: &Path,
        backend: &'static str,
        checks: Vec<CheckVerdict>,
        stats: &SolverStats,
    ) -> Self {
        Self {
            schema: "numerr.check.v1",
            trace: trace.display().to_string(),
            backend,
            checks,
            stats: stats.into(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for v in &self.checks {
            let at = if v.location.is_empty() {
                v.check.clone()
            } else {
                format!("{} ({})", v.check, v.location)
            };
            let verdict = match v.outcome {
                Outcome::Holds => "holds".to_string(),
                Outcome::Violated => "violated".to_string(),
                Outcome::Undecided => format!(
                    "undecided: {}",
                    v.reason.as_deref().unwrap_or("no answer")
                ),
            };
            let _ = writeln!(out, "{at}: |error| <= {} {verdict}", v.bound);
            for obj in &v.counterexample {
                let bytes: Vec<String> = obj.bytes.iter().map(|b| format!("{b:#04x}")).collect();
                let _ = writeln!(out, "  {} = [{}]", obj.array, bytes.join(", "));
            }
        }
        let _ = writeln!(
            out,
            "{} queries ({} valid, {} invalid) in {:.3}s [{}]",
            self.stats.queries, self.stats.valid, self.stats.invalid, self.stats.seconds, self.backend
        );
        out
    }

    pub fn violated(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.outcome == Outcome::Violated)
            .count()
    }
}
