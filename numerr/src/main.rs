#![forbid(unsafe_code)]

mod config;
mod report;
mod trace;

use std::iter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use numerr_expr::{Query, find_symbolic_objects};
use numerr_solver::{ErrorSolver, ExhaustiveBackend, SolverBackend, benchmark};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{BackendKind, ConfigError, ResolvedConfig, load_config};
use crate::report::{CheckReport, CheckVerdict, ObjectValue, Outcome};
use crate::trace::{BoundCheck, load_trace, replay};

#[derive(Parser, Debug)]
#[command(
    name = "numerr",
    version,
    about = "Symbolic tracking of numerical error along execution traces"
)]
struct Cli {
    /// Config file to use instead of the `numerr.toml` found next to the trace.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (`NUMERR_LOG` takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Replay a JSON trace and print its error-bound report.
    Replay {
        trace: PathBuf,

        /// Decide every bound check with the solver.
        #[arg(long, default_value_t = false)]
        check: bool,

        #[arg(long, value_enum)]
        backend: Option<BackendKind>,

        /// Solver timeout in seconds; 0 disables it.
        #[arg(long)]
        timeout: Option<f64>,

        /// Also print the error store after the run.
        #[arg(long, default_value_t = false)]
        dump_store: bool,

        /// Print check verdicts as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the SMT-LIB query behind every bound check of a trace.
    ConstraintLog { trace: PathBuf },
}

/// Config file values with command-line overrides applied.
#[derive(Debug, Clone)]
struct Settings {
    backend: BackendKind,
    timeout: f64,
    max_assignments: u64,
    dump_store: bool,
}

fn resolve_settings(
    resolved: &ResolvedConfig,
    backend: Option<BackendKind>,
    timeout: Option<f64>,
    dump_store: bool,
) -> Result<Settings, ConfigError> {
    let cfg = &resolved.config;
    let timeout = timeout.unwrap_or(cfg.solver.timeout);
    if timeout.is_nan() || timeout < 0.0 {
        return Err(ConfigError {
            message: format!("--timeout must be a non-negative number of seconds, got {timeout}"),
        });
    }
    Ok(Settings {
        backend: backend.unwrap_or(cfg.solver.backend),
        timeout,
        max_assignments: cfg.solver.max_assignments,
        dump_store: dump_store || cfg.report.dump_store,
    })
}

fn make_backend(
    kind: BackendKind,
    max_assignments: u64,
) -> Result<Box<dyn SolverBackend>, ConfigError> {
    match kind {
        BackendKind::Exhaustive => Ok(Box::new(ExhaustiveBackend::new(max_assignments))),
        #[cfg(feature = "z3")]
        BackendKind::Z3 => Ok(Box::new(numerr_solver::z3_backend::Z3Backend::new())),
        #[cfg(not(feature = "z3"))]
        BackendKind::Z3 => Err(ConfigError {
            message: "numerr was built without the z3 backend; rebuild with `--features z3`"
                .to_string(),
        }),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("NUMERR_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn decide<B: SolverBackend>(solver: &mut ErrorSolver<B>, check: &BoundCheck) -> CheckVerdict {
    let mut verdict = CheckVerdict::undecided(check);
    let goal = check.goal();
    let query = Query::new(&check.constraints, goal.clone());

    match solver.compute_truth(&query) {
        Ok(true) => verdict.outcome = Outcome::Holds,
        Ok(false) => {
            verdict.outcome = Outcome::Violated;
            let objects = find_symbolic_objects(check.constraints.iter().chain(iter::once(&goal)));
            match solver.compute_initial_values(&query, &objects) {
                Ok(Some(values)) => {
                    verdict.counterexample = objects
                        .iter()
                        .zip(values)
                        .map(|(array, mut bytes)| {
                            bytes.truncate(array.size as usize);
                            ObjectValue {
                                array: array.name.clone(),
                                bytes,
                            }
                        })
                        .collect();
                }
                Ok(None) => debug!(check = %check.inst, "no counterexample on the second query"),
                Err(e) => verdict.reason = Some(e.to_string()),
            }
        }
        Err(e) => verdict.reason = Some(e.to_string()),
    }
    verdict
}

fn run_replay(
    trace_path: &Path,
    config: Option<&Path>,
    check: bool,
    json: bool,
    settings: impl FnOnce(&ResolvedConfig) -> Result<Settings, ConfigError>,
) -> miette::Result<()> {
    let resolved = load_config(config, trace_path)?;
    let settings = settings(&resolved)?;
    if let Some(path) = &resolved.config_path {
        info!(config = %path.display(), "using config");
    }

    let trace = load_trace(trace_path)?;
    let run = replay(&trace)?;
    info!(checks = run.checks.len(), "trace replayed");

    if !json {
        print!("{}", run.store.output());
        if settings.dump_store {
            println!("{}", run.store);
        }
    }

    if check {
        let backend = make_backend(settings.backend, settings.max_assignments)?;
        let mut solver = ErrorSolver::new(backend);
        solver.set_core_solver_timeout(settings.timeout);

        let verdicts: Vec<CheckVerdict> =
            run.checks.iter().map(|c| decide(&mut solver, c)).collect();
        let report = CheckReport::new(
            trace_path,
            solver.backend().name(),
            verdicts,
            solver.stats(),
        );
        if json {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        } else {
            if !run.checks.is_empty() {
                println!();
            }
            print!("{}", report.render_text());
        }
        debug!(stats = %solver.stats(), violated = report.violated(), "checks done");
    }
    Ok(())
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Cmd::Replay {
            trace,
            check,
            backend,
            timeout,
            dump_store,
            json,
        } => run_replay(&trace, cli.config.as_deref(), check, json, |resolved| {
            resolve_settings(resolved, backend, timeout, dump_store)
        }),
        Cmd::ConstraintLog { trace } => {
            let trace = load_trace(&trace)?;
            let run = replay(&trace)?;
            for (i, check) in run.checks.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                let query = Query::new(&check.constraints, check.goal());
                print!("{}", benchmark(&query));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::trace::parse_trace;
    use numerr_solver::SatResult;
    use numerr_solver::scripted::ScriptedBackend;

    fn resolved(raw: &str) -> ResolvedConfig {
        ResolvedConfig {
            config_path: None,
            config: parse_config(raw).unwrap(),
        }
    }

    #[test]
    fn flags_override_the_config_file() {
        let file = resolved("[solver]\ntimeout = 2.0\n[report]\ndump_store = true\n");
        let s = resolve_settings(&file, None, None, false).unwrap();
        assert_eq!(s.timeout, 2.0);
        assert!(s.dump_store);
        assert_eq!(s.backend, BackendKind::Exhaustive);

        let s = resolve_settings(&file, Some(BackendKind::Z3), Some(0.0), false).unwrap();
        assert_eq!(s.timeout, 0.0);
        assert_eq!(s.backend, BackendKind::Z3);

        assert!(resolve_settings(&file, None, Some(-3.0), false).is_err());
    }

    #[cfg(not(feature = "z3"))]
    #[test]
    fn z3_needs_the_feature() {
        let err = make_backend(BackendKind::Z3, 16).err().unwrap();
        assert!(err.message.contains("--features z3"));
    }

    #[test]
    fn undecided_checks_keep_the_reason() {
        let raw = r#"{
            "arrays": [{ "name": "x", "size": 1 }],
            "steps": [
                { "op": "symbolic", "id": 1, "array": "x", "width": 8 },
                { "op": "const", "id": 2, "value": 1, "width": 8 },
                { "op": "inst", "id": 3, "opcode": "add", "operands": [1, 2] },
                { "op": "check", "value": 3, "bound": 1.0 }
            ]
        }"#;
        let run = replay(&parse_trace(raw).unwrap()).unwrap();
        let backend = ScriptedBackend::new()
            .answer(SatResult::Unknown)
            .reason("timeout");
        let mut solver = ErrorSolver::new(backend);
        let verdict = decide(&mut solver, &run.checks[0]);
        assert_eq!(verdict.outcome, Outcome::Undecided);
        assert!(verdict.reason.is_some());
        assert_eq!(verdict.location, "");
    }
}
