#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

pub const CONFIG_FILE: &str = "numerr.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(numerr::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(clap::ValueEnum, serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Enumerate every byte the query reads (small domains only)
    #[default]
    Exhaustive,
    /// Z3 SMT solver (requires `--features z3`)
    Z3,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub backend: BackendKind,
    /// Seconds; 0 disables the timeout.
    pub timeout: f64,
    pub max_assignments: u64,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Exhaustive,
            timeout: 5.0,
            max_assignments: numerr_solver::DEFAULT_MAX_ASSIGNMENTS,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub dump_store: bool,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub solver: SolverSection,
    pub report: ReportSection,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(raw).map_err(|e| ConfigError {
        message: e.to_string(),
    })?;
    if config.solver.timeout.is_nan() || config.solver.timeout < 0.0 {
        return Err(ConfigError {
            message: format!(
                "solver.timeout must be a non-negative number of seconds, got {}",
                config.solver.timeout
            ),
        });
    }
    Ok(config)
}

/// Nearest `numerr.toml` in `start` or one of its ancestors.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

/// Load `explicit` if given, otherwise the config next to (or above) `trace`.
pub fn load_config(explicit: Option<&Path>, trace: &Path) -> Result<ResolvedConfig, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(trace),
    };
    let Some(path) = path else {
        return Ok(ResolvedConfig::default());
    };

    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let config = parse_config(&raw).map_err(|e| ConfigError {
        message: format!("failed to parse {}: {}", path.display(), e.message),
    })?;
    tracing::debug!(path = %path.display(), "loaded config");

    Ok(ResolvedConfig {
        config_path: Some(path),
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.solver.backend, BackendKind::Exhaustive);
        assert_eq!(cfg.solver.timeout, 5.0);
        assert!(!cfg.report.dump_store);
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse_config(
            r#"
            [solver]
            backend = "z3"
            timeout = 0.0
            max_assignments = 256

            [report]
            dump_store = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.solver.backend, BackendKind::Z3);
        assert_eq!(cfg.solver.timeout, 0.0);
        assert_eq!(cfg.solver.max_assignments, 256);
        assert!(cfg.report.dump_store);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(parse_config("[solver]\ntimeout = -1.0\n").is_err());
        assert!(parse_config("[solver]\nbackend = \"cvc5\"\n").is_err());
    }

    #[test]
    fn config_is_found_next_to_the_trace() {
        let dir = std::env::temp_dir().join(format!("numerr-config-{}", std::process::id()));
        let nested = dir.join("traces");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.join(CONFIG_FILE), "[report]\ndump_store = true\n").unwrap();

        let trace = nested.join("run.json");
        let resolved = load_config(None, &trace).unwrap();
        assert_eq!(resolved.config_path, Some(dir.join(CONFIG_FILE)));
        assert!(resolved.config.report.dump_store);

        let explicit = load_config(Some(&dir.join(CONFIG_FILE)), Path::new("/")).unwrap();
        assert!(explicit.config.report.dump_store);
        assert!(load_config(Some(&dir.join("absent.toml")), &trace).is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
