use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::class_record::{ParseOptions, SelfEnclosurePolicy};
use crate::cli::Cli;
use crate::matcher::{CaseSensitivity, FloatComparison, MatchOptions};

pub const THREADS_ENV: &str = "CLASS_SEARCH_THREADS";
pub const CONFIG_ENV: &str = "CLASS_SEARCH_CONFIG";

/// Effective settings after merging flags, environment and config file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SearchConfig {
    /// Worker threads; 0 lets rayon choose.
    pub threads: usize,
    pub case_sensitivity: CaseSensitivity,
    pub float_comparison: FloatComparison,
    pub self_enclosure: SelfEnclosurePolicy,
}

impl SearchConfig {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitivity: self.case_sensitivity,
            float_comparison: self.float_comparison,
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            self_enclosure: self.self_enclosure,
        }
    }
}

/// On-disk form; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub threads: Option<usize>,
    pub ignore_case: Option<bool>,
    pub float_tolerance: Option<f64>,
    pub self_enclosure: Option<SelfEnclosurePolicy>,
}

/// Flag > environment > config file > default.
pub fn resolve_config(cli: &Cli) -> Result<SearchConfig> {
    resolve_with(cli, |key| env::var(key).ok())
}

fn resolve_with(cli: &Cli, var: impl Fn(&str) -> Option<String>) -> Result<SearchConfig> {
    let file = match resolve_config_path(cli, &var)? {
        Some(path) => load_file_config(&path)?,
        None => FileConfig::default(),
    };

    let threads = match (cli.threads, var(THREADS_ENV)) {
        (Some(n), _) => n,
        (None, Some(raw)) => raw
            .trim()
            .parse()
            .with_context(|| format!("{THREADS_ENV} is not a thread count: {raw:?}"))?,
        (None, None) => file.threads.unwrap_or(0),
    };

    let case_sensitivity = if cli.ignore_case || file.ignore_case == Some(true) {
        CaseSensitivity::Insensitive
    } else {
        CaseSensitivity::Sensitive
    };

    let float_comparison = match cli.float_tolerance.or(file.float_tolerance) {
        Some(eps) if eps.is_finite() && eps >= 0.0 => FloatComparison::Tolerance(eps),
        Some(eps) => anyhow::bail!("float tolerance must be a non-negative number, got {eps}"),
        None => FloatComparison::Exact,
    };

    let self_enclosure = if cli.reject_self_enclosure {
        SelfEnclosurePolicy::Reject
    } else {
        file.self_enclosure.unwrap_or_default()
    };

    Ok(SearchConfig {
        threads,
        case_sensitivity,
        float_comparison,
        self_enclosure,
    })
}

/// An explicitly named file must exist; the default location is optional.
fn resolve_config_path(
    cli: &Cli,
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>> {
    if let Some(p) = cli.config.clone() {
        return Ok(Some(p));
    }
    if let Some(p) = var(CONFIG_ENV) {
        return Ok(Some(PathBuf::from(p)));
    }
    let default_path = default_config_path()?;
    Ok(default_path.exists().then_some(default_path))
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve config directory"))?;
    Ok(base.join("class-search").join("config.json"))
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
