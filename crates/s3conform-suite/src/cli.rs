//! Command-line arguments of the `s3conform` binary.

use std::path::PathBuf;

use clap::Parser;

use s3conform_core::QuirkSet;

use crate::config::QuirkConfig;
use crate::error::Result;
use crate::runner::ScenarioFilter;

/// Parsed `s3conform` arguments.
#[derive(Parser, Debug)]
#[command(name = "s3conform")]
#[command(about = "S3 protocol conformance suite", long_about = None)]
pub struct Cli {
    /// Only run scenarios whose `suite.name` fully matches this regex
    #[arg(short, long, value_name = "PATTERN")]
    pub include: Option<String>,

    /// Skip scenarios whose `suite.name` fully matches this regex
    #[arg(short, long, value_name = "PATTERN")]
    pub exclude: Option<String>,

    /// TOML or JSON file declaring the target's quirks
    #[arg(short, long, value_name = "QUIRKS_FILE", env = "S3CONFORM_QUIRKS")]
    pub quirks: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Write a JUnit XML report
    #[arg(long, value_name = "PATH")]
    pub junit: Option<PathBuf>,

    /// Write a JSON report
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Quirk the in-memory reference service emulates (repeatable)
    #[arg(long, value_name = "QUIRK")]
    pub emulate: Vec<String>,

    /// Service URI, e.g. `memory://`
    pub target: String,
}

impl Cli {
    /// The include/exclude filter.
    pub fn filter(&self) -> Result<ScenarioFilter> {
        ScenarioFilter::new(self.include.as_deref(), self.exclude.as_deref())
    }

    /// Quirks declared for the target; empty without a quirks file.
    pub fn declared_quirks(&self) -> Result<QuirkSet> {
        match &self.quirks {
            Some(path) => QuirkConfig::from_file(path)?.into_set(),
            None => Ok(QuirkSet::empty()),
        }
    }

    /// Quirks the reference service should emulate.
    pub fn emulated_quirks(&self) -> Result<QuirkSet> {
        Ok(QuirkSet::from_names(&self.emulate)?)
    }
}
