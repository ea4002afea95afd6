//! Run configuration: the quirk file and the target URI.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use s3conform_core::{QuirkSet, StorageProvider};

use crate::error::{Result, SuiteError};
use crate::memory::MemoryProvider;

/// Scheme of the in-memory reference service.
pub const MEMORY_SCHEME: &str = "memory";

/// The quirks declared for a service, as read from a TOML or JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuirkConfig {
    /// Named preset the quirk list is added to
    pub preset: Option<String>,
    /// Quirk names, matched case-insensitively
    pub quirks: Vec<String>,
}

impl QuirkConfig {
    /// Loads a `.toml` or `.json` quirk file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let invalid = |reason: String| SuiteError::InvalidConfig {
            path: path.display().to_string(),
            reason,
        };
        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| invalid(e.to_string())),
            "json" => serde_json::from_str(&contents).map_err(|e| invalid(e.to_string())),
            _ => Err(SuiteError::UnsupportedConfigFormat {
                ext: ext.to_string(),
            }),
        }
    }

    /// The preset, if any, extended with the listed quirks.
    pub fn into_set(self) -> Result<QuirkSet> {
        let base = match self.preset.as_deref() {
            Some(name) => QuirkSet::preset(name)?,
            None => QuirkSet::empty(),
        };
        Ok(base.union(&QuirkSet::from_names(&self.quirks)?))
    }
}

/// A parsed target URI: `scheme://[host[:port]][/bucket]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// URI scheme, e.g. `memory`
    pub scheme: String,
    /// Host, absent for `memory://`
    pub host: Option<String>,
    /// Explicit port
    pub port: Option<u16>,
    /// Bucket to run in instead of a fresh one per case
    pub bucket: Option<String>,
}

fn target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://([^/:]*)(?::([0-9]+))?(?:/([^/]*))?/?$")
            .unwrap_or_else(|e| unreachable!("target pattern is valid: {}", e))
    })
}

impl ServiceDefinition {
    /// Parses `scheme://[host[:port]][/bucket]`.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| SuiteError::InvalidTarget {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let captures = target_pattern()
            .captures(uri.trim())
            .ok_or_else(|| invalid("expected scheme://[host[:port]][/bucket]"))?;

        let non_empty = |i: usize| {
            captures
                .get(i)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let port = match captures.get(3) {
            Some(m) => Some(m.as_str().parse::<u16>().map_err(|_| invalid("port out of range"))?),
            None => None,
        };

        Ok(Self {
            scheme: captures[1].to_ascii_lowercase(),
            host: non_empty(2),
            port,
            bucket: non_empty(4),
        })
    }

    /// Whether the target is the in-memory reference service.
    pub fn is_memory(&self) -> bool {
        self.scheme == MEMORY_SCHEME
    }
}

impl fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host.as_deref().unwrap_or_default())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(bucket) = &self.bucket {
            write!(f, "/{}", bucket)?;
        }
        Ok(())
    }
}

/// Builds the storage provider for `target`. `emulate` is only honored by
/// the in-memory reference service.
pub fn connect(target: &ServiceDefinition, emulate: QuirkSet) -> Result<Box<dyn StorageProvider>> {
    if !target.is_memory() {
        return Err(SuiteError::UnsupportedTarget {
            scheme: target.scheme.clone(),
        });
    }
    info!(uri = %target, emulated = emulate.len(), "using in-memory reference service");
    Ok(Box::new(MemoryProvider::with_quirks(emulate)))
}
