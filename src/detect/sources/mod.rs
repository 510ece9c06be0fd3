//! Detection sources.
//!
//! - `ScriptedSource`: a fixed evidence sequence (tests, one-shot reports)
//! - `JsonLinesSource`: JSON-lines evidence piped in from an external detector
//! - `SimulatedSource`: seeded random stand-in for a live detector (feature: simulated-source)

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;

pub mod jsonl;
pub mod scripted;
#[cfg(feature = "simulated-source")]
pub mod simulated;

pub use jsonl::JsonLinesSource;
pub use scripted::ScriptedSource;
#[cfg(feature = "simulated-source")]
pub use simulated::SimulatedSource;

/// Where a pipeline takes its evidence from, as written in configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// `simulated`
    Simulated,
    /// `stdin`
    Stdin,
    /// Any other value: a local JSON-lines file.
    JsonLines(PathBuf),
}

impl SourceSpec {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value {
            "" => Err(anyhow!("detection source must not be empty")),
            "simulated" => Ok(Self::Simulated),
            "stdin" | "-" => Ok(Self::Stdin),
            path if path.contains("://") => Err(anyhow!(
                "detection source '{}' must be 'simulated', 'stdin' or a local file path",
                path
            )),
            path => Ok(Self::JsonLines(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Stdin => write!(f, "stdin"),
            Self::JsonLines(path) => write!(f, "{}", path.display()),
        }
    }
}
