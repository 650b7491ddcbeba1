//! Automounter configuration.
//!
//! Loaded from RON, then optionally overridden from the environment:
//!
//! ```ron
//! (
//!     temp_dir: Some("/var/tmp/vmount"),
//!     force_no_copy: false,
//!     default_options: [copy],
//!     archive_suffixes: ["jar", "war", "ear"],
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vmount_types::MountOptions;

use crate::automount::AutomountResult;

/// Forces every mount to work in place, ignoring `COPY`.
pub const ENV_FORCE_NO_COPY: &str = "VMOUNT_FORCE_NO_COPY";
/// Root directory for copy-mode mounts.
pub const ENV_TEMP_DIR: &str = "VMOUNT_TEMP_DIR";

const DEFAULT_ARCHIVE_SUFFIXES: [&str; 6] = ["jar", "war", "ear", "sar", "rar", "zip"];

/// Configuration for an [`Automounter`](crate::Automounter) and the
/// [`VirtualFileSystem`](crate::VirtualFileSystem) above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomountConfig {
    /// Where copy-mode mounts are materialized. `None` uses the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Strip `COPY` from every mount request.
    pub force_no_copy: bool,

    /// Options used when a caller mounts with an empty option set.
    pub default_options: MountOptions,

    /// File name suffixes (without the dot) that mark a node as an archive.
    pub archive_suffixes: Vec<String>,
}

impl Default for AutomountConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            force_no_copy: false,
            default_options: MountOptions::empty(),
            archive_suffixes: DEFAULT_ARCHIVE_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl AutomountConfig {
    /// Parse a RON document. Missing fields take their defaults.
    pub fn from_ron_str(text: &str) -> AutomountResult<Self> {
        let config: AutomountConfig = ron::from_str(text)?;
        Ok(config)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> AutomountResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        debug!(path = %path.display(), "loaded automount config");
        Ok(config)
    }

    /// Apply `VMOUNT_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_FORCE_NO_COPY) {
            match parse_flag(&value) {
                Some(flag) => self.force_no_copy = flag,
                None => warn!(var = ENV_FORCE_NO_COPY, %value, "ignoring unparseable flag"),
            }
        }
        if let Some(value) = lookup(ENV_TEMP_DIR) {
            if value.is_empty() {
                self.temp_dir = None;
            } else {
                self.temp_dir = Some(PathBuf::from(value));
            }
        }
        self
    }

    /// Whether `name` ends in one of the archive suffixes (case-insensitive).
    pub fn is_archive_name(&self, name: &str) -> bool {
        let Some((stem, ext)) = name.rsplit_once('.') else {
            return false;
        };
        !stem.is_empty()
            && self
                .archive_suffixes
                .iter()
                .any(|suffix| suffix.eq_ignore_ascii_case(ext))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
