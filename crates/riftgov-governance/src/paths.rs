//! Descriptor naming convention.
//!
//! | unit | file |
//! |---|---|
//! | stage primary | `{root}/.riftrc.{stage}` |
//! | substage | `{root}/gov.{substage}.stage.riftrc.{stage}` |
//! | custom stage | `{root}/gov.{name}.stage.riftrc.custom` |
//! | fallback | `{root}/{fallback_dir}/gov.{substage}.stage.riftrc.{stage}` |

use std::path::{Path, PathBuf};

pub const DEFAULT_FALLBACK_DIR: &str = "irift";
pub const MAIN_CONFIG_FILE: &str = ".riftrc";
pub const OPTIMIZER_AUDIT_ARTIFACT: &str = "logs/opt_trace.sig";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernancePaths {
    root: PathBuf,
    fallback_dir: PathBuf,
}

impl GovernancePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let fallback_dir = root.join(DEFAULT_FALLBACK_DIR);
        Self { root, fallback_dir }
    }

    /// Override the fallback subtree; relative paths are taken from the root.
    pub fn with_fallback_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.fallback_dir = self.root.join(dir);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn main_config(&self) -> PathBuf {
        self.root.join(MAIN_CONFIG_FILE)
    }

    pub fn primary(&self, stage: u8) -> PathBuf {
        self.root.join(format!(".riftrc.{stage}"))
    }

    pub fn substage(&self, substage: &str, stage: u8) -> PathBuf {
        self.root.join(substage_file_name(substage, stage))
    }

    pub fn fallback(&self, substage: &str, stage: u8) -> PathBuf {
        self.fallback_dir.join(substage_file_name(substage, stage))
    }

    pub fn custom(&self, name: &str) -> PathBuf {
        self.root.join(format!("gov.{name}.stage.riftrc.custom"))
    }

    pub fn optimizer_audit_artifact(&self) -> PathBuf {
        self.root.join(OPTIMIZER_AUDIT_ARTIFACT)
    }
}

fn substage_file_name(substage: &str, stage: u8) -> String {
    format!("gov.{substage}.stage.riftrc.{stage}")
}
