//! Script registry configuration (`tree.yml`).
//!
//! ```yaml
//! metadata:
//!   name: rift-bridge
//!   version: 1.0.0
//!   pipeline_id: rift-bridge-phase1
//! scripts:
//!   setup:
//!     path: scripts/setup.sh
//!     stage: 0
//!     governance_policy: "zero_trust_mode=enabled,stage_isolation=strict"
//!     hooks: { pre: [validate-env], post: [] }
//!   build:
//!     path: scripts/build.sh
//!     stage: 1
//!     depends_on: [setup]
//! hooks:
//!   directory: hooks
//! permissions:
//!   default_script_mode: "0755"
//!   elevation_rules:
//!     - { pattern: "scripts/*", mode: "0750" }
//! governance:
//!   zero_trust: true
//! ```
//!
//! All five top-level sections must be present. Script declaration order is
//! kept and breaks ties during resolution.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, Visitor};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use riftgov_types::{Result, RiftError};

use crate::permissions::FileMode;

pub const REQUIRED_SECTIONS: &[&str] = &["metadata", "scripts", "hooks", "permissions", "governance"];
pub const DEFAULT_CONFIG_PATH: &str = "tools/ad-hoc/tree.yml";
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub toolchain_flow: Option<String>,
    #[serde(default)]
    pub build_stack: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptHooks {
    #[serde(default)]
    pub pre: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
}

/// `governance_policy` is either `"k=v,k=v"` or a mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PolicySpec {
    Inline(String),
    Table(Mapping),
}

impl Default for PolicySpec {
    fn default() -> Self {
        PolicySpec::Inline(String::new())
    }
}

impl PolicySpec {
    /// Key/value pairs in declaration order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            PolicySpec::Inline(text) => parse_policy_string(text),
            PolicySpec::Table(map) => map
                .iter()
                .filter_map(|(k, v)| Some((scalar_to_string(k)?, scalar_to_string(v)?)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub stage: u8,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub permissions: Option<FileMode>,
    #[serde(default)]
    pub governance_policy: PolicySpec,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hooks: ScriptHooks,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_hooks_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            directory: default_hooks_dir(),
            timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElevationRule {
    pub pattern: String,
    pub mode: FileMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_script_mode")]
    pub default_script_mode: FileMode,
    #[serde(default)]
    pub elevation_rules: Vec<ElevationRule>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default_script_mode: default_script_mode(),
            elevation_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default = "default_true")]
    pub zero_trust: bool,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default = "default_semverx_tool")]
    pub semverx_tool: String,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            zero_trust: true,
            project_root: None,
            semverx_tool: default_semverx_tool(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

fn default_hooks_dir() -> PathBuf {
    PathBuf::from("hooks")
}

fn default_hook_timeout() -> u64 {
    DEFAULT_HOOK_TIMEOUT_SECS
}

fn default_script_mode() -> FileMode {
    FileMode::new(0o755)
}

fn default_true() -> bool {
    true
}

fn default_semverx_tool() -> String {
    riftgov_governance::DEFAULT_SEMVERX_TOOL.to_string()
}

fn default_fallback_dir() -> String {
    riftgov_governance::paths::DEFAULT_FALLBACK_DIR.to_string()
}

// ---------------------------------------------------------------------------
// Typed document
// ---------------------------------------------------------------------------

/// The registry read straight from its text, so that scalars such as file
/// modes reach their deserializers as written. A bare `section:` is `None`.
#[derive(Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    scripts: Option<ScriptTable>,
    #[serde(default)]
    hooks: Option<HooksConfig>,
    #[serde(default)]
    permissions: Option<PermissionsConfig>,
    #[serde(default)]
    governance: Option<GovernanceConfig>,
}

/// `scripts` mapping in declaration order.
struct ScriptTable(Vec<(String, ScriptConfig)>);

impl<'de> Deserialize<'de> for ScriptTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ScriptTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of script names to script entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<ScriptTable, A::Error> {
                let mut scripts = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(name) = map.next_key::<String>()? {
                    let script: ScriptConfig = map
                        .next_value()
                        .map_err(|e| <A::Error as de::Error>::custom(format!("invalid script '{name}': {e}")))?;
                    scripts.push((name, script));
                }
                Ok(ScriptTable(scripts))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub metadata: Metadata,
    /// Scripts in declaration order.
    pub scripts: Vec<(String, ScriptConfig)>,
    pub hooks: HooksConfig,
    pub permissions: PermissionsConfig,
    pub governance: GovernanceConfig,
    /// Directory of the registry file; script paths and the hooks directory
    /// are relative to it.
    pub base_dir: PathBuf,
}

impl RegistryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RiftError::Config(format!("cannot read {}: {e}", path.display())))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml(&text, base_dir)
    }

    pub fn from_yaml(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(text)
            .map_err(|e| RiftError::Config(format!("malformed registry: {e}")))?;
        let Value::Mapping(root) = doc else {
            return Err(RiftError::Config("registry must be a mapping".into()));
        };

        for section in REQUIRED_SECTIONS {
            if !root.contains_key(*section) {
                return Err(RiftError::Config(format!(
                    "Missing required configuration section: {section}"
                )));
            }
        }

        let doc: RegistryDocument = serde_yaml::from_str(text)
            .map_err(|e| RiftError::Config(format!("invalid registry: {e}")))?;

        Ok(Self {
            metadata: doc.metadata.unwrap_or_default(),
            scripts: doc.scripts.map(|table| table.0).unwrap_or_default(),
            hooks: doc.hooks.unwrap_or_default(),
            permissions: doc.permissions.unwrap_or_default(),
            governance: doc.governance.unwrap_or_default(),
            base_dir: base_dir.into(),
        })
    }

    pub fn script(&self, name: &str) -> Option<&ScriptConfig> {
        self.scripts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn script_path(&self, script: &ScriptConfig) -> PathBuf {
        self.base_dir.join(&script.path)
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.base_dir.join(&self.hooks.directory)
    }

    /// `governance.project_root` resolved against the registry directory.
    pub fn configured_project_root(&self) -> Option<PathBuf> {
        self.governance
            .project_root
            .as_ref()
            .map(|root| self.base_dir.join(root))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split `"k=v,k=v"`; entries without `=` are ignored.
pub fn parse_policy_string(text: &str) -> Vec<(String, String)> {
    text.split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
