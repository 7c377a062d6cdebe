//! Required-mode computation and permission application for script files.

use std::fmt;
use std::path::Path;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use riftgov_types::{Result, RiftError};

use crate::config::PermissionsConfig;
use crate::graph::ScriptNode;

// ---------------------------------------------------------------------------
// FileMode
// ---------------------------------------------------------------------------

/// Unix permission bits (`0o777` mask), written as four octal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode(u32);

impl FileMode {
    pub const fn new(bits: u32) -> Self {
        Self(bits & 0o777)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Parse `"0755"`, `"755"` or `"0o755"`.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        if digits.is_empty() || digits.len() > 4 {
            return None;
        }
        let bits = u32::from_str_radix(digits, 8).ok()?;
        (bits <= 0o777).then_some(Self(bits))
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl Serialize for FileMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ModeVisitor;

        impl<'de> Visitor<'de> for ModeVisitor {
            type Value = FileMode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an octal file mode such as \"0755\", 0755 or 0o755")
            }

            fn visit_str<E: de::Error>(self, text: &str) -> std::result::Result<FileMode, E> {
                FileMode::parse(text).ok_or_else(|| E::custom(format!("invalid file mode '{text}'")))
            }
        }

        // The scalar as written: `0o755`, `0755`, `755` and `"0755"` all mean rwxr-xr-x.
        deserializer.deserialize_str(ModeVisitor)
    }
}

// ---------------------------------------------------------------------------
// PathPattern
// ---------------------------------------------------------------------------

/// `/`-separated pattern matched segment by segment; `*` matches exactly one
/// segment and the segment counts must agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: pattern.split('/').map(String::from).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        parts.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(parts)
                .all(|(pattern, part)| pattern == "*" || pattern == part)
    }
}

// ---------------------------------------------------------------------------
// PermissionManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PermissionManager {
    rules: Vec<(PathPattern, FileMode)>,
    default_mode: FileMode,
}

impl PermissionManager {
    pub fn new(config: &PermissionsConfig) -> Self {
        Self {
            rules: config
                .elevation_rules
                .iter()
                .map(|rule| (PathPattern::new(&rule.pattern), rule.mode))
                .collect(),
            default_mode: config.default_script_mode,
        }
    }

    /// The node's own `permissions` entry, else the first matching rule
    /// against its declared path, else the default mode.
    pub fn required_mode(&self, node: &ScriptNode) -> FileMode {
        if let Some(mode) = node.required_permission_mode {
            return mode;
        }
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(&node.declared_path))
            .map(|(_, mode)| *mode)
            .unwrap_or(self.default_mode)
    }

    /// Set `mode` on `path`, then read the bits back.
    pub async fn apply(&self, path: &Path, mode: FileMode) -> Result<FileMode> {
        set_mode(path, mode).await?;
        current_mode(path).await
    }
}

#[cfg(unix)]
pub(crate) async fn set_mode(path: &Path, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode.bits())).await?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn set_mode(path: &Path, _mode: FileMode) -> Result<()> {
    Err(RiftError::Other(format!(
        "cannot set permission bits on {} on this platform",
        path.display()
    )))
}

/// Permission bits of `path` as they are on disk now.
#[cfg(unix)]
pub async fn current_mode(path: &Path) -> Result<FileMode> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = tokio::fs::metadata(path).await?;
    Ok(FileMode::new(metadata.permissions().mode()))
}

#[cfg(not(unix))]
pub async fn current_mode(path: &Path) -> Result<FileMode> {
    Err(RiftError::Other(format!(
        "cannot read permission bits of {} on this platform",
        path.display()
    )))
}

/// Error for a mode mismatch on `script`.
pub fn permission_error(script: &str, required: FileMode, actual: Option<FileMode>) -> RiftError {
    RiftError::Permission {
        script: script.to_string(),
        required: required.to_string(),
        actual: actual.map_or_else(|| "unreadable".to_string(), |m| m.to_string()),
    }
}
