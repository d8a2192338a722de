//! Build metadata embedded by `build.rs` through vergen.

use std::fmt;

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Where and from what this binary was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
    pub built_at: &'static str,
}

impl BuildInfo {
    /// Metadata for the running build. Fields vergen could not determine
    /// (no git checkout, for instance) read `"unknown"`.
    pub const fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: or_unknown(option_env!("VERGEN_GIT_BRANCH")),
            sha: or_unknown(option_env!("VERGEN_GIT_SHA")),
            dirty: is_true(option_env!("VERGEN_GIT_DIRTY")),
            built_at: or_unknown(option_env!("VERGEN_BUILD_TIMESTAMP")),
        }
    }

    /// First seven characters of the commit SHA.
    pub fn short_sha(&self) -> &'static str {
        match self.sha.char_indices().nth(7) {
            Some((end, _)) => &self.sha[..end],
            None => self.sha,
        }
    }
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => UNKNOWN,
    }
}

const fn is_true(value: Option<&'static str>) -> bool {
    match value {
        Some(v) => matches!(v.as_bytes(), [b't', b'r', b'u', b'e']),
        None => false,
    }
}

/// `{version}+{branch}.{short_sha}`, with `.dirty` appended for dirty trees.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}.{}", self.version, self.branch, self.short_sha())?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

/// Shorthand for `BuildInfo::current().to_string()`.
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}
