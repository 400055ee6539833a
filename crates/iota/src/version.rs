//! Version information for iota.

/// iota version from Cargo.toml
pub const IOTA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub iota: &'static str,
    /// Source revision the binary was built from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            iota: IOTA_VERSION,
            revision: option_env!("IOTA_REVISION").map(str::to_string),
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}
