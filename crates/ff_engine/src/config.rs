//! Engine configuration.
//!
//! The kill switch and artifact-store selector are explicit structs built
//! once at the process edge and threaded through; nothing reads the
//! environment after startup.

use std::collections::BTreeSet;

/// `TODISCOPE_ENABLED_ENGINES`: comma-separated engine ids. Unknown or
/// omitted engine is disabled.
pub const ENV_ENABLED_ENGINES: &str = "TODISCOPE_ENABLED_ENGINES";

/// `TODISCOPE_ARTIFACT_STORE_KIND`: selects the storage backend.
pub const ENV_ARTIFACT_STORE_KIND: &str = "TODISCOPE_ARTIFACT_STORE_KIND";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreKind {
    Memory,
    Filesystem,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    enabled_engines: BTreeSet<String>,
    pub artifact_store_kind: StoreKind,
}

impl EngineConfig {
    /// Read recognized environment flags once.
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENV_ENABLED_ENGINES).unwrap_or_default();
        let kind = std::env::var(ENV_ARTIFACT_STORE_KIND).unwrap_or_default();
        Self {
            enabled_engines: parse_engine_list(&enabled),
            artifact_store_kind: parse_store_kind(&kind),
        }
    }

    /// Explicit construction for tests and embedders.
    pub fn with_enabled_engines<I, S>(engine_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled_engines: engine_ids.into_iter().map(Into::into).collect(),
            artifact_store_kind: StoreKind::Memory,
        }
    }

    pub fn enable_engine(&mut self, engine_id: &str) {
        self.enabled_engines.insert(engine_id.to_string());
    }

    pub fn is_engine_enabled(&self, engine_id: &str) -> bool {
        self.enabled_engines.contains(engine_id)
    }
}

fn parse_engine_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_store_kind(raw: &str) -> StoreKind {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fs" | "file" | "filesystem" => StoreKind::Filesystem,
        _ => StoreKind::Memory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_list_parsing() {
        let parsed = parse_engine_list(" engine_a , engine_b ,, ");
        assert!(parsed.contains("engine_a"));
        assert!(parsed.contains("engine_b"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn omitted_engine_is_disabled() {
        let config = EngineConfig::with_enabled_engines(["engine_a"]);
        assert!(config.is_engine_enabled("engine_a"));
        assert!(!config.is_engine_enabled(crate::ENGINE_ID));
    }

    #[test]
    fn store_kind_defaults_to_memory() {
        assert_eq!(parse_store_kind(""), StoreKind::Memory);
        assert_eq!(parse_store_kind("fs"), StoreKind::Filesystem);
        assert_eq!(parse_store_kind("something"), StoreKind::Memory);
    }
}
