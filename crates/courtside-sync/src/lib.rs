//! Matching, reconciliation, fallback orchestration and scheduling for courtside.

use std::path::Path;

use anyhow::{Context, Result};
use courtside_adapters::SourceRegistry;
use tokio::fs;

pub mod config;
pub mod matcher;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod shutdown;
pub mod teams;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SyncConfig};
pub use matcher::{verify_injective, EntityMatcher, MatchError, MatchKey};
pub use orchestrator::{classify, FallbackOrchestrator, SourceResult};
pub use pipeline::{Cadence, CycleReport, IngestError, IngestPipeline, LatestCycle};
pub use reconcile::{
    MergePolicy, MergePolicyKind, PreferAuthoritative, PreferLatest, ReconciliationEngine,
    ReconciliationMetrics, SmartMerge,
};
pub use scheduler::{
    next_daily_run, run_batch_with_retry, BatchResult, CycleRunner, Scheduler, SchedulerConfig,
    SchedulerStats, SchedulerStatsSnapshot, SchedulerStatus, WallClock,
};
pub use shutdown::Shutdown;
pub use teams::TeamDirectory;

pub const CRATE_NAME: &str = "courtside-sync";

/// Reads the YAML source registry that names one adapter per source kind.
pub async fn load_source_registry(path: &Path) -> Result<SourceRegistry> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_adapters::AdapterKind;
    use courtside_core::SourceKind;

    #[tokio::test]
    async fn registry_loads_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yaml");
        tokio::fs::write(
            &path,
            r#"
sources:
  - kind: authoritative
    adapter: scoreboard
    display_name: League scoreboard
    base_url: https://scores.example.test/api
  - kind: primary
    adapter: fixture
    display_name: Captured live cards
    fixture_path: fixtures/records/primary.json
"#,
        )
        .await
        .unwrap();

        let registry = load_source_registry(&path).await.unwrap();
        let authoritative = registry.source(SourceKind::Authoritative).unwrap();
        assert_eq!(authoritative.adapter, AdapterKind::Scoreboard);
        let primary = registry.source(SourceKind::Primary).unwrap();
        assert_eq!(primary.adapter, AdapterKind::Fixture);
        assert!(primary.base_url.is_none());
    }

    #[tokio::test]
    async fn missing_registry_names_the_path() {
        let err = load_source_registry(Path::new("/nonexistent/sources.yaml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sources.yaml"));
    }

    #[tokio::test]
    async fn checked_in_registries_parse() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        for file in ["sources.yaml", "sources.fixtures.yaml"] {
            let registry = load_source_registry(&root.join(file)).await.unwrap();
            assert!(registry.source(SourceKind::Primary).is_some(), "{file}");
            assert!(registry.source(SourceKind::Authoritative).is_some(), "{file}");
        }
    }
}
