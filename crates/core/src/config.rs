//! Engine configuration.

use typed_builder::TypedBuilder;

use crate::capability::Capabilities;

/// Which dependency kinds are inferred and fed to the graph.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyToggles {
    pub ww: bool,
    pub wr: bool,
    pub rw: bool,
}

impl Default for DependencyToggles {
    fn default() -> Self {
        Self {
            ww: true,
            wr: true,
            rw: true,
        }
    }
}

/// Knobs of one analysis run.
///
/// Every field has a default, so a configuration file only needs to name the
/// options it changes.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
#[allow(clippy::struct_excessive_bools)]
pub struct AnalysisConfig {
    /// Drop analyzed window records and unreachable versions as the run advances.
    #[builder(default = true)]
    pub garbage_collection: bool,
    /// Whole-store GC sweep period, in window advances.
    #[builder(default = 64)]
    pub gc_interval: usize,
    /// Maintain the dependency graph and search it for cycles.
    #[builder(default = true)]
    pub verify_cycles: bool,
    #[builder(default)]
    pub dependencies: DependencyToggles,
    /// Drop edges between transactions whose lifetimes never overlapped.
    #[builder(default = false)]
    pub skip_non_concurrent: bool,
    /// Graph vertex count above which pruning runs.
    #[builder(default = 4096)]
    pub prune_threshold: usize,
    /// Longest cycle reported by the incremental search.
    #[builder(default = 3)]
    pub max_cycle_length: usize,
    /// Run the three checkers of a window head in parallel.
    #[builder(default = false)]
    pub parallel_checkers: bool,
    /// Records drained from each source per merge round.
    #[builder(default = 1024)]
    pub merge_batch: usize,
    /// Size of the merge pool, `0` for the rayon default.
    #[builder(default = 0)]
    pub merge_threads: usize,
    /// Period of the background statistics reporter, disabled when `None`.
    #[builder(default)]
    pub stats_interval_ms: Option<u64>,
    #[builder(default)]
    pub capabilities: Capabilities,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default() {
        let config = AnalysisConfig::default();
        assert!(config.garbage_collection);
        assert!(config.verify_cycles);
        assert_eq!(config.max_cycle_length, 3);
        assert_eq!(config.dependencies, DependencyToggles::default());
        assert_eq!(config.capabilities.dbms, "mysql");
    }

    #[test]
    fn builder_overrides() {
        let config = AnalysisConfig::builder()
            .garbage_collection(false)
            .prune_threshold(8)
            .capabilities(Capabilities::postgresql())
            .build();
        assert!(!config.garbage_collection);
        assert_eq!(config.prune_threshold, 8);
        assert_eq!(config.capabilities.dbms, "postgresql");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"verify_cycles": false, "dependencies": {"rw": false}}"#)
                .unwrap();
        assert!(!config.verify_cycles);
        assert!(config.garbage_collection);
        assert!(config.dependencies.ww);
        assert!(!config.dependencies.rw);
    }
}
