//! `HubConfig`: an optional TOML file overridable by CLI flags,
//! falling back to defaults when the file is absent.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Everything the binary needs to stand up a running hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Ingress listener settings.
    pub ingress: IngressSection,
    /// Per-project Flow Store defaults.
    pub flow_store: FlowStoreSection,
    /// Per-project interceptor defaults.
    pub interceptor: InterceptorSection,
    /// Rule Store defaults.
    pub mock: MockSection,
    /// The optional rule-match HTTP sidecar.
    pub sidecar: SidecarSection,
    /// Logging.
    pub logging: LoggingSection,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ingress: IngressSection::default(),
            flow_store: FlowStoreSection::default(),
            interceptor: InterceptorSection::default(),
            mock: MockSection::default(),
            sidecar: SidecarSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl HubConfig {
    /// Load from a TOML file, falling back to defaults when the path
    /// does not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(?path, "no config file found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(config)
    }
}

/// Ingress listener settings (design defaults per spec.md §4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngressSection {
    /// TCP port agents connect to.
    pub port: u16,
    /// Fixed worker-pool size.
    pub worker_count: usize,
    /// Bounded channel capacity between acceptor and workers.
    pub channel_capacity: usize,
}

impl Default for IngressSection {
    fn default() -> Self {
        Self { port: 9876, worker_count: 50, channel_capacity: 500 }
    }
}

/// Flow Store retention settings (design defaults per spec.md §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowStoreSection {
    /// Hard cap on flows retained per project.
    pub hard_count: usize,
    /// Soft memory budget in bytes before stale flows are evicted.
    pub soft_budget_bytes: usize,
    /// Minimum age before a flow is eligible for soft-budget eviction,
    /// in seconds.
    pub age_threshold_secs: u64,
    /// Capacity of each reactive event channel.
    pub event_buffer: usize,
}

impl Default for FlowStoreSection {
    fn default() -> Self {
        Self {
            hard_count: 200,
            soft_budget_bytes: 50 * 1024 * 1024,
            age_threshold_secs: 3600,
            event_buffer: 256,
        }
    }
}

impl FlowStoreSection {
    /// Convert to the runtime config consumed by `hub_flowstore`.
    pub fn to_runtime(&self) -> hub_flowstore::FlowStoreConfig {
        hub_flowstore::FlowStoreConfig {
            hard_count: self.hard_count,
            soft_budget_bytes: self.soft_budget_bytes,
            age_threshold: Duration::from_secs(self.age_threshold_secs),
            event_buffer: self.event_buffer,
        }
    }
}

/// Debug Queue timing (design default per spec.md §9 Open Questions).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptorSection {
    /// How long a suspended flow waits for `resolve()` before falling
    /// back to the original response, in seconds.
    pub debug_timeout_secs: u64,
}

impl Default for InterceptorSection {
    fn default() -> Self {
        Self { debug_timeout_secs: 30 }
    }
}

/// Rule Store defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockSection {
    /// Bounded match-result cache size per Rule Store.
    pub cache_capacity: usize,
}

impl Default for MockSection {
    fn default() -> Self {
        Self { cache_capacity: 100 }
    }
}

/// The optional rule-match HTTP sidecar (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SidecarSection {
    /// Whether to bind the sidecar at all.
    pub enabled: bool,
    /// Bind address, e.g. `127.0.0.1:8787`.
    pub bind: String,
}

impl Default for SidecarSection {
    fn default() -> Self {
        Self { enabled: false, bind: "127.0.0.1:8787".to_string() }
    }
}

/// Logging configuration (level and output format).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit structured JSON instead of plain text.
    pub json_format: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

/// Initialise the global tracing subscriber once at startup.
pub fn init_logging(config: &LoggingSection) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    let installed = if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    if let Err(e) = installed {
        eprintln!("logging already initialised: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_values() {
        let config = HubConfig::default();
        assert_eq!(config.ingress.port, 9876);
        assert_eq!(config.flow_store.hard_count, 200);
        assert_eq!(config.interceptor.debug_timeout_secs, 30);
        assert!(!config.sidecar.enabled);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = HubConfig::load(Some(Path::new("/nonexistent/hub.toml"))).unwrap();
        assert_eq!(config.ingress.port, 9876);
    }

    #[test]
    fn no_path_falls_back_to_defaults() {
        let config = HubConfig::load(None).unwrap();
        assert_eq!(config.mock.cache_capacity, 100);
    }

    #[test]
    fn partial_toml_overrides_only_the_sections_it_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(
            &path,
            r#"
            [ingress]
            port = 9000

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = HubConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ingress.port, 9000);
        assert_eq!(config.ingress.worker_count, 50);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.flow_store.hard_count, 200);
    }
}
