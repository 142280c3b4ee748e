//! Periodic health probing of registered agents and knowledge bases.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use mesh_primitives::{AgentRecord, KbRecord, ResourceStatus};
use mesh_store::{AgentFilter, KbFilter, RegistryStore};
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};
use webpki_roots::TLS_SERVER_ROOTS;

use crate::service::RegistryService;
use crate::{RegistryError, RegistryResult};

/// Probes a member and reports the observed round-trip latency.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Issues an HTTP GET against the agent's health endpoint.
    async fn probe_agent(&self, record: &AgentRecord) -> RegistryResult<Duration>;

    /// Performs a driver-level reachability handshake against the
    /// knowledge base.
    async fn probe_kb(&self, record: &KbRecord) -> RegistryResult<Duration>;
}

/// Configuration for the health monitor loop.
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    interval: Duration,
    failure_threshold: u32,
    probe_timeout: Duration,
}

impl HealthMonitorConfig {
    /// Creates a new configuration.
    #[must_use]
    pub const fn new(interval: Duration, failure_threshold: u32, probe_timeout: Duration) -> Self {
        Self {
            interval,
            failure_threshold,
            probe_timeout,
        }
    }

    /// Returns the sweep interval.
    #[must_use]
    pub const fn interval(self) -> Duration {
        self.interval
    }

    /// Returns the consecutive-failure threshold for a status downgrade.
    #[must_use]
    pub const fn failure_threshold(self) -> u32 {
        self.failure_threshold
    }

    /// Returns the per-probe timeout.
    #[must_use]
    pub const fn probe_timeout(self) -> Duration {
        self.probe_timeout
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] when any duration or the
    /// threshold is zero.
    pub fn validate(self) -> RegistryResult<()> {
        if self.interval.is_zero() {
            return Err(mesh_primitives::Error::invalid_record(
                "health interval must be greater than zero",
            )
            .into());
        }
        if self.failure_threshold == 0 {
            return Err(mesh_primitives::Error::invalid_record(
                "failure threshold must be greater than zero",
            )
            .into());
        }
        if self.probe_timeout.is_zero() {
            return Err(mesh_primitives::Error::invalid_record(
                "probe timeout must be greater than zero",
            )
            .into());
        }
        Ok(())
    }
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 3, Duration::from_secs(5))
    }
}

/// Background task that walks member status through
/// `active → degraded → offline` on consecutive probe failures and back to
/// `active` on any success.
pub struct HealthMonitor {
    registry: Arc<RegistryService>,
    probe: Arc<dyn HealthProbe>,
    config: HealthMonitorConfig,
    shutdown: Arc<AtomicBool>,
    failures: Mutex<HashMap<String, u32>>,
}

impl HealthMonitor {
    /// Creates a monitor over the given registry and probe.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] when the configuration is
    /// invalid.
    pub fn new(
        registry: Arc<RegistryService>,
        probe: Arc<dyn HealthProbe>,
        config: HealthMonitorConfig,
    ) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            probe,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Returns a flag that stops the loop when set.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs sweeps until the shutdown flag is set.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.config.interval(), "health monitor started");

        while !self.shutdown.load(Ordering::Acquire) {
            ticker.tick().await;
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.sweep().await;
        }
        info!("health monitor stopped");
    }

    /// Spawns [`run`](Self::run) onto the runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Probes every registered member once.
    pub async fn sweep(&self) {
        let store = self.registry.store();

        match store.list_agents(&AgentFilter::default()).await {
            Ok((agents, _)) => {
                for agent in agents {
                    let outcome = self.probe.probe_agent(&agent).await;
                    self.track_agent(&agent, outcome).await;
                }
            }
            Err(err) => warn!(?err, "health sweep could not list agents"),
        }

        match store.list_kbs(&KbFilter::default()).await {
            Ok((kbs, _)) => {
                for kb in kbs {
                    let outcome = self.probe.probe_kb(&kb).await;
                    if let Err(err) = self.registry.record_kb_health_check(kb.kb_id()).await {
                        warn!(kb_id = %kb.kb_id(), ?err, "failed to record health check");
                    }
                    self.track_kb(&kb, outcome).await;
                }
            }
            Err(err) => warn!(?err, "health sweep could not list knowledge bases"),
        }
    }

    async fn track_agent(&self, agent: &AgentRecord, outcome: RegistryResult<Duration>) {
        let next = self
            .next_status(agent.identity(), agent.status(), outcome.is_ok())
            .await;
        if let Some(status) = next {
            if let Err(err) = self.registry.update_agent_status(agent.agent_id(), status).await {
                warn!(identity = %agent.identity(), ?err, "failed to update agent status");
            }
        }
        if let Err(err) = outcome {
            debug!(identity = %agent.identity(), %err, "agent probe failed");
        }
    }

    async fn track_kb(&self, kb: &KbRecord, outcome: RegistryResult<Duration>) {
        let next = self
            .next_status(kb.kb_id().as_str(), kb.status(), outcome.is_ok())
            .await;
        if let Some(status) = next {
            if let Err(err) = self.registry.update_kb_status(kb.kb_id(), status).await {
                warn!(kb_id = %kb.kb_id(), ?err, "failed to update kb status");
            }
        }
        if let Err(err) = outcome {
            debug!(kb_id = %kb.kb_id(), %err, "kb probe failed");
        }
    }

    async fn next_status(
        &self,
        key: &str,
        current: ResourceStatus,
        healthy: bool,
    ) -> Option<ResourceStatus> {
        let mut failures = self.failures.lock().await;
        if healthy {
            failures.remove(key);
            return (current != ResourceStatus::Active).then_some(ResourceStatus::Active);
        }

        let count = failures.entry(key.to_owned()).or_insert(0);
        *count += 1;
        if *count < self.config.failure_threshold() {
            return None;
        }
        *count = 0;
        match current {
            ResourceStatus::Active => Some(ResourceStatus::Degraded),
            ResourceStatus::Degraded => Some(ResourceStatus::Offline),
            ResourceStatus::Offline => None,
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Probe issuing real HTTP GETs and TCP handshakes.
pub struct HttpHealthProbe {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
}

impl HttpHealthProbe {
    /// Creates a probe with the given per-call timeout.
    #[must_use]
    pub fn new(probe_timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                anchor.subject,
                anchor.spki,
                anchor.name_constraints,
            )
        }));
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let connector = HttpsConnector::from((http, Arc::new(config)));

        Self {
            client: Client::builder().build::<_, Body>(connector),
            timeout: probe_timeout,
        }
    }
}

impl std::fmt::Debug for HttpHealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHealthProbe")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn probe_failed(target: &str, reason: impl Into<String>) -> RegistryError {
    RegistryError::ProbeFailed {
        target: target.to_owned(),
        reason: reason.into(),
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe_agent(&self, record: &AgentRecord) -> RegistryResult<Duration> {
        let uri = record
            .health_endpoint()
            .parse::<Uri>()
            .map_err(|err| probe_failed(record.identity(), err.to_string()))?;
        let request = Request::get(uri)
            .body(Body::empty())
            .map_err(|err| probe_failed(record.identity(), err.to_string()))?;

        let started = Instant::now();
        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| probe_failed(record.identity(), "health probe timed out"))?
            .map_err(|err| probe_failed(record.identity(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(probe_failed(
                record.identity(),
                format!("health endpoint returned {}", response.status()),
            ));
        }
        Ok(started.elapsed())
    }

    async fn probe_kb(&self, record: &KbRecord) -> RegistryResult<Duration> {
        let target = record.kb_id().as_str();
        let uri = record
            .endpoint()
            .parse::<Uri>()
            .map_err(|err| probe_failed(target, err.to_string()))?;
        let host = uri
            .host()
            .ok_or_else(|| probe_failed(target, "endpoint has no host"))?;
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("postgresql" | "postgres") => 5432,
            Some("bolt" | "neo4j") => 7687,
            Some("https") => 443,
            _ => 80,
        });

        let started = Instant::now();
        timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| probe_failed(target, "connect timed out"))?
            .map_err(|err| probe_failed(target, err.to_string()))?;
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::RegisterAgentRequest;
    use mesh_store::MemoryStore;
    use mesh_transport::InMemoryTransport;
    use std::sync::atomic::AtomicBool as TestFlag;

    struct TogglingProbe {
        healthy: TestFlag,
    }

    #[async_trait]
    impl HealthProbe for TogglingProbe {
        async fn probe_agent(&self, record: &AgentRecord) -> RegistryResult<Duration> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(Duration::from_millis(1))
            } else {
                Err(probe_failed(record.identity(), "unreachable"))
            }
        }

        async fn probe_kb(&self, record: &KbRecord) -> RegistryResult<Duration> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(Duration::from_millis(1))
            } else {
                Err(probe_failed(record.kb_id().as_str(), "unreachable"))
            }
        }
    }

    async fn setup(healthy: bool) -> (Arc<RegistryService>, Arc<TogglingProbe>, HealthMonitor) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let registry = Arc::new(RegistryService::new(store, transport));
        registry
            .register_agent(RegisterAgentRequest {
                identity: "probe-target".to_owned(),
                version: "1.0.0".to_owned(),
                capabilities: Vec::new(),
                operations: vec!["query".to_owned()],
                health_endpoint: "http://localhost:9009/health".to_owned(),
                metadata: None,
            })
            .await
            .unwrap();

        let probe = Arc::new(TogglingProbe {
            healthy: TestFlag::new(healthy),
        });
        let config = HealthMonitorConfig::new(Duration::from_millis(10), 2, Duration::from_secs(1));
        let monitor = HealthMonitor::new(registry.clone(), probe.clone(), config).unwrap();
        (registry, probe, monitor)
    }

    async fn status_of(registry: &RegistryService) -> ResourceStatus {
        registry
            .get_agent_by_identity("probe-target")
            .await
            .unwrap()
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn consecutive_failures_walk_status_down() {
        let (registry, _probe, monitor) = setup(false).await;

        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Active);
        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Degraded);

        monitor.sweep().await;
        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Offline);

        // Offline is terminal for the monitor; further failures are no-ops.
        monitor.sweep().await;
        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Offline);
    }

    #[tokio::test]
    async fn single_success_restores_active() {
        let (registry, probe, monitor) = setup(false).await;
        monitor.sweep().await;
        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Degraded);

        probe.healthy.store(true, Ordering::SeqCst);
        monitor.sweep().await;
        assert_eq!(status_of(&registry).await, ResourceStatus::Active);
    }

    #[test]
    fn config_rejects_zero_values() {
        assert!(
            HealthMonitorConfig::new(Duration::ZERO, 3, Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(
            HealthMonitorConfig::new(Duration::from_secs(1), 0, Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(HealthMonitorConfig::default().validate().is_ok());
    }
}
