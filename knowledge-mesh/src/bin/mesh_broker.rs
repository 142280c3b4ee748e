//! Broker entry point: wires config, transport, store, evaluator, policy
//! admin, and the router into one process.

use std::sync::Arc;

use anyhow::Context;
use knowledge_mesh::config::MeshConfig;
use knowledge_mesh::enforcement::{EnforcementConfig, EnforcementService, HandlerPool, MeshRouter};
use knowledge_mesh::policy::{OpaClient, OpaConfig, PolicyAdmin, PolicyEvaluator};
use knowledge_mesh::registry::{
    DirectoryService, HealthMonitor, HealthMonitorConfig, HttpHealthProbe, RegistryService,
};
use knowledge_mesh::store::{MemoryStore, MeshStore, PolicyStore};
use knowledge_mesh::transport::{InMemoryTransport, Transport};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    knowledge_mesh::telemetry::init(false);
    let config = MeshConfig::from_env().context("loading configuration")?;
    info!(transport = %config.transport_url, policy = %config.policy_url, "mesh broker starting");

    let transport = build_transport(&config).await?;
    let (store, policy_store) = build_store(&config).await?;

    let evaluator: Arc<dyn PolicyEvaluator> = Arc::new(
        OpaClient::new(
            OpaConfig::new(config.policy_url.clone())
                .with_decision_path(config.policy_decision_path.clone())
                .with_timeout(config.request_timeout),
        )
        .context("constructing policy client")?,
    );

    let enforcement = Arc::new(EnforcementService::new(
        store.clone(),
        transport.clone(),
        evaluator.clone(),
        EnforcementConfig {
            dispatch_timeout: config.dispatch_timeout,
            heavy_audit: config.heavy_audit,
        },
    ));

    let admin = Arc::new(PolicyAdmin::new(
        policy_store,
        evaluator,
        config.policy_dir.clone(),
    ));

    let probe = Arc::new(HttpHealthProbe::new(config.request_timeout));
    let registry = Arc::new(
        RegistryService::new(store.clone(), transport.clone()).with_probe(probe.clone()),
    );
    let directory = Arc::new(DirectoryService::new(store));

    let monitor = HealthMonitor::new(
        registry.clone(),
        probe,
        HealthMonitorConfig::new(
            config.health_interval,
            config.health_failure_threshold,
            config.request_timeout,
        ),
    )
    .context("constructing health monitor")?;
    let monitor_shutdown = monitor.shutdown_flag();
    let monitor_handle = monitor.spawn();

    let router = Arc::new(MeshRouter::new(
        transport,
        enforcement,
        registry,
        directory,
        admin,
        HandlerPool::default(),
    ));

    tokio::select! {
        result = router.run() => {
            result.context("router stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    monitor_shutdown.store(true, std::sync::atomic::Ordering::Release);
    monitor_handle.abort();
    info!("mesh broker stopped");
    Ok(())
}

async fn build_transport(config: &MeshConfig) -> anyhow::Result<Arc<dyn Transport>> {
    if config.transport_url == "memory" {
        info!("using in-process transport");
        return Ok(Arc::new(InMemoryTransport::new()));
    }

    #[cfg(feature = "nats")]
    {
        let transport = knowledge_mesh::transport::NatsTransport::connect(&config.transport_url)
            .await
            .context("connecting to nats")?;
        Ok(Arc::new(transport))
    }

    #[cfg(not(feature = "nats"))]
    {
        anyhow::bail!(
            "transport url `{}` requires the `nats` feature; \
             set MESH_TRANSPORT_URL=memory for a single-process broker",
            config.transport_url
        )
    }
}

async fn build_store(
    config: &MeshConfig,
) -> anyhow::Result<(Arc<dyn MeshStore>, Arc<dyn PolicyStore>)> {
    let Some(database_url) = &config.database_url else {
        info!("using in-memory store");
        let store = Arc::new(MemoryStore::new());
        return Ok((store.clone(), store));
    };

    #[cfg(feature = "postgres")]
    {
        let store = Arc::new(
            knowledge_mesh::store::PostgresStore::connect(database_url)
                .await
                .context("connecting to postgres")?,
        );
        Ok((store.clone(), store))
    }

    #[cfg(not(feature = "postgres"))]
    {
        anyhow::bail!(
            "MESH_DATABASE_URL is set (`{database_url}`) but the `postgres` feature is not enabled"
        )
    }
}
