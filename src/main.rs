//! Relic operator - resolves externally-stored artifacts for ResolutionRequests

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relic::config::ConfigMapSource;
use relic::crd::ResolutionRequest;
use relic::git::GitResolver;
use relic::leader::AlwaysLeader;
use relic::reconciler::{
    error_policy, reconcile, KubeRequestClient, Reconciler, ReflectorStore,
};
use relic::resolver::{ResolutionContext, Resolver};

/// Relic - CRD-driven Kubernetes operator for artifact resolution
#[derive(Parser, Debug)]
#[command(name = "relic", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Namespace holding resolver ConfigMaps
    #[arg(long, env = "SYSTEM_NAMESPACE", default_value = "relic-resolvers")]
    config_namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ResolutionRequest::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    run_controller(cli).await
}

/// Run the resolution controller with the Git resolver
async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Relic controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let resolver = Arc::new(GitResolver);

    // Only requests labeled for this resolver are delivered.
    let selector = resolver
        .get_selector(&ResolutionContext::background())
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    tracing::info!(selector = %selector, "watching resolution requests");

    let requests: Api<ResolutionRequest> = Api::all(client.clone());
    let controller = Controller::new(requests, WatcherConfig::default().labels(&selector));

    let reconciler = Arc::new(Reconciler::new(
        resolver,
        Arc::new(ReflectorStore::new(controller.store())),
        Arc::new(KubeRequestClient::new(client.clone())),
        Arc::new(ConfigMapSource::new(client, cli.config_namespace)),
        Arc::new(AlwaysLeader),
    ));

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok(request) => {
                    tracing::debug!(?request, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Relic controller stopped");
    Ok(())
}
