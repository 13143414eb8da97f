use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudlet_broker::cli::{
    apply_serve_args, format_cloudlet_list, format_matchers, format_validation_result,
    BrokerClient, Cli, Commands, ServeArgs,
};
use cloudlet_broker::cluster::{ClusterBackend, CloudletRegistry};
use cloudlet_broker::config::{
    load_cloudlets_file, load_config, resolve_pipelines, validate_config,
};
use cloudlet_broker::jobs::{ExpireCloudletsJob, ExpireDeploymentsJob, ReportJob, Scheduler};
use cloudlet_broker::matcher::StageRegistry;
use cloudlet_broker::metrics::SystemCluster;
use cloudlet_broker::server::{self, AppState};

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified, then parse again so env fallbacks see it
    if let Commands::Serve(ServeArgs {
        env_file: Some(ref env_file),
        ..
    }) = cli.command
    {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
        cli = Cli::parse();
    }

    let result = match cli.command {
        Commands::Serve(args) => run_serve(cli.config, args).await,
        Commands::Matchers => run_matchers(cli.config),
        Commands::Cloudlets(args) => run_cloudlets(&args.url).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run_serve(config_path: Option<PathBuf>, args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    let config = apply_serve_args(config, &args);

    let stages = StageRegistry::with_builtins();
    let validation = validate_config(&config, &stages);
    for warning in validation.warnings() {
        warn!("{}", warning);
    }
    if !validation.passed {
        for err in validation.errors() {
            error!("{}", err);
        }
        bail!("Invalid configuration");
    }
    let pipelines = resolve_pipelines(&config, &stages)?;
    for pipeline in pipelines.values() {
        info!(
            "Pipeline '{}': {}",
            pipeline.class(),
            pipeline.names().join(" -> ")
        );
    }

    let registry = match &config.cloudlets {
        Some(path) => {
            let cloudlets = load_cloudlets_file(path)
                .with_context(|| format!("Failed to load cloudlets from {}", path.display()))?;
            info!("Preseeded {} cloudlet(s)", cloudlets.len());
            CloudletRegistry::with_cloudlets(cloudlets)
        }
        None => CloudletRegistry::new(),
    };

    let cluster: Arc<dyn ClusterBackend> = Arc::new(SystemCluster::new());
    let scheduler = Scheduler::new();
    scheduler.add_job(
        Arc::new(ExpireCloudletsJob::new(registry.clone(), config.staleness())),
        config.sweep_interval(),
    );
    scheduler.add_job(
        Arc::new(ExpireDeploymentsJob::new(cluster.clone())),
        config.deployment_expiry_interval(),
    );
    match ReportJob::from_config(&config, cluster)? {
        Some(job) => {
            info!(
                "Reporting to {} every {}s as {}",
                config.tier1_urls.join(", "),
                config.report_interval_secs,
                config.uuid
            );
            scheduler.add_job(Arc::new(job), config.report_interval());
        }
        None => info!("Upstream reporting disabled"),
    }

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Starting cloudlet-broker on {}", addr);
    let state = AppState::new(registry, pipelines, config.max_results);
    let served = server::serve(listener, state, shutdown_signal()).await;

    scheduler.shutdown().await;
    served.context("Server error")
}

fn run_matchers(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    let stages = StageRegistry::with_builtins();

    let validation = validate_config(&config, &stages);
    print!("{}", format_validation_result(&validation));
    if !validation.passed {
        bail!("Invalid matcher configuration");
    }

    let pipelines = resolve_pipelines(&config, &stages)?;
    print!("{}", format_matchers(stages.names(), &pipelines));
    Ok(())
}

async fn run_cloudlets(url: &str) -> anyhow::Result<()> {
    let cloudlets = BrokerClient::new(url).list_cloudlets().await?;
    print!("{}", format_cloudlet_list(&cloudlets));
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
