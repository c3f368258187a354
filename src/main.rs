use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage_orchestrator::config::OrchestratorConfig;
use storage_orchestrator::executor::queue::TaskQueue;
use storage_orchestrator::metadata::memory::InMemoryMetadata;
use storage_orchestrator::metadata::repository::MetadataRepository;
use storage_orchestrator::metadata::types::UserId;
use storage_orchestrator::nodes::directory::NodeDirectory;
use storage_orchestrator::nodes::selector::NodeSelector;
use storage_orchestrator::nodes::server::{BlobStore, router};
use storage_orchestrator::service::files::FileService;
use storage_orchestrator::service::permissions::RepositoryPermissions;

const STATS_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const UPLOAD_DIRECTORY: &str = "uploads";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("node") => run_node(&args[2..]).await,
        Some("coordinator") => run_coordinator(&args[2..]).await,
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} node --bind <addr:port>", program);
    eprintln!(
        "       {} coordinator --config <file> [--owner <id>] [--upload <path>]...",
        program
    );
    eprintln!("Example: {} node --bind 127.0.0.1:7001", program);
    eprintln!(
        "Example: {} coordinator --config cluster.json --upload ./report.pdf",
        program
    );
}

/// Value following a flag, e.g. the address after `--bind`.
fn flag_value<'a>(args: &'a [String], i: usize) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", args[i]))
}

async fn run_node(args: &[String]) -> anyhow::Result<()> {
    let mut bind_addr: Option<SocketAddr> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(flag_value(args, i)?.parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.context("--bind is required")?;
    let store = BlobStore::new();

    let stats_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            interval.tick().await;
            tracing::info!(
                "Node stats: {} blob(s), {} bytes",
                stats_store.len(),
                stats_store.bytes_stored()
            );
        }
    });

    tracing::info!("Storage node listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router(store)).await?;

    Ok(())
}

async fn run_coordinator(args: &[String]) -> anyhow::Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut owner = UserId(1);
    let mut uploads: Vec<PathBuf> = vec![];

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            "--owner" => {
                owner = UserId(flag_value(args, i)?.parse()?);
                i += 2;
            }
            "--upload" => {
                uploads.push(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let config_path = config_path.context("--config is required")?;
    let config = OrchestratorConfig::load(&config_path)?;
    tracing::info!(
        "Loaded {} with {} node(s), replication factor {}",
        config_path.display(),
        config.nodes.len(),
        config.selector.replication_factor
    );

    // 1. Metadata and node registration:
    let metadata: Arc<dyn MetadataRepository> = Arc::new(InMemoryMetadata::new());
    let directory = NodeDirectory::from_endpoints(metadata.as_ref(), &config.nodes).await?;

    // 2. Selector with background metrics preload and resync:
    let selector = NodeSelector::new(
        directory.into_nodes(),
        metadata.clone(),
        config.selector.clone(),
    )?;
    let _metrics = selector.start();

    // 3. Worker pool and service:
    let queue = TaskQueue::start(config.worker_count);
    let permissions = Arc::new(RepositoryPermissions::new(metadata.clone()));
    let service = Arc::new(FileService::new(
        metadata,
        permissions,
        selector,
        queue,
        &config,
    ));

    // 4. Requested uploads:
    if !uploads.is_empty() {
        upload_files(&service, owner, &uploads).await?;
    }

    // 5. Spawn stats reporter:
    let stats_service = service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            interval.tick().await;
            let queue = stats_service.queue_stats();
            tracing::info!(
                "Queue stats: {} enqueued, {} ok, {} failed, {} in flight",
                queue.enqueued,
                queue.succeeded,
                queue.failed,
                queue.in_flight
            );
            for node in stats_service.node_stats() {
                tracing::info!(
                    "  - {} {} used={}/{} files={} active={} weight={:.3}",
                    node.id,
                    node.endpoint,
                    node.space_used_bytes,
                    node.capacity_bytes,
                    node.file_count,
                    node.active_tasks,
                    node.weight
                );
            }
        }
    });

    tracing::info!("Coordinator running. Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    service.shutdown(Some(SHUTDOWN_GRACE)).await;

    Ok(())
}

async fn upload_files(
    service: &FileService,
    owner: UserId,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let directory_id = service
        .create_directory(UPLOAD_DIRECTORY, owner)
        .await
        .map_err(|response| {
            anyhow::anyhow!("cannot create upload directory: {}", response.message)
        })?;

    for path in paths {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        match service.upload_file(directory_id, name, content, owner).await {
            Ok(receipt) => tracing::info!(
                "Uploaded {} as {} to {:?}",
                path.display(),
                receipt.file_id,
                receipt.stored_on
            ),
            Err(response) => tracing::warn!(
                "Upload of {} failed [{}]: {}",
                path.display(),
                response.code().unwrap_or("UNKNOWN"),
                response.message
            ),
        }
    }

    Ok(())
}
