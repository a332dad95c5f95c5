mod config;
mod engine;
mod handlers;
mod health;
mod metrics;
mod patch;
mod scheme;
mod sidecar;
mod tls;
mod workloads;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use hyper_util::service::TowerToHyperService;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "secrets-injector",
    about = "Mutating admission webhook injecting a secrets init container"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "/etc/secrets-injector/config.yaml", env = "INJECTOR_CONFIG")]
    config: String,
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received CTRL+C, starting graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, starting graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
        info!("received CTRL+C, starting graceful shutdown");
    }

    let _ = shutdown_tx.send(());
}

async fn run_webhook_server(
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("failed to accept TCP connection: {e}");
                        continue;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("webhook server shutting down");
                break;
            }
        };

        let tls_acceptor = tls_acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(%remote_addr, "TLS handshake failed: {e}");
                    return;
                }
            };

            let io = TokioIo::new(tls_stream);
            let service = TowerToHyperService::new(router.into_service());

            if let Err(e) = HttpBuilder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!(%remote_addr, "error serving connection: {e}");
            }
        });
    }
}

async fn run_health_server(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            info!("health server shutting down");
        })
        .await
        .unwrap_or_else(|e| error!("health server error: {e}"));
}

async fn bind(addr: SocketAddr, what: &str) -> TcpListener {
    TcpListener::bind(addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind {what} listener on {addr}: {e}");
        std::process::exit(1);
    })
}

fn parse_addr(value: &str, field: &str) -> SocketAddr {
    value.parse().unwrap_or_else(|e| {
        eprintln!("Invalid {field} '{value}': {e}");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install default CryptoProvider");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let config = config::InjectorConfig::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Failed to load config from {}: {e}", cli.config);
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        listen_addr = %config.listen_addr,
        metrics_addr = %config.metrics_addr,
        log_level = %config.log_level,
        workload_kind = %config.workload_kind,
        "secrets-injector starting"
    );

    let tls_config = tls::load_tls_config(&config.tls_cert_path, &config.tls_key_path)
        .unwrap_or_else(|e| {
            eprintln!("Failed to load TLS config: {e}");
            std::process::exit(1);
        });
    let tls_acceptor = TlsAcceptor::from(tls_config);

    let mut registry = Registry::default();
    let injector_metrics = metrics::InjectorMetrics::new(&mut registry, config.workload_kind);
    let registry = Arc::new(registry);

    let app_state = Arc::new(handlers::AppState {
        engine: engine::InjectionEngine::new(config.workload_kind),
        scheme: scheme::Scheme::default(),
        metrics: injector_metrics,
    });
    let webhook_router = handlers::webhook_router(app_state);

    let readiness = health::Readiness::new(config.workload_kind);
    let health_router = health::health_router(Arc::new(health::HealthState {
        registry,
        readiness: readiness.clone(),
    }));

    let listen_addr = parse_addr(&config.listen_addr, "listen_addr");
    let metrics_addr = parse_addr(&config.metrics_addr, "metrics_addr");

    let webhook_listener = bind(listen_addr, "webhook").await;
    info!(%listen_addr, "HTTPS webhook server listening");
    readiness.mark_serving();
    let health_listener = bind(metrics_addr, "health").await;
    info!(%metrics_addr, "HTTP metrics/health server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(shutdown_signal(shutdown_tx));

    tokio::join!(
        run_webhook_server(webhook_listener, tls_acceptor, webhook_router, shutdown_rx.clone()),
        run_health_server(health_listener, health_router, shutdown_rx),
    );

    info!("secrets-injector shut down gracefully");
}
