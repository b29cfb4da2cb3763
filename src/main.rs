// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! hostdash: live host metrics dashboard
//!
//! A small web dashboard that:
//! - Charts memory, load average, network traffic and disk I/O on rolling windows
//! - Shows CPU usage, uptime, platform, disks, addresses, users, sockets and processes
//! - Keeps no history on the server: chart windows round-trip through client cookies

mod api;
mod auth;
mod charts;
mod config;
mod dashboard;
mod monitoring;
mod sampler;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// hostdash: live host metrics dashboard
#[derive(Parser)]
#[command(name = "hostdash", version, about = "Live host metrics dashboard")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8560)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (TOML)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding index.html, login.html and static assets
    #[arg(long)]
    web_dir: Option<PathBuf>,

    /// TLS certificate path (PEM)
    #[arg(long)]
    tls_cert: Option<String>,

    /// TLS private key path (PEM)
    #[arg(long)]
    tls_key: Option<String>,

    /// Print the Argon2 hash to put in `auth.password_hash` for a password, then exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostdash=info".parse().expect("static directive"))
                .add_directive("actix_web=info".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(password) = &cli.hash_password {
        return match auth::hash_password(password) {
            Ok(hash) => {
                println!("{}", hash);
                Ok(())
            }
            Err(e) => Err(std::io::Error::other(e)),
        };
    }

    let config = config::load_config(&cli.config);
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    info!("");
    info!("  hostdash v{}", env!("CARGO_PKG_VERSION"));
    info!("  ──────────────────────────────────");
    info!("  Hostname:   {}", hostname);
    info!("  Charts:     every {} ms", config.time_refresh_net_ms);
    if let Some(iface) = &config.interface {
        info!("  Interface:  {}", iface);
    }
    if let Some(disk) = &config.disk {
        info!("  Disk:       {}", disk);
    }
    if !config.auth_enabled() {
        warn!("  No auth.password_hash configured, dashboard is open to anyone who can reach it");
    }

    let monitor = monitoring::SystemMonitor::new(monitoring::MonitorTargets {
        interface: config.interface.clone(),
        disk: config.disk.clone(),
    });
    let provider: Box<dyn monitoring::MetricsProvider> = Box::new(monitor);

    let sessions = Arc::new(auth::SessionManager::new(config.session_lifetime()));

    // Background: session cleanup
    let sessions_cleanup = sessions.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            sessions_cleanup.cleanup();
        }
    });

    let web_dir = find_web_dir(cli.web_dir.as_deref());
    match &web_dir {
        Some(dir) => info!("  Serving web UI from: {}", dir.display()),
        None => info!("  No web UI found, serving JSON only"),
    }

    let app_state = web::Data::new(api::AppState {
        provider: Arc::new(Mutex::new(provider)),
        sessions,
        config,
        web_dir: web_dir.clone(),
    });

    let ssl_builder = match (&cli.tls_cert, &cli.tls_key) {
        (Some(cert), Some(key)) => load_tls(cert, key),
        _ => None,
    };

    let bind = format!("{}:{}", cli.bind, cli.port);
    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(app_state.clone())
            .configure(api::configure);
        if let Some(dir) = &web_dir {
            app = app.service(actix_files::Files::new("/static", dir.join("static")));
        }
        app
    });

    if let Some(ssl_builder) = ssl_builder {
        info!("  TLS enabled, https://{}", bind);
        info!("");
        server
            .bind_openssl(&bind, ssl_builder)
            .map_err(|e| {
                tracing::error!("Failed to bind HTTPS on {}: {}", bind, e);
                e
            })?
            .run()
            .await
    } else {
        info!("  Dashboard: http://{}", bind);
        info!("");
        server
            .bind(&bind)
            .map_err(|e| {
                tracing::error!("Failed to bind HTTP on {}: {}", bind, e);
                e
            })?
            .run()
            .await
    }
}

/// Build an OpenSSL acceptor; any failure falls back to plain HTTP
fn load_tls(cert_path: &str, key_path: &str) -> Option<openssl::ssl::SslAcceptorBuilder> {
    use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

    let mut builder = match SslAcceptor::mozilla_intermediate(SslMethod::tls()) {
        Ok(b) => b,
        Err(e) => {
            warn!("Failed to create SSL acceptor: {}, falling back to HTTP", e);
            return None;
        }
    };
    if let Err(e) = builder.set_certificate_chain_file(cert_path) {
        warn!("Cannot load TLS cert '{}': {}, falling back to HTTP", cert_path, e);
        return None;
    }
    if let Err(e) = builder.set_private_key_file(key_path, SslFiletype::PEM) {
        warn!("Cannot load TLS key '{}': {}, falling back to HTTP", key_path, e);
        return None;
    }
    Some(builder)
}

/// Find the web directory: an explicit path wins, then the usual install locations
fn find_web_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }

    let candidates = [
        // Development
        "web",
        // Installed
        "/opt/hostdash/web",
        "/usr/share/hostdash/web",
    ];
    candidates.iter()
        .map(Path::new)
        .find(|path| path.join("index.html").exists())
        .map(Path::to_path_buf)
}
