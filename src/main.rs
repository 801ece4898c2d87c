mod config;
mod error;
mod payload;
mod proxy;
mod redact;
mod rules;
mod scanner;
mod stats;
mod walker;

use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn};

use config::{Config, FailurePolicy, LeakAction, ScanMode};
use proxy::{handle_request, ProxyState};
use rules::RuleSet;
use scanner::Scanner;
use stats::Stats;

#[derive(Parser, Debug)]
#[command(
    name = "leakguard",
    version,
    about = "Secret-scanning proxy for the Anthropic Messages API",
    long_about = "Leakguard sits between your client and the API, scans outgoing \
    conversation text for credentials and either redacts them or rejects the request."
)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Gitleaks-style TOML ruleset (defaults to the bundled rules)
    #[arg(short, long)]
    rules: Option<String>,

    /// Reject requests containing secrets instead of redacting them
    #[arg(long)]
    reject: bool,

    /// Upstream base URL (overrides config and ANTHROPIC_BASE_URL)
    #[arg(short, long)]
    upstream: Option<String>,

    /// Scan mode (structured, raw)
    #[arg(long)]
    scan_mode: Option<String>,

    /// Forward the original body when a redacted body cannot be serialized
    #[arg(long)]
    fail_open: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    // Config file, then environment, then CLI flags.
    let mut cfg = Config::load(args.config.as_deref())?;
    cfg.apply_env();

    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(upstream) = args.upstream {
        cfg.upstream = upstream;
    }
    if let Some(rules) = args.rules {
        cfg.rules = Some(rules.into());
    }
    if args.reject {
        cfg.mode = LeakAction::Reject;
    }
    if args.fail_open {
        cfg.on_serialize_error = FailurePolicy::FailOpen;
    }
    if let Some(ref mode) = args.scan_mode {
        cfg.scan_mode = match mode.as_str() {
            "raw" => ScanMode::Raw,
            "structured" => ScanMode::Structured,
            other => {
                warn!("Unknown scan mode '{}', using structured", other);
                ScanMode::Structured
            }
        };
    }

    run(cfg).await?;
    Ok(())
}

/// Load rules, bind, and serve until Ctrl-C.
async fn run(cfg: Config) -> error::Result<()> {
    let ruleset = match &cfg.rules {
        Some(path) => RuleSet::load(path)?,
        None => RuleSet::builtin()?,
    };
    let rule_count = ruleset.len();
    debug!(rules = ?ruleset.rule_ids().collect::<Vec<_>>(), "active rules");
    let scanner = Scanner::new(Arc::new(ruleset), info_span!("scanner"));

    let stats = Stats::new();
    let state = Arc::new(ProxyState::new(cfg.clone(), scanner, stats.clone())?);

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    eprintln!();
    eprintln!("  \x1b[1mleakguard\x1b[0m v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  ─────────────────────────────────────");
    eprintln!("  listen:   http://{}", addr);
    eprintln!("  upstream: \x1b[36m{}\x1b[0m", cfg.upstream);
    eprintln!(
        "  rules:    {} ({})",
        rule_count,
        cfg.rules
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    eprintln!(
        "  mode:     {} / {}",
        if cfg.reject_on_leak() { "reject" } else { "redact" },
        format!("{:?}", cfg.scan_mode).to_lowercase()
    );
    eprintln!("  debug:    POST {}", cfg.debug_path);
    eprintln!("  ─────────────────────────────────────");
    eprintln!();

    let stats_handle = stats.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let reqs = stats_handle
                .requests
                .load(std::sync::atomic::Ordering::Relaxed);
            if reqs > 0 {
                info!("stats: {}", stats_handle.display());
            }
        }
    });

    let graceful = GracefulShutdown::new();
    let read_timeout = cfg.timeouts.read();
    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();

                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { handle_request(req, state).await }
                });
                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout)
                    .serve_connection(io, service);
                let conn = graceful.watch(conn);

                tokio::task::spawn(async move {
                    if let Err(err) = conn.await {
                        if !err.to_string().contains("connection closed") {
                            error!("Connection error from {}: {}", remote, err);
                        }
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, draining connections");
                break;
            }
        }
    }

    drop(listener);
    let grace = cfg.timeouts.shutdown();
    match tokio::time::timeout(grace, graceful.shutdown()).await {
        Ok(()) => info!("All connections closed"),
        Err(_) => warn!("Timed out after {}s waiting for connections", grace.as_secs()),
    }
    info!("Final stats: {}", stats.display());
    Ok(())
}
