mod collectors;
mod config;
mod http;

use std::sync::Arc;

use clap::Parser;
use pdexp_metrics::MetricsRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Cli;

/// Default filter directives: the library crates and this binary, plus
/// request traces in debug mode.
fn log_directives(debug: bool) -> Vec<String> {
    let level = if debug { "debug" } else { "info" };
    let mut directives = vec![
        format!("pdexp={level}"),
        format!("{}={level}", env!("CARGO_CRATE_NAME")),
    ];
    if debug {
        directives.push("tower_http=debug".to_string());
    }
    directives
}

fn init_tracing(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut env_filter = EnvFilter::from_default_env();
    for directive in log_directives(cli.log_debug) {
        env_filter = env_filter.add_directive(directive.parse()?);
    }

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli)?;
    cli.validate()?;

    let registry = Arc::new(MetricsRegistry::new());
    let exporter = collectors::build_exporter(&cli, registry.clone())?;
    info!(collectors = exporter.len(), "starting collectors");

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "unable to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    let collectors = tokio::spawn(exporter.run(cancel.clone()));

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!("pagerduty exporter listening on {}", cli.bind);
    let shutdown = cancel.clone();
    axum::serve(listener, http::router(registry, cli.server_timeout))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // Surfaces the collector error that stopped the server, if any.
    collectors.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::Directive;

    use super::*;

    #[test]
    fn default_directives_cover_the_binary_target() {
        let target = module_path!().split("::").next().unwrap();
        assert!(log_directives(false).contains(&format!("{target}=info")));
        assert!(log_directives(false).contains(&"pdexp=info".to_string()));
        assert!(log_directives(true).contains(&format!("{target}=debug")));
    }

    #[test]
    fn default_directives_parse() {
        for debug in [false, true] {
            for directive in log_directives(debug) {
                directive.parse::<Directive>().unwrap();
            }
        }
    }
}
