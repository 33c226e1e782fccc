use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use request_guard::clock::{Clock, SystemClock};
use request_guard::config::{Args, GuardConfig};
use request_guard::guard::Guard;
use request_guard::rate_limit::CounterStore;
use request_guard::server::build_router;
use request_guard::state::AppState;
use request_guard::sweeper::sweeper;
use request_guard::token::TokenStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_guard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();

    // bad policies stop startup here
    let config = GuardConfig::load(&args)?;
    let policies = config.policy_table()?;
    let routes = config.route_table(&policies)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters = Arc::new(CounterStore::new(clock.clone()));
    let tokens = Arc::new(TokenStore::new(clock));
    let guard = Guard::new(
        counters.clone(),
        tokens.clone(),
        policies,
        config.single_use_tokens,
    );

    // creating shared state
    let state = Arc::new(AppState {
        guard,
        counters: counters.clone(),
        tokens: tokens.clone(),
        routes,
        trusted_proxies: config.trusted_proxies.clone(),
        token_lifetime_ms: config.token_lifetime_ms,
        admin_key: args.admin_key.clone(),
        client: reqwest::Client::new(),
        upstream: args.upstream.clone(),
    });

    // spawn the background sweeper
    tokio::spawn(sweeper(
        counters,
        tokens,
        Duration::from_secs(args.sweep_interval.max(1)),
    ));

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Guard running on http://localhost:{}", args.port);
    match &args.upstream {
        Some(upstream) => tracing::info!("Forwarding admitted requests to {}", upstream),
        None => tracing::warn!("No upstream configured, unmatched routes answer 503"),
    }
    tracing::info!(
        classes = config.classes.len(),
        token_lifetime_ms = config.token_lifetime_ms,
        single_use = config.single_use_tokens,
        "guard policies loaded"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
