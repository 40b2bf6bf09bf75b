use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;

use shardstore::cluster::config::Config;
use shardstore::cluster::coordinator;
use shardstore::cluster::handlers;
use shardstore::cluster::state::ClusterState;
use shardstore::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Node starting at {} with view {:?}",
        config.address,
        config.view
    );

    let state = Arc::new(ClusterState::new(&config));

    if config.is_setup_coordinator() {
        tracing::info!("Node coordinating setup");
        coordinator::coordinate_setup(&state, config.view.clone()).await?;
    } else if config.view.contains(&config.address) {
        // Fetch our initial view in the background so the HTTP server is up
        // before the setup coordinator answers.
        let leader = config.view[0].clone();
        let join_state = state.clone();
        tokio::spawn(async move {
            coordinator::join_view(&join_state, &leader).await;
        });
    } else {
        tracing::warn!(
            "{} is not in the configured view; node will stay inactive",
            config.address
        );
    }

    let app = handlers::router(state).layer(middleware::from_fn(logging::log_requests));

    let listen = SocketAddr::from(([0, 0, 0, 0], config.listen_port()));
    tracing::info!("Listening on {}", listen);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
