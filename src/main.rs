use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use mediaq::{
  config::Config, context::AppContext, media::default_registry, routes::routes, store::JobStore,
  worker,
};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();

  for dir in [&config.upload_dir, &config.processed_dir, &config.temp_dir] {
    std::fs::create_dir_all(dir).expect("Failed to create data directory");
  }

  let store = JobStore::connect(&config.database_url)
    .await
    .expect("Failed to connect to database");
  let registry = default_registry(&config);
  let ctx = AppContext::new(config.clone(), store, registry);

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let worker_handle = worker::spawn(ctx.clone(), shutdown_rx);

  let api = routes(ctx);
  let (addr, server) = warp::serve(api).bind_with_graceful_shutdown(
    ([0, 0, 0, 0], config.server_port),
    async {
      let _ = tokio::signal::ctrl_c().await;
    },
  );
  info!("Listening on {}", addr);
  server.await;

  // In-flight handler work is not pre-empted; wait for the current
  // iteration, bounded.
  let _ = shutdown_tx.send(true);
  if tokio::time::timeout(Duration::from_secs(30), worker_handle).await.is_err() {
    warn!("Worker did not stop within 30s, exiting anyway");
  }
}
