//! Schedq server binary
//!
//! A standalone scheduler node: binds a store, starts the HTTP and RPC
//! services and, when cluster endpoints are configured, joins the
//! cluster.

use schedq::cluster::ClusterNode;
use schedq::registry;
use schedq::scheduler::Scheduler;
use schedq::store::{MemoryStore, RedisStore, Store};
use schedq_server::{
  ClusterHttpService, ClusterRpcService, SchedulerHttpService, SchedulerRpcService,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::from_default_env().add_directive("schedq=info".parse()?))
    .init();

  registry::register_func("examples.print_msg", |_token, job| async move {
    info!("Run job `{}` {:?}", job.full_name(), job.args);
    Ok(())
  });

  let store: Arc<dyn Store> = match std::env::var("SCHEDQ_STORE").as_deref() {
    Ok("redis") => {
      let url =
        std::env::var("SCHEDQ_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
      Arc::new(RedisStore::open(&url)?)
    }
    _ => Arc::new(MemoryStore::new()),
  };

  let scheduler = Arc::new(Scheduler::new());
  scheduler.set_store(store).await?;

  let http_address = std::env::var("SCHEDQ_HTTP_ADDR")
    .unwrap_or_else(|_| schedq_server::http::DEFAULT_SCHEDULER_HTTP_ADDRESS.to_string());
  let rpc_address = std::env::var("SCHEDQ_RPC_ADDR")
    .unwrap_or_else(|_| schedq_server::rpc::DEFAULT_SCHEDULER_RPC_ADDRESS.to_string());

  SchedulerHttpService::new(Arc::clone(&scheduler))
    .with_address(&http_address)
    .start()
    .await?;
  SchedulerRpcService::new(Arc::clone(&scheduler))
    .with_address(&rpc_address)
    .start()
    .await?;

  // Cluster mode is opted into by configuring the endpoints
  if let (Ok(main_endpoint), Ok(endpoint)) = (
    std::env::var("SCHEDQ_CLUSTER_MAIN_ENDPOINT"),
    std::env::var("SCHEDQ_CLUSTER_ENDPOINT"),
  ) {
    let endpoint_http =
      std::env::var("SCHEDQ_CLUSTER_ENDPOINT_HTTP").unwrap_or_else(|_| "127.0.0.1:36390".to_string());
    let queue = std::env::var("SCHEDQ_QUEUE").unwrap_or_else(|_| "default".to_string());

    let cluster_node = Arc::new(ClusterNode::new(
      main_endpoint,
      endpoint,
      endpoint_http,
      rpc_address.clone(),
      queue,
    ));

    // The node must accept Register/Ping before joining
    ClusterRpcService::new(Arc::clone(&cluster_node)).start().await?;
    ClusterHttpService::new(Arc::clone(&cluster_node)).start().await?;

    scheduler.set_cluster_node(cluster_node).await?;
  }

  info!("schedq-server is ready");
  tokio::signal::ctrl_c().await?;
  scheduler.stop();

  Ok(())
}
