//! 内存存储的最小示例
//! Minimal example on the memory store
//!
//! ```shell
//! cargo run --example memory_scheduler
//! ```

use schedq::job::{Job, JobType};
use schedq::registry;
use schedq::scheduler::Scheduler;
use schedq::store::MemoryStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt::init();

  registry::register_func("examples.print_msg", |_token, job| async move {
    info!("Run job `{}` {:?}", job.full_name(), job.args);
    Ok(())
  });

  let scheduler = Arc::new(Scheduler::new());
  scheduler.set_store(Arc::new(MemoryStore::new())).await?;

  let job = Job {
    name: "myJob".to_string(),
    job_type: JobType::Interval,
    interval: "2s".to_string(),
    func_name: "examples.print_msg".to_string(),
    args: std::collections::HashMap::from([(
      "msg".to_string(),
      serde_json::json!("hello from schedq"),
    )]),
    ..Default::default()
  };
  let job = scheduler.add_job(job).await?;
  info!("Added job `{}`", job.full_name());

  tokio::time::sleep(std::time::Duration::from_secs(10)).await;
  scheduler.stop();
  Ok(())
}
