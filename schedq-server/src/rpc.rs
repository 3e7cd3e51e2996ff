//! Scheduler RPC service
//!
//! Mirrors the scheduler API one-to-one over binary protobuf frames
//! carried on a WebSocket. Each frame is an `RpcRequest` envelope; the
//! reply is an `RpcResponse` whose payload is the encoded result message.

use crate::error::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use prost::Message as ProstMessage;
use schedq::job::Job;
use schedq::proto::{Empty, JobId, Jobs, RpcRequest, RpcResponse};
use schedq::rpc::RPC_PATH;
use schedq::scheduler::Scheduler;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default bind address of the scheduler RPC service.
pub const DEFAULT_SCHEDULER_RPC_ADDRESS: &str = "127.0.0.1:36360";

#[derive(Clone)]
struct AppState {
  scheduler: Arc<Scheduler>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
  ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
  while let Some(Ok(frame)) = socket.recv().await {
    match frame {
      Message::Binary(data) => {
        let response = dispatch(&state.scheduler, &data).await;
        if socket
          .send(Message::Binary(response.encode_to_vec()))
          .await
          .is_err()
        {
          break;
        }
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
}

async fn dispatch(scheduler: &Arc<Scheduler>, data: &[u8]) -> RpcResponse {
  let request = match RpcRequest::decode(data) {
    Ok(request) => request,
    Err(e) => {
      return RpcResponse {
        payload: Vec::new(),
        error: e.to_string(),
      }
    }
  };

  match handle_request(scheduler, request).await {
    Ok(payload) => RpcResponse {
      payload,
      error: String::new(),
    },
    Err(e) => RpcResponse {
      payload: Vec::new(),
      error: e.to_string(),
    },
  }
}

async fn handle_request(
  scheduler: &Arc<Scheduler>,
  request: RpcRequest,
) -> schedq::error::Result<Vec<u8>> {
  let payload = request.payload.as_slice();
  match request.method.as_str() {
    "AddJob" => {
      let j = Job::try_from(schedq::proto::Job::decode(payload)?)?;
      let j = scheduler.add_job(j).await?;
      Ok(schedq::proto::Job::from(&j).encode_to_vec())
    }
    "GetJob" => {
      let id = JobId::decode(payload)?;
      let j = scheduler.get_job(&id.id).await?;
      Ok(schedq::proto::Job::from(&j).encode_to_vec())
    }
    "GetAllJobs" => {
      let js = scheduler.get_all_jobs().await?;
      Ok(Jobs::from(js.as_slice()).encode_to_vec())
    }
    "UpdateJob" => {
      let j = Job::try_from(schedq::proto::Job::decode(payload)?)?;
      let j = scheduler.update_job(j).await?;
      Ok(schedq::proto::Job::from(&j).encode_to_vec())
    }
    "DeleteJob" => {
      let id = JobId::decode(payload)?;
      scheduler.delete_job(&id.id).await?;
      Ok(Empty {}.encode_to_vec())
    }
    "DeleteAllJobs" => {
      scheduler.delete_all_jobs().await?;
      Ok(Empty {}.encode_to_vec())
    }
    "PauseJob" => {
      let id = JobId::decode(payload)?;
      let j = scheduler.pause_job(&id.id).await?;
      Ok(schedq::proto::Job::from(&j).encode_to_vec())
    }
    "ResumeJob" => {
      let id = JobId::decode(payload)?;
      let j = scheduler.resume_job(&id.id).await?;
      Ok(schedq::proto::Job::from(&j).encode_to_vec())
    }
    "RunJob" => {
      let pb_job = schedq::proto::Job::decode(payload)?;
      // A cluster-originated hand-off runs locally; anything else goes
      // through cluster-aware scheduling
      let scheduled = pb_job.scheduled;
      let j = Job::try_from(pb_job)?;
      if scheduled {
        scheduler.run_job(j)?;
      } else {
        scheduler.schedule_job(j)?;
      }
      Ok(Empty {}.encode_to_vec())
    }
    "ScheduleJob" => {
      let j = Job::try_from(schedq::proto::Job::decode(payload)?)?;
      scheduler.schedule_job(j)?;
      Ok(Empty {}.encode_to_vec())
    }
    "Start" => {
      scheduler.start();
      Ok(Empty {}.encode_to_vec())
    }
    "Stop" => {
      scheduler.stop();
      Ok(Empty {}.encode_to_vec())
    }
    method => Err(schedq::error::Error::rpc_transport(format!(
      "unknown method `{}`",
      method
    ))),
  }
}

/// Scheduler RPC service.
pub struct SchedulerRpcService {
  scheduler: Arc<Scheduler>,
  address: String,
}

impl SchedulerRpcService {
  /// Create the service bound to the default address.
  pub fn new(scheduler: Arc<Scheduler>) -> Self {
    Self {
      scheduler,
      address: DEFAULT_SCHEDULER_RPC_ADDRESS.to_string(),
    }
  }

  /// Override the bind address.
  pub fn with_address(mut self, address: impl Into<String>) -> Self {
    self.address = address.into();
    self
  }

  fn router(&self) -> Router {
    let state = AppState {
      scheduler: Arc::clone(&self.scheduler),
    };
    Router::new().route(RPC_PATH, get(ws_handler)).with_state(state)
  }

  /// Bind the listener and serve in a background task.
  pub async fn start(&self) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&self.address).await?;
    info!("Scheduler RPC Service listening at: {}", self.address);

    let router = self.router();
    Ok(tokio::spawn(async move {
      if let Err(e) = axum::serve(listener, router).await {
        error!("Scheduler RPC Service Unavailable: {}", e);
      }
    }))
  }
}
