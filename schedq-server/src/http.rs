//! Scheduler HTTP service
//!
//! A thin JSON translation layer over the scheduler API. Every handled
//! response is HTTP 200 with the `{"data": ..., "error": ""}` envelope;
//! only body-parse failures answer 400.

use crate::error::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use schedq::job::Job;
use schedq::scheduler::Scheduler;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Default bind address of the scheduler HTTP service.
pub const DEFAULT_SCHEDULER_HTTP_ADDRESS: &str = "127.0.0.1:36370";

#[derive(Clone)]
struct AppState {
  scheduler: Arc<Scheduler>,
}

fn envelope<T: Serialize>(data: Option<T>, error: &str) -> Json<Value> {
  Json(json!({ "data": data, "error": error }))
}

fn handle_job(result: schedq::error::Result<Job>) -> Json<Value> {
  match result {
    Ok(j) => envelope(Some(j), ""),
    Err(e) => envelope(None::<Job>, &e.to_string()),
  }
}

fn handle_unit(result: schedq::error::Result<()>) -> Json<Value> {
  match result {
    Ok(()) => envelope(None::<Value>, ""),
    Err(e) => envelope(None::<Value>, &e.to_string()),
  }
}

fn bad_request(rejection: JsonRejection) -> Response {
  (
    StatusCode::BAD_REQUEST,
    envelope(None::<Value>, &rejection.to_string()),
  )
    .into_response()
}

async fn add_job(
  State(state): State<AppState>,
  payload: std::result::Result<Json<Job>, JsonRejection>,
) -> Response {
  match payload {
    Ok(Json(j)) => handle_job(state.scheduler.add_job(j).await).into_response(),
    Err(rejection) => bad_request(rejection),
  }
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
  handle_job(state.scheduler.get_job(&id).await)
}

async fn get_all_jobs(State(state): State<AppState>) -> Json<Value> {
  match state.scheduler.get_all_jobs().await {
    Ok(js) => envelope(Some(js), ""),
    Err(e) => envelope(None::<Vec<Job>>, &e.to_string()),
  }
}

async fn update_job(
  State(state): State<AppState>,
  payload: std::result::Result<Json<Job>, JsonRejection>,
) -> Response {
  match payload {
    Ok(Json(j)) => handle_job(state.scheduler.update_job(j).await).into_response(),
    Err(rejection) => bad_request(rejection),
  }
}

async fn delete_job(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
  handle_unit(state.scheduler.delete_job(&id).await)
}

async fn delete_all_jobs(State(state): State<AppState>) -> Json<Value> {
  handle_unit(state.scheduler.delete_all_jobs().await)
}

async fn pause_job(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
  handle_job(state.scheduler.pause_job(&id).await)
}

async fn resume_job(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
  handle_job(state.scheduler.resume_job(&id).await)
}

async fn run_job(
  State(state): State<AppState>,
  payload: std::result::Result<Json<Job>, JsonRejection>,
) -> Response {
  match payload {
    Ok(Json(j)) => handle_unit(state.scheduler.run_job(j)).into_response(),
    Err(rejection) => bad_request(rejection),
  }
}

async fn start(State(state): State<AppState>) -> Json<Value> {
  state.scheduler.start();
  envelope(None::<Value>, "")
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
  state.scheduler.stop();
  envelope(None::<Value>, "")
}

/// Scheduler HTTP service.
pub struct SchedulerHttpService {
  scheduler: Arc<Scheduler>,
  address: String,
}

impl SchedulerHttpService {
  /// Create the service bound to the default address.
  pub fn new(scheduler: Arc<Scheduler>) -> Self {
    Self {
      scheduler,
      address: DEFAULT_SCHEDULER_HTTP_ADDRESS.to_string(),
    }
  }

  /// Override the bind address.
  pub fn with_address(mut self, address: impl Into<String>) -> Self {
    self.address = address.into();
    self
  }

  /// Build the router; exposed for in-process testing.
  pub fn router(&self) -> Router {
    let state = AppState {
      scheduler: Arc::clone(&self.scheduler),
    };
    Router::new()
      .route("/scheduler/job", post(add_job).put(update_job))
      .route("/scheduler/job/:id", get(get_job).delete(delete_job))
      .route("/scheduler/jobs", get(get_all_jobs).delete(delete_all_jobs))
      .route("/scheduler/job/:id/pause", post(pause_job))
      .route("/scheduler/job/:id/resume", post(resume_job))
      .route("/scheduler/job/run", post(run_job))
      .route("/scheduler/start", post(start))
      .route("/scheduler/stop", post(stop))
      .layer(CorsLayer::permissive())
      .layer(TraceLayer::new_for_http())
      .with_state(state)
  }

  /// Bind the listener and serve in a background task.
  pub async fn start(&self) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&self.address).await?;
    info!("Scheduler HTTP Service listening at: {}", self.address);

    let router = self.router();
    Ok(tokio::spawn(async move {
      if let Err(e) = axum::serve(listener, router).await {
        error!("Scheduler HTTP Service Unavailable: {}", e);
      }
    }))
  }
}
