//! Cluster services
//!
//! The cluster RPC service exposes exactly `Register` and `Ping`, both
//! funneling through the node's directory upsert; the cluster HTTP
//! service serves a read-only directory snapshot.

use crate::error::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use prost::Message as ProstMessage;
use schedq::cluster::ClusterNode;
use schedq::proto::{Node, RpcRequest, RpcResponse};
use schedq::rpc::RPC_PATH;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
  cluster_node: Arc<ClusterNode>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
  ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
  while let Some(Ok(frame)) = socket.recv().await {
    match frame {
      Message::Binary(data) => {
        let response = dispatch(&state.cluster_node, &data);
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

fn dispatch(cluster_node: &Arc<ClusterNode>, data: &[u8]) -> RpcResponse {
  let request = match RpcRequest::decode(data) {
    Ok(request) => request,
    Err(e) => {
      return RpcResponse {
        payload: Vec::new(),
        error: e.to_string(),
      }
    }
  };

  let node = match Node::decode(request.payload.as_slice()) {
    Ok(node) => node,
    Err(e) => {
      return RpcResponse {
        payload: Vec::new(),
        error: e.to_string(),
      }
    }
  };

  match request.method.as_str() {
    "Register" => {
      info!(
        "Registration from the cluster node `{}:{}`:",
        node.id, node.endpoint
      );
      info!(
        "Cluster Node Scheduler RPC Service listening at: {}",
        node.scheduler_endpoint
      );
      info!("Cluster Node Scheduler RPC Service queue: `{}`", node.queue);

      cluster_node.register_node(&node);
      RpcResponse {
        payload: cluster_node.to_node().encode_to_vec(),
        error: String::new(),
      }
    }
    "Ping" => {
      cluster_node.register_node(&node);
      RpcResponse {
        payload: cluster_node.to_node().encode_to_vec(),
        error: String::new(),
      }
    }
    method => RpcResponse {
      payload: Vec::new(),
      error: format!("unknown method `{}`", method),
    },
  }
}

/// Cluster RPC service, normally run by every node at its cluster
/// endpoint; only the main node's directory is authoritative.
pub struct ClusterRpcService {
  cluster_node: Arc<ClusterNode>,
}

impl ClusterRpcService {
  /// Create the service; it binds at the node's own cluster endpoint.
  pub fn new(cluster_node: Arc<ClusterNode>) -> Self {
    Self { cluster_node }
  }

  fn router(&self) -> Router {
    let state = AppState {
      cluster_node: Arc::clone(&self.cluster_node),
    };
    Router::new().route(RPC_PATH, get(ws_handler)).with_state(state)
  }

  /// Bind the listener and serve in a background task.
  pub async fn start(&self) -> Result<JoinHandle<()>> {
    let address = self.cluster_node.endpoint.clone();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Cluster RPC Service listening at: {}", address);

    let router = self.router();
    Ok(tokio::spawn(async move {
      if let Err(e) = axum::serve(listener, router).await {
        error!("Cluster RPC Service Unavailable: {}", e);
      }
    }))
  }
}

async fn nodes(State(state): State<AppState>) -> Json<Value> {
  Json(json!({ "data": state.cluster_node.node_map(), "error": "" }))
}

/// Cluster HTTP service, a read-only view of the node directory.
pub struct ClusterHttpService {
  cluster_node: Arc<ClusterNode>,
}

impl ClusterHttpService {
  /// Create the service; it binds at the node's cluster HTTP endpoint.
  pub fn new(cluster_node: Arc<ClusterNode>) -> Self {
    Self { cluster_node }
  }

  /// Build the router; exposed for in-process testing.
  pub fn router(&self) -> Router {
    let state = AppState {
      cluster_node: Arc::clone(&self.cluster_node),
    };
    Router::new()
      .route("/cluster/nodes", get(nodes))
      .layer(CorsLayer::permissive())
      .with_state(state)
  }

  /// Bind the listener and serve in a background task.
  pub async fn start(&self) -> Result<JoinHandle<()>> {
    let address = self.cluster_node.endpoint_http.clone();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Cluster HTTP Service listening at: {}", address);

    let router = self.router();
    Ok(tokio::spawn(async move {
      if let Err(e) = axum::serve(listener, router).await {
        error!("Cluster HTTP Service Unavailable: {}", e);
      }
    }))
  }
}
