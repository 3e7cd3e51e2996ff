//! RPC 客户端模块
//! RPC client module
//!
//! 通过 WebSocket 承载二进制 protobuf 帧的请求响应式调用；
//! 每次调用建立一条短连接，由调用方给定超时。
//! Request-response calls over WebSocket carrying binary protobuf frames;
//! each call opens a short-lived connection with a caller-supplied timeout.

use crate::error::{Error, Result};
use crate::proto::{RpcRequest, RpcResponse};
use futures_util::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// RPC 端点的 WebSocket 路径
/// WebSocket path of an RPC endpoint
pub const RPC_PATH: &str = "/rpc";

/// 对远端端点发起一次 RPC 调用
/// Issue a single RPC call against a remote endpoint
///
/// 超时返回 `RpcTimeout`，连接和协议错误返回 `RpcTransport`，
/// 远端信封中的错误文本原样转为 `RpcTransport`。
/// A deadline miss yields `RpcTimeout`; connection and protocol failures
/// yield `RpcTransport`; an error text in the remote envelope is surfaced
/// as `RpcTransport` verbatim.
pub async fn call<Req, Resp>(
  endpoint: &str,
  method: &str,
  request: &Req,
  timeout: Duration,
) -> Result<Resp>
where
  Req: ProstMessage,
  Resp: ProstMessage + Default,
{
  tokio::time::timeout(timeout, call_inner(endpoint, method, request))
    .await
    .map_err(|_| Error::RpcTimeout)?
}

async fn call_inner<Req, Resp>(endpoint: &str, method: &str, request: &Req) -> Result<Resp>
where
  Req: ProstMessage,
  Resp: ProstMessage + Default,
{
  let url = format!("ws://{}{}", endpoint, RPC_PATH);
  let (mut stream, _) = connect_async(url.as_str())
    .await
    .map_err(|e| Error::rpc_transport(format!("failed to connect to `{}`: {}", endpoint, e)))?;

  let envelope = RpcRequest {
    method: method.to_string(),
    payload: request.encode_to_vec(),
  };
  stream
    .send(Message::Binary(envelope.encode_to_vec()))
    .await
    .map_err(|e| Error::rpc_transport(format!("failed to send request: {}", e)))?;

  while let Some(frame) = stream.next().await {
    let frame = frame.map_err(|e| Error::rpc_transport(format!("failed to receive response: {}", e)))?;
    match frame {
      Message::Binary(data) => {
        let response = RpcResponse::decode(data.as_slice())?;
        let _ = stream.close(None).await;
        if !response.error.is_empty() {
          return Err(Error::rpc_transport(response.error));
        }
        return Ok(Resp::decode(response.payload.as_slice())?);
      }
      // 忽略控制帧
      // Ignore control frames
      Message::Ping(_) | Message::Pong(_) => continue,
      Message::Close(_) => break,
      _ => continue,
    }
  }

  Err(Error::rpc_transport("connection closed before response"))
}
