//! 错误处理模块
//! Error handling module
//!
//! 定义了 Schedq 库中使用的各种错误类型
//! Defines various error types used in the Schedq library

use thiserror::Error;

/// Schedq 库的结果类型
/// Result type for the Schedq library
pub type Result<T> = std::result::Result<T, Error>;

/// Schedq 错误类型
/// Schedq error type
#[derive(Error, Debug)]
pub enum Error {
  /// 任务未找到错误
  /// Job not found error
  #[error("Job `{id}` not found")]
  JobNotFound { id: String },

  /// 任务函数未注册错误
  /// Job function unregistered error
  #[error("Func `{func_name}` unregistered")]
  FuncUnregistered { func_name: String },

  /// 任务字段校验错误
  /// Job shape validation error
  #[error("Job `{full_name}` {field} `{value}` error: {detail}")]
  InvalidJob {
    full_name: String,
    field: String,
    value: String,
    detail: String,
  },

  /// 存储后端错误
  /// Storage backend error
  #[error("Store error: {0}")]
  Store(String),

  /// 集群中没有可用节点
  /// No cluster node available
  #[error("Cluster node with queue `{queues:?}` does not exist")]
  ClusterNodeUnavailable { queues: Vec<String> },

  /// RPC 调用超时
  /// RPC call timeout
  #[error("RPC timeout")]
  RpcTimeout,

  /// RPC 传输错误
  /// RPC transport error
  #[error("RPC transport error: {0}")]
  RpcTransport(String),

  /// Redis 错误
  /// Redis error
  #[error("Redis error: {0}")]
  Redis(#[from] redis::RedisError),

  /// 序列化错误
  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Protocol Buffer 解码错误
  /// Protocol buffer decoding error
  #[error("Protocol buffer decoding error: {0}")]
  ProtoDecode(#[from] prost::DecodeError),

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },
}

impl Error {
  /// 创建任务未找到错误
  /// Create a job not found error
  pub fn job_not_found<S: Into<String>>(id: S) -> Self {
    Self::JobNotFound { id: id.into() }
  }

  /// 创建函数未注册错误
  /// Create a func unregistered error
  pub fn func_unregistered<S: Into<String>>(func_name: S) -> Self {
    Self::FuncUnregistered {
      func_name: func_name.into(),
    }
  }

  /// 创建任务字段校验错误
  /// Create a job shape validation error
  pub fn invalid_job(
    full_name: impl Into<String>,
    field: impl Into<String>,
    value: impl Into<String>,
    detail: impl Into<String>,
  ) -> Self {
    Self::InvalidJob {
      full_name: full_name.into(),
      field: field.into(),
      value: value.into(),
      detail: detail.into(),
    }
  }

  /// 创建存储后端错误
  /// Create a storage backend error
  pub fn store<S: Into<String>>(message: S) -> Self {
    Self::Store(message.into())
  }

  /// 创建 RPC 传输错误
  /// Create an RPC transport error
  pub fn rpc_transport<S: Into<String>>(message: S) -> Self {
    Self::RpcTransport(message.into())
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_creation() {
    let err = Error::job_not_found("0123456789abcdef");
    assert!(matches!(err, Error::JobNotFound { .. }));
    assert!(err.to_string().contains("0123456789abcdef"));

    let err = Error::func_unregistered("");
    assert!(matches!(err, Error::FuncUnregistered { .. }));

    let err = Error::invalid_job("Job:1", "Timeout", "errorTimeout", "bad duration");
    assert!(err.to_string().contains("Timeout `errorTimeout` error"));

    let err = Error::config("store is not set");
    assert!(matches!(err, Error::Config { .. }));
  }

  #[test]
  fn test_rpc_timeout_has_no_inner_cause() {
    assert_eq!(Error::RpcTimeout.to_string(), "RPC timeout");
  }
}
