//! Schedq server
//!
//! Transport services for the schedq scheduler: the JSON/HTTP surface,
//! the scheduler RPC surface (binary protobuf frames over WebSocket), and
//! the cluster RPC/HTTP services for node membership.
//!
//! The services are thin request-translation layers; all semantics live
//! in the [`schedq`] core crate.

pub mod cluster;
pub mod error;
pub mod http;
pub mod rpc;

pub use cluster::{ClusterHttpService, ClusterRpcService};
pub use http::SchedulerHttpService;
pub use rpc::SchedulerRpcService;
