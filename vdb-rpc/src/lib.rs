//! The serving surface over the IPLD chain index: JSON-RPC (`eth`, `net`,
//! `debug`, plus the `vdb` alias namespace), GraphQL resolvers, the proxy
//! router for upstream fall-through, and the push subscription engine.
//!
//! Listener plumbing (HTTP/WS/IPC, CORS) is a collaborator's concern; this
//! crate exposes [`handlers::rpc_handler`] for bodies, [`graphql::build_schema`]
//! for the GraphQL executor, and [`subscription::SubscriptionService`] for
//! the payload stream.

pub mod config;
pub mod eth_json_types;
pub mod graphql;
pub mod handlers;
pub mod hex;
pub mod jsonrpc;
pub mod proxy;
pub mod resources;
pub mod rpc_types;
pub mod subscription;

pub use config::ServerConfig;
pub use handlers::{rpc_handler, rpc_select};
pub use proxy::ProxyClient;
pub use resources::RpcResources;
