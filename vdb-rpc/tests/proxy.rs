//! Proxy router behavior, end to end through dispatch: forced forwarding,
//! fall-through on local failure, and the distinct unavailable kind. The
//! upstream is a canned single-response HTTP listener; the database pool
//! points at a dead address so every local evaluation fails.

use std::time::Duration;

use diesel::r2d2::{ConnectionManager, Pool};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use vdb_evm::{Backend, EvmConfig};
use vdb_index::IndexStore;
use vdb_rpc::{rpc_select, ProxyClient, RpcResources, ServerConfig};
use vdb_state::GroupCacheConfig;

/// A one-shot JSON-RPC upstream: answers every POST with the given result.
async fn spawn_upstream(result: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let Ok(n) = socket.read(&mut chunk).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(header_end) = find_header_end(&buf) {
                        let body_len = content_length(&buf[..header_end]).unwrap_or(0);
                        if buf.len() >= header_end + body_len {
                            break;
                        }
                    }
                }
                let body =
                    format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{result}"}}"#);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|at| at + 4)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())?
    })
}

/// A backend whose every query fails fast: nothing listens at the pool's
/// address and the checkout timeout is short.
fn dead_backend() -> Backend {
    let manager =
        ConnectionManager::<diesel::PgConnection>::new("postgres://nobody@127.0.0.1:1/void");
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_millis(100))
        .build_unchecked(manager);
    Backend::new(
        IndexStore::new(pool),
        EvmConfig::default(),
        &GroupCacheConfig::default(),
    )
}

fn call_params() -> Value {
    json!([
        { "to": "0xdac17f958d2ee523a2206206994597c13d831ec7", "data": "0x18160ddd" },
        "latest"
    ])
}

#[tokio::test]
async fn forced_forwarding_returns_upstream_result() {
    let url = spawn_upstream("0xdeadbeef").await;
    let proxy = ProxyClient::new(url, Duration::from_secs(2)).unwrap();
    let config = ServerConfig {
        forward_eth_calls: true,
        ..Default::default()
    };
    let resources = RpcResources::new(dead_backend(), Some(proxy), config);

    let result = rpc_select(&resources, "eth_call", call_params()).await.unwrap();
    assert_eq!(result, Value::String("0xdeadbeef".to_string()));
}

#[tokio::test]
async fn proxy_on_error_falls_through_when_local_fails() {
    let url = spawn_upstream("0xfa11bac0").await;
    let proxy = ProxyClient::new(url, Duration::from_secs(2)).unwrap();
    let config = ServerConfig {
        proxy_on_error: true,
        ..Default::default()
    };
    let resources = RpcResources::new(dead_backend(), Some(proxy), config);

    // the database is unreachable, so the local path errors and the call is
    // transparently retried upstream
    let result = rpc_select(&resources, "eth_call", call_params()).await.unwrap();
    assert_eq!(result, Value::String("0xfa11bac0".to_string()));

    let storage = rpc_select(
        &resources,
        "eth_getStorageAt",
        json!([
            "0xdac17f958d2ee523a2206206994597c13d831ec7",
            "0x2",
            "latest"
        ]),
    )
    .await
    .unwrap();
    assert_eq!(storage, Value::String("0xfa11bac0".to_string()));
}

#[tokio::test]
async fn local_only_surfaces_the_local_error() {
    let config = ServerConfig::default();
    let resources = RpcResources::new(dead_backend(), None, config);

    let err = rpc_select(&resources, "eth_call", call_params())
        .await
        .unwrap_err();
    assert_eq!(err.code, -32603);
}

#[tokio::test]
async fn unreachable_upstream_is_a_distinct_error() {
    // nothing listens here
    let proxy = ProxyClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
    let config = ServerConfig {
        forward_eth_calls: true,
        ..Default::default()
    };
    let resources = RpcResources::new(dead_backend(), Some(proxy), config);

    let err = rpc_select(&resources, "eth_call", call_params())
        .await
        .unwrap_err();
    assert_eq!(err.code, -32010);
}

#[tokio::test]
async fn vdb_namespace_aliases_eth() {
    let url = spawn_upstream("0xa11a5").await;
    let proxy = ProxyClient::new(url, Duration::from_secs(2)).unwrap();
    let config = ServerConfig {
        forward_eth_calls: true,
        ..Default::default()
    };
    let resources = RpcResources::new(dead_backend(), Some(proxy), config);

    let result = rpc_select(&resources, "vdb_call", call_params()).await.unwrap();
    assert_eq!(result, Value::String("0xa11a5".to_string()));
}
