//! Plaintext listener behavior.

use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

mod common;
use common::{start_backend, start_proxy, test_config, Behavior};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn plaintext_get_is_permanently_redirected() {
    let ws = start_backend(Behavior::Respond("ws")).await;
    let spa = start_backend(Behavior::Respond("spa")).await;
    let proxy = start_proxy(test_config(ws.addr, spa.addr)).await;

    let res = client()
        .get(format!("http://{}/foo", proxy.http_addr))
        .header("host", "app.example.com")
        .send()
        .await
        .expect("redirector unreachable");

    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(res.headers()["location"], "https://app.example.com/foo");
    assert!(res.headers().get("strict-transport-security").is_none());
    assert!(res.bytes().await.unwrap().is_empty());

    assert_eq!(ws.accepts() + spa.accepts(), 0, "no backend contact");
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn query_and_method_do_not_matter() {
    let ws = start_backend(Behavior::Respond("ws")).await;
    let spa = start_backend(Behavior::Respond("spa")).await;
    let proxy = start_proxy(test_config(ws.addr, spa.addr)).await;
    let client = client();

    for method in [reqwest::Method::GET, reqwest::Method::POST, reqwest::Method::PUT] {
        let res = client
            .request(method.clone(), format!("http://{}/ws/chat?room=1&x=%20y", proxy.http_addr))
            .header("host", "app.example.com:80")
            .body("payload")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY, "{method}");
        assert_eq!(
            res.headers()["location"],
            "https://app.example.com/ws/chat?room=1&x=%20y"
        );
    }

    assert_eq!(ws.accepts() + spa.accepts(), 0);
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn non_default_https_port_is_kept() {
    let ws = start_backend(Behavior::Respond("ws")).await;
    let spa = start_backend(Behavior::Respond("spa")).await;
    let mut config = test_config(ws.addr, spa.addr);
    config.listener.public_https_port = 8443;
    let proxy = start_proxy(config).await;

    let res = client()
        .get(format!("http://{}/", proxy.http_addr))
        .header("host", "app.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["location"], "https://app.example.com:8443/");
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn silent_plaintext_connection_is_closed_when_idle() {
    let ws = start_backend(Behavior::Respond("ws")).await;
    let spa = start_backend(Behavior::Respond("spa")).await;
    let mut config = test_config(ws.addr, spa.addr);
    config.timeouts.redirect_idle_secs = 1;
    let proxy = start_proxy(config).await;

    let mut socket = TcpStream::connect(proxy.http_addr).await.unwrap();
    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut rest)).await;
    assert!(closed.is_ok(), "idle plaintext connection stayed open");

    assert_eq!(ws.accepts() + spa.accepts(), 0);
    proxy.stop().await.unwrap();
}
