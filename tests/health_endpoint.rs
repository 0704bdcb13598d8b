use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use warden::config::Settings;
use warden::linkfilter::LinkFilter;
use warden::{health, AppContext};

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut buf = String::new();
    stream.read_to_string(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn health_and_status_respond() {
    let app = AppContext::new_testing(Settings::defaults("test"), LinkFilter::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, health::router(app)).await;
    });

    let resp = get(addr, "/health").await;
    assert!(resp.starts_with("HTTP/1.1 200"));
    assert!(resp.ends_with("ok"));

    let resp = get(addr, "/status").await;
    assert!(resp.starts_with("HTTP/1.1 200"));
    assert!(resp.contains(r#""name":"Warden""#));
    assert!(resp.contains(r#""guilds_tracked":0"#));
}
