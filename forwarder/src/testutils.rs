use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct Received {
    pub headers: HeaderMap,
    pub body: Value,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Clone)]
struct Responder {
    status: StatusCode,
    body: &'static str,
    received: Arc<Mutex<Vec<Received>>>,
}

/// Local webhook that records every POST to `/webhook` and answers with a
/// fixed status and JSON body. GETs to `/` are answered with the same status.
pub struct Webhook {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Webhook {
    pub fn url(&self) -> String {
        format!("http://{}/webhook", self.addr)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub async fn received(&self) -> Vec<Received> {
        self.received.lock().await.clone()
    }
}

async fn capture(
    State(responder): State<Responder>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
    responder
        .received
        .lock()
        .await
        .push(Received { headers, body });
    (
        responder.status,
        [(header::CONTENT_TYPE, "application/json")],
        responder.body,
    )
}

async fn ping(State(responder): State<Responder>) -> StatusCode {
    responder.status
}

pub async fn spawn_webhook(status: u16, body: &'static str) -> Webhook {
    let received = Arc::new(Mutex::new(Vec::new()));
    let responder = Responder {
        status: StatusCode::from_u16(status).expect("valid status code"),
        body,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/webhook", post(capture))
        .route("/", get(ping))
        .with_state(responder);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Webhook { addr, received }
}

/// Accepts connections and never answers.
pub async fn spawn_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    listener.local_addr().unwrap()
}

/// A listener whose accept queue is full, so new SYNs are dropped and
/// connection attempts hang until the client gives up.
pub struct Unresponsive {
    pub addr: SocketAddr,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

pub async fn spawn_unresponsive() -> Unresponsive {
    let socket = TcpSocket::new_v4().expect("Failed to create socket");
    socket
        .bind("127.0.0.1:0".parse().unwrap())
        .expect("Failed to bind to address");
    let listener = socket.listen(1).expect("Failed to listen");
    let addr = listener.local_addr().unwrap();

    // Never accept; connect until an attempt stalls.
    let mut queued = Vec::new();
    for _ in 0..64 {
        match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => queued.push(stream),
            Ok(Err(e)) => panic!("unexpected connect error: {e}"),
            Err(_) => {
                return Unresponsive {
                    addr,
                    _listener: listener,
                    _queued: queued,
                };
            }
        }
    }
    panic!("accept queue never filled up");
}
