//! Scripted HTTP/1.1 server for connection-level scenarios that a regular
//! mock server cannot produce: hanging up mid-request, closing idle
//! connections, never answering.

#![allow(dead_code)]

use deta_client::{ServiceConfig, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// What the server does with one request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Write this raw response
    Respond(String),
    /// Close the connection without answering
    HangUp,
    /// Never answer
    Stall,
}

/// Behavior of one accepted connection.
#[derive(Clone, Debug)]
pub struct ConnectionScript {
    pub replies: Vec<Reply>,
    /// Keep the connection open after the last reply instead of closing it
    pub hold_open: bool,
}

impl ConnectionScript {
    pub fn replies(replies: Vec<Reply>) -> Self {
        ConnectionScript {
            replies,
            hold_open: true,
        }
    }

    pub fn then_close(mut self) -> Self {
        self.hold_open = false;
        self
    }
}

pub struct ScriptedServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    /// Serves one script per accepted connection, in order. Connections
    /// beyond the scripts are closed immediately.
    pub async fn start(scripts: Vec<ConnectionScript>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let accepted = Arc::clone(&accepted);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let mut scripts = scripts.into_iter();
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let Some(script) = scripts.next() else {
                        drop(stream);
                        continue;
                    };
                    tokio::spawn(serve_connection(stream, script, Arc::clone(&requests)));
                }
            })
        };

        ScriptedServer {
            addr,
            accepted,
            requests,
            task,
        }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Raw request heads received so far, lowercased
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    pub fn config(&self, keep_alive: bool) -> ServiceConfig {
        ServiceConfig::new("key_abc", "proj", "items", self.host())
            .with_transport(Transport::Plain)
            .with_keep_alive(keep_alive)
            .with_managed_runtime(false)
            .with_timeout_seconds(5)
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    script: ConnectionScript,
    requests: Arc<Mutex<Vec<String>>>,
) {
    for reply in script.replies {
        let Some(request) = read_request(&mut stream).await else {
            return;
        };
        requests.lock().await.push(request);

        match reply {
            Reply::Respond(response) => {
                if stream.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
            Reply::HangUp => return,
            Reply::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
        }
    }

    if script.hold_open {
        let mut buf = [0u8; 1024];
        while let Ok(n) = stream.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    }
}

/// Reads one request head plus its `content-length` body.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&data) {
            break pos;
        }
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() < head_end + 4 + content_length {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }

    Some(String::from_utf8_lossy(&data).to_lowercase())
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Builds a raw HTTP/1.1 response with a `content-length` body.
pub fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    )
}

pub fn json_response(body: &str) -> Reply {
    Reply::Respond(http_response("200 OK", "application/json", body))
}
