//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves routes by path: static bodies (optionally range-capable, slow, or
//! with `Content-Disposition`), redirects and bare status codes. Every request
//! is recorded so tests can assert on `Range` and custom headers. One request
//! per connection; responses carry `Connection: close`.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FileRoute {
    pub body: Arc<Vec<u8>>,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even if ranges work.
    pub advertise_ranges: bool,
    pub content_disposition: Option<String>,
    pub content_type: Option<String>,
    /// Wait this long before sending the response head.
    pub head_delay: Duration,
    /// Body is written in chunks of this size with `chunk_delay` between them.
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl FileRoute {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            support_ranges: true,
            advertise_ranges: true,
            content_disposition: None,
            content_type: Some("application/octet-stream".to_string()),
            head_delay: Duration::ZERO,
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn without_ranges(mut self) -> Self {
        self.support_ranges = false;
        self.advertise_ranges = false;
        self
    }

    pub fn disposition(mut self, value: &str) -> Self {
        self.content_disposition = Some(value.to_string());
        self
    }

    pub fn content_type(mut self, value: &str) -> Self {
        self.content_type = Some(value.to_string());
        self
    }

    pub fn head_delay(mut self, delay: Duration) -> Self {
        self.head_delay = delay;
        self
    }

    /// Trickle the body so a test can interrupt it mid-transfer.
    pub fn slow(mut self, chunk_size: usize, chunk_delay: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_delay = chunk_delay;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Route {
    File(FileRoute),
    /// 302 with this `Location` value (relative or absolute).
    Redirect(String),
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

pub struct TestServer {
    base: String,
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    /// Starts a server in a background thread. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (r, q) = (Arc::clone(&routes), Arc::clone(&requests));
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let (routes, requests) = (Arc::clone(&r), Arc::clone(&q));
                thread::spawn(move || handle(stream, &routes, &requests));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            routes,
            requests,
        }
    }

    /// Add or replace the route for `path` (must start with `/`).
    pub fn route(&self, path: &str, route: Route) -> &Self {
        self.routes.lock().unwrap().insert(path.to_string(), route);
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests received for `path`, in arrival order.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

fn handle(mut stream: TcpStream, routes: &Routes, requests: &Mutex<Vec<RecordedRequest>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    requests.lock().unwrap().push(request.clone());

    let route = routes.lock().unwrap().get(&request.path).cloned();
    match route {
        Some(Route::File(file)) => serve_file(&mut stream, &request, &file),
        Some(Route::Redirect(location)) => {
            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                location
            );
            let _ = stream.write_all(response.as_bytes());
        }
        Some(Route::Status(code)) => {
            let body = format!("status {}", code);
            let response = format!(
                "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                code,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
        None => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    }
}

fn serve_file(stream: &mut TcpStream, request: &RecordedRequest, file: &FileRoute) {
    thread::sleep(file.head_delay);
    let body = file.body.as_slice();
    let total = body.len() as u64;
    let range = request.header("range").and_then(parse_range);

    let (status, content_range, slice) = match range {
        Some(start) if file.support_ranges => {
            if start >= total {
                let response = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    total
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, total - 1, total)),
                &body[start as usize..],
            )
        }
        _ => ("200 OK", None, body),
    };

    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        slice.len()
    );
    if let Some(value) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", value));
    }
    if file.advertise_ranges && file.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(value) = &file.content_disposition {
        head.push_str(&format!("Content-Disposition: {}\r\n", value));
    }
    if let Some(value) = &file.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", value));
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    if request.method.eq_ignore_ascii_case("HEAD") {
        return;
    }
    for chunk in slice.chunks(file.chunk_size) {
        if stream.write_all(chunk).is_err() {
            // Client went away (pause/cancel).
            return;
        }
        if !file.chunk_delay.is_zero() {
            let _ = stream.flush();
            thread::sleep(file.chunk_delay);
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Some(RecordedRequest {
        method,
        path,
        headers,
    })
}

/// Start offset of `bytes=N-`.
fn parse_range(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}
