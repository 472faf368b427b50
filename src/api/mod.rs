//! HTTP surface.
//!
//! A minimal HTTP/1.1 listener on a background thread serving three routes:
//!
//! - `GET /health` — liveness probe
//! - `POST /upload-video` — multipart upload, batch incident verdict
//! - `POST /stream-detect` — single frame (multipart or raw body), live verdict
//!
//! One request is handled at a time on the server thread; the detector
//! backend mutex serializes any future concurrent transport at the model
//! boundary. Uploaded video bytes are spooled to a temp file that is
//! deleted on every exit path.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::classes::{ClassNameTable, IncidentPolicy};
use crate::detect::SharedBackend;
use crate::frame::decode_image_bytes;
use crate::ingest::{FileConfig, FileSource};
use crate::pipeline::{analyze_video, AnalysisLimits};
use crate::verdict::classify_frame;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

const ERR_NO_VIDEO_FIELD: &str = "No video file provided under form field 'video'.";
const ERR_EMPTY_FILENAME: &str = "Empty filename.";
const ERR_VIDEO_OPEN: &str = "Could not open uploaded video.";
const ERR_NO_FRAME_DATA: &str = "No frame data provided.";
const ERR_FRAME_DECODE: &str = "Unable to decode frame image.";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Process-scoped request context: the shared detector plus the read-only
/// policy tables loaded at startup.
pub struct ServerContext {
    pub backend: SharedBackend,
    pub policy: IncidentPolicy,
    pub classes: ClassNameTable,
    pub limits: AnalysisLimits,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    ctx: ServerContext,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, ctx: ServerContext) -> Self {
        Self { cfg, ctx }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let ctx = self.ctx;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, ctx: ServerContext, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &ctx) {
                    log::warn!("detection api request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_error(&mut stream, 400, &format!("{}", err))?;
            return Ok(());
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("POST", "/upload-video") => handle_upload_video(&mut stream, &request, ctx),
        ("POST", "/stream-detect") => handle_stream_detect(&mut stream, &request, ctx),
        ("GET", _) | ("POST", _) => write_error(&mut stream, 404, "not found"),
        _ => write_error(&mut stream, 405, "method not allowed"),
    }
}

fn handle_upload_video(
    stream: &mut TcpStream,
    request: &HttpRequest,
    ctx: &ServerContext,
) -> Result<()> {
    let part = match multipart_field(request, "video") {
        Ok(part) => part,
        Err(err) => {
            log::warn!("upload rejected: {}", err);
            return write_error(stream, 400, &format!("{}", err));
        }
    };
    let Some(part) = part else {
        return write_error(stream, 400, ERR_NO_VIDEO_FIELD);
    };
    if part.filename.as_deref().unwrap_or("").is_empty() {
        return write_error(stream, 400, ERR_EMPTY_FILENAME);
    }

    // Spool to a temp file so the demuxer can seek; the file is removed on
    // drop regardless of which path exits this function.
    let mut spool = tempfile::NamedTempFile::new()?;
    spool.write_all(&part.data)?;
    spool.flush()?;

    let path = spool.path().to_string_lossy().to_string();
    let mut source = match FileSource::open(FileConfig { path }) {
        Ok(source) => source,
        Err(err) => {
            log::warn!("upload rejected: {}", err);
            return write_error(stream, 400, ERR_VIDEO_OPEN);
        }
    };

    let verdict = match analyze_video(
        &mut source,
        &ctx.backend,
        ctx.limits,
        &ctx.policy,
        &ctx.classes,
    ) {
        Ok(verdict) => verdict,
        Err(err) => {
            log::error!("video analysis failed: {}", err);
            return write_error(stream, 500, "video analysis failed");
        }
    };
    let payload = serde_json::to_vec(&verdict)?;
    write_response(stream, 200, "application/json", &payload)
}

fn handle_stream_detect(
    stream: &mut TcpStream,
    request: &HttpRequest,
    ctx: &ServerContext,
) -> Result<()> {
    // Either a multipart 'frame' field or the raw request body.
    let field = match multipart_field(request, "frame") {
        Ok(field) => field,
        Err(err) => {
            log::warn!("stream frame rejected: {}", err);
            return write_error(stream, 400, &format!("{}", err));
        }
    };
    let bytes = match field {
        Some(part) => part.data,
        None if !request.body.is_empty() && request.multipart_boundary().is_none() => {
            request.body.clone()
        }
        None => return write_error(stream, 400, ERR_NO_FRAME_DATA),
    };
    if bytes.is_empty() {
        return write_error(stream, 400, ERR_NO_FRAME_DATA);
    }

    let frame = match decode_image_bytes(&bytes) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("stream frame rejected: {}", err);
            return write_error(stream, 400, ERR_FRAME_DECODE);
        }
    };

    let result = {
        let mut backend = ctx
            .backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        backend.detect(&frame.data, frame.width, frame.height)
    };
    let detections = match result {
        Ok(detections) => detections,
        Err(err) => {
            log::error!("frame detection failed: {}", err);
            return write_error(stream, 500, "frame detection failed");
        }
    };

    let verdict = classify_frame(detections, &ctx.policy);
    let payload = serde_json::to_vec(&verdict)?;
    write_response(stream, 200, "application/json", &payload)
}

// ----------------------------------------------------------------------------
// Request parsing
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn multipart_boundary(&self) -> Option<String> {
        let content_type = self.header("content-type")?;
        parse_boundary(content_type)
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find_subsequence(&data, b"\r\n\r\n", 0) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers were complete"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let header_text = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before body was complete"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

// ----------------------------------------------------------------------------
// Multipart parsing
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct MultipartPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

/// Extract a named field from a multipart request body. `Ok(None)` when the
/// request is not multipart or carries no such field.
fn multipart_field(request: &HttpRequest, name: &str) -> Result<Option<MultipartPart>> {
    let Some(boundary) = request.multipart_boundary() else {
        return Ok(None);
    };
    let parts = parse_multipart(&request.body, &boundary)?;
    Ok(parts.into_iter().find(|part| part.name == name))
}

fn parse_boundary(content_type: &str) -> Option<String> {
    let mut segments = content_type.split(';');
    if !segments
        .next()?
        .trim()
        .eq_ignore_ascii_case("multipart/form-data")
    {
        return None;
    }
    for segment in segments {
        let (key, value) = segment.trim().split_once('=')?;
        if key.eq_ignore_ascii_case("boundary") {
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut cursor = find_subsequence(body, &delimiter, 0)
        .ok_or_else(|| anyhow!("multipart body missing opening boundary"))?
        + delimiter.len();

    loop {
        // After a delimiter comes either CRLF (another part) or "--" (end).
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart boundary line"));
        }
        cursor += 2;

        let headers_end = find_subsequence(body, b"\r\n\r\n", cursor)
            .ok_or_else(|| anyhow!("multipart part missing header terminator"))?;
        let header_text = String::from_utf8_lossy(&body[cursor..headers_end]);
        let (name, filename) = parse_part_disposition(&header_text)?;

        let data_start = headers_end + 4;
        let next_delimiter = find_subsequence(body, &delimiter, data_start)
            .ok_or_else(|| anyhow!("multipart part missing closing boundary"))?;
        // Part data ends with CRLF before the next delimiter.
        let data_end = next_delimiter.saturating_sub(2).max(data_start);

        parts.push(MultipartPart {
            name,
            filename,
            data: body[data_start..data_end].to_vec(),
        });
        cursor = next_delimiter + delimiter.len();
    }

    Ok(parts)
}

fn parse_part_disposition(header_text: &str) -> Result<(String, Option<String>)> {
    for line in header_text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("content-disposition") {
            continue;
        }
        let mut name = None;
        let mut filename = None;
        for segment in value.split(';') {
            let Some((attr, attr_value)) = segment.trim().split_once('=') else {
                continue;
            };
            let attr_value = attr_value.trim_matches('"').to_string();
            match attr.trim() {
                "name" => name = Some(attr_value),
                "filename" => filename = Some(attr_value),
                _ => {}
            }
        }
        let name = name.ok_or_else(|| anyhow!("multipart part missing field name"))?;
        return Ok((name, filename));
    }
    Err(anyhow!("multipart part missing content-disposition"))
}

fn find_subsequence(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

// ----------------------------------------------------------------------------
// Responses
// ----------------------------------------------------------------------------

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let body = serde_json::to_string(&serde_json::json!({ "error": message }))?;
    write_json_response(stream, status, &body)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
