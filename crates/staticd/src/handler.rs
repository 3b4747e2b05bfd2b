//! Per-connection request handler

use bytes::{Bytes, BytesMut};
use pagecache::FileCache;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::http::{self, Response, MAX_REQUEST_BYTES};
use crate::stats::Stats;

const READ_CHUNK: usize = 4096;

/// Answers one HTTP exchange per connection from a document root
pub struct RequestHandler {
    root: String,
    cache: Option<Arc<FileCache>>,
    stats: Option<Arc<Stats>>,
}

impl RequestHandler {
    /// Create a handler serving files below `root`
    ///
    /// `cache` and `stats` are optional; without a cache every request reads
    /// from disk.
    pub fn new(
        root: impl Into<String>,
        cache: Option<Arc<FileCache>>,
        stats: Option<Arc<Stats>>,
    ) -> Self {
        let mut root = root.into();
        if root.ends_with('/') {
            root.pop();
        }

        Self { root, cache, stats }
    }

    /// Document root with any trailing `/` removed
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Read one request, write one response, then drop the connection
    ///
    /// Transport failures abort silently and are not recorded in stats.
    pub fn handle<S: Read + Write>(&self, mut stream: S) {
        let start = Instant::now();

        let request = match read_request(&mut stream) {
            Ok(buf) => buf,
            Err(e) => {
                debug!("Read failed, dropping connection: {}", e);
                return;
            }
        };

        let (response, cache_hit) = self.respond(&request);
        trace!(status = response.status, cache_hit, "Responding");

        if let Err(e) = write_response(&mut stream, &response) {
            debug!("Write failed, dropping connection: {}", e);
            return;
        }

        if let Some(stats) = &self.stats {
            stats.record_request(start.elapsed(), cache_hit);
        }
    }

    /// Build the response for a raw request head
    ///
    /// Returns the response and whether the body came from the cache.
    pub fn respond(&self, request: &[u8]) -> (Response, bool) {
        let path = http::parse_request(request).and_then(|req| http::resolve_path(&req));

        match path {
            Ok(path) => self.serve(&path),
            Err(e) => {
                debug!("Bad request: {}", e);
                (Response::bad_request(e), false)
            }
        }
    }

    fn serve(&self, path: &str) -> (Response, bool) {
        let full_path = format!("{}{}", self.root, path);
        let content_type = http::content_type(&full_path);

        if let Some(body) = self.cache.as_ref().and_then(|cache| cache.get(&full_path)) {
            return (Response::ok(content_type, body), true);
        }

        match fs::read(&full_path) {
            Ok(contents) => {
                let body = Bytes::from(contents);
                if let Some(cache) = &self.cache {
                    cache.put(full_path.as_str(), body.clone());
                }
                (Response::ok(content_type, body), false)
            }
            Err(e) => {
                debug!("Cannot read {}: {}", full_path, e);
                (Response::not_found(), false)
            }
        }
    }
}

/// Read until the header terminator arrives, the peer closes, or the cap is
/// passed
fn read_request<S: Read>(stream: &mut S) -> io::Result<BytesMut> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if n == 0 {
            break;
        }

        buffer.extend_from_slice(&chunk[..n]);
        if http::header_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(buffer)
}

fn write_response<S: Write>(stream: &mut S, response: &Response) -> io::Result<()> {
    // write_all retries on Interrupted and loops over partial writes
    stream.write_all(&response.serialize())?;
    stream.flush()
}
