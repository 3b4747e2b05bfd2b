//! Acceptor: owns the listening socket and feeds the worker pool

use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::pool::WorkerPool;

/// Lifecycle of a [`Server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet listening
    Idle,
    /// Accept loop running
    Listening,
    /// `stop()` has been called
    Stopped,
}

struct Lifecycle {
    state: ServerState,
    listener: Option<Arc<TcpListener>>,
    local_addr: Option<SocketAddr>,
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    running: AtomicBool,
    pool: Arc<WorkerPool<TcpStream>>,
}

impl Shared {
    fn stop(&self) {
        let listener = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == ServerState::Stopped {
                return;
            }
            lifecycle.state = ServerState::Stopped;
            self.running.store(false, Ordering::SeqCst);
            lifecycle.listener.take()
        };

        if let Some(listener) = listener {
            wake_acceptor(&listener);
        }

        self.pool.shutdown();
        info!("Server stopped");
    }
}

/// Cloneable handle that stops a [`Server`] from any thread
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Same as [`Server::stop`]
    pub fn stop(&self) {
        self.shared.stop();
    }
}

/// TCP acceptor handing every connection to a worker pool
pub struct Server {
    port: u16,
    shared: Arc<Shared>,
}

impl Server {
    /// Create an idle server for `port` on all interfaces
    pub fn new(port: u16, pool: Arc<WorkerPool<TcpStream>>) -> Self {
        Self {
            port,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    state: ServerState::Idle,
                    listener: None,
                    local_addr: None,
                }),
                running: AtomicBool::new(false),
                pool,
            }),
        }
    }

    /// Handle for stopping the server from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.shared.lifecycle.lock().state
    }

    /// Bound address while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.lifecycle.lock().local_addr
    }

    /// Bind, listen, and run the accept loop until [`stop`](Self::stop)
    ///
    /// Returns once the loop has exited and the worker pool has drained.
    /// Socket setup failures return [`Error::Listen`] without entering the
    /// loop.
    pub fn start(&self) -> Result<()> {
        let listener = {
            let mut lifecycle = self.shared.lifecycle.lock();
            match lifecycle.state {
                ServerState::Listening => return Err(Error::AlreadyRunning),
                ServerState::Stopped => return Err(Error::AlreadyStopped),
                ServerState::Idle => {}
            }

            let listener = bind(self.port).map_err(|source| Error::Listen {
                port: self.port,
                source,
            })?;
            let listener = Arc::new(listener);

            lifecycle.state = ServerState::Listening;
            lifecycle.local_addr = listener.local_addr().ok();
            lifecycle.listener = Some(Arc::clone(&listener));
            self.shared.running.store(true, Ordering::SeqCst);
            listener
        };

        info!(
            "Server listening on port {} with {} workers",
            self.port,
            self.shared.pool.thread_count()
        );

        self.accept_loop(&listener);

        // The listening socket closes when the last handle drops here
        drop(listener);
        self.shared.pool.shutdown();
        Ok(())
    }

    /// Stop accepting, close the listener, and drain the worker pool
    ///
    /// Idempotent; later calls return immediately.
    pub fn stop(&self) {
        self.shared.stop();
    }

    fn accept_loop(&self, listener: &TcpListener) {
        while self.shared.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if !self.shared.running.load(Ordering::SeqCst) {
                        drop(stream);
                        break;
                    }
                    trace!("Accepted connection from {}", peer);
                    if self.shared.pool.enqueue(stream).is_err() {
                        debug!("Connection from {} closed during shutdown", peer);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if !self.shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind on all interfaces. std enables SO_REUSEADDR on Unix.
fn bind(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
    raise_backlog(&listener)?;
    Ok(listener)
}

/// Re-issue listen() with the platform maximum backlog
#[cfg(unix)]
fn raise_backlog(listener: &TcpListener) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `listener`, which outlives the call
    let rc = unsafe { libc::listen(listener.as_raw_fd(), libc::SOMAXCONN) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn raise_backlog(_listener: &TcpListener) -> io::Result<()> {
    Ok(())
}

/// Unblock a thread parked in accept()
fn wake_acceptor(listener: &TcpListener) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `listener`, which outlives the call
        let rc = unsafe { libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR) };
        if rc != 0 {
            debug!(
                "shutdown() on listener failed: {}",
                io::Error::last_os_error()
            );
        }
    }

    // Platforms where shutdown() does not interrupt accept() need a
    // connection to observe the cleared running flag
    if let Ok(addr) = listener.local_addr() {
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
        let _ = TcpStream::connect_timeout(&target, Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RequestHandler;
    use crate::stats::Stats;
    use pagecache::FileCache;
    use std::fs;
    use std::io::{Read, Write};
    use std::thread::{self, JoinHandle};
    use std::time::Instant;
    use tempfile::TempDir;

    struct Running {
        server: Arc<Server>,
        thread: JoinHandle<Result<()>>,
        addr: SocketAddr,
    }

    fn docroot() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"<h1>home</h1>").unwrap();
        fs::write(dir.path().join("big.js"), vec![b'x'; 64 * 1024]).unwrap();
        dir
    }

    fn pool_for(
        dir: &TempDir,
        cache: Option<Arc<FileCache>>,
        stats: Option<Arc<Stats>>,
        threads: usize,
    ) -> Arc<WorkerPool<TcpStream>> {
        let handler = Arc::new(RequestHandler::new(
            dir.path().to_string_lossy().into_owned(),
            cache,
            stats,
        ));
        Arc::new(WorkerPool::new(threads, move |stream: TcpStream| {
            handler.handle(stream)
        }))
    }

    fn launch(pool: Arc<WorkerPool<TcpStream>>) -> Running {
        let server = Arc::new(Server::new(0, pool));
        let thread = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.start())
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        let addr = loop {
            if let Some(addr) = server.local_addr() {
                break SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
            }
            assert!(Instant::now() < deadline, "server did not start");
            thread::sleep(Duration::from_millis(5));
        };

        Running {
            server,
            thread,
            addr,
        }
    }

    fn fetch(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        response
    }

    fn body(response: &[u8]) -> &[u8] {
        let pos = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap();
        &response[pos + 4..]
    }

    #[test]
    fn test_serves_over_tcp() {
        let dir = docroot();
        let stats = Arc::new(Stats::new());
        let running = launch(pool_for(&dir, None, Some(Arc::clone(&stats)), 2));

        assert_eq!(running.server.state(), ServerState::Listening);
        let response = fetch(running.addr, b"GET / HTTP/1.1\r\n\r\n");
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert_eq!(body(&response), b"<h1>home</h1>");

        running.server.stop();
        running.thread.join().unwrap().unwrap();

        assert_eq!(running.server.state(), ServerState::Stopped);
        assert_eq!(stats.total_requests(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = docroot();
        let running = launch(pool_for(&dir, None, None, 1));
        let handle = running.server.stop_handle();

        handle.stop();
        handle.stop();
        running.server.stop();

        running.thread.join().unwrap().unwrap();
        assert_eq!(running.server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_start_after_stop_refused() {
        let dir = docroot();
        let server = Server::new(0, pool_for(&dir, None, None, 1));

        server.stop();

        assert!(matches!(server.start(), Err(Error::AlreadyStopped)));
        assert_eq!(server.local_addr(), None);
    }

    #[test]
    fn test_listen_failure_reported() {
        let blocker = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = blocker.local_addr().unwrap().port();
        let dir = docroot();
        let server = Server::new(port, pool_for(&dir, None, None, 1));

        match server.start() {
            Err(Error::Listen { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected listen failure, got {:?}", other),
        }
        assert_eq!(server.state(), ServerState::Idle);
    }

    #[test]
    fn test_concurrent_identical_misses() {
        let dir = docroot();
        let cache = Arc::new(FileCache::new(1024 * 1024));
        let running = launch(pool_for(&dir, Some(Arc::clone(&cache)), None, 8));
        let expected = fs::read(dir.path().join("big.js")).unwrap();

        let clients: Vec<_> = (0..16)
            .map(|_| {
                let addr = running.addr;
                thread::spawn(move || fetch(addr, b"GET /big.js HTTP/1.1\r\n\r\n"))
            })
            .collect();

        for client in clients {
            let response = client.join().unwrap();
            assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
            assert_eq!(body(&response), &expected[..]);
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), expected.len());

        running.server.stop();
        running.thread.join().unwrap().unwrap();
    }

    #[test]
    fn test_queued_connections_answered_on_stop() {
        let dir = docroot();
        let stats = Arc::new(Stats::new());
        let running = launch(pool_for(&dir, None, Some(Arc::clone(&stats)), 1));

        // Several requests queue behind the single worker before stop()
        let clients: Vec<_> = (0..4)
            .map(|_| {
                let mut stream = TcpStream::connect(running.addr).unwrap();
                stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
                stream
            })
            .collect();

        let deadline = Instant::now() + Duration::from_secs(5);
        while stats.total_requests() + (running.server.shared.pool.queued() as u64) < 4 {
            assert!(Instant::now() < deadline, "connections never reached the pool");
            thread::sleep(Duration::from_millis(5));
        }

        running.server.stop();
        running.thread.join().unwrap().unwrap();

        for mut stream in clients {
            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        }
        assert_eq!(stats.total_requests(), 4);
    }

    #[test]
    fn test_enqueue_after_stop_closes_without_bytes() {
        let dir = docroot();
        let stats = Arc::new(Stats::new());
        let pool = pool_for(&dir, None, Some(Arc::clone(&stats)), 2);
        let server = Server::new(0, Arc::clone(&pool));

        server.stop();

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let (accepted, _) = listener.accept().unwrap();

        assert!(pool.enqueue(accepted).is_err());

        let mut response = Vec::new();
        let _ = client.read_to_end(&mut response);
        assert!(response.is_empty());
        assert_eq!(stats.total_requests(), 0);
    }
}
