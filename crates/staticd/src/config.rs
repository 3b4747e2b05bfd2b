//! Server configuration and command-line parsing

use clap::Parser;
use std::path::PathBuf;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default worker thread count
pub const DEFAULT_THREADS: usize = 8;

/// Default document root
pub const DEFAULT_ROOT: &str = "www";

/// Default cache capacity (5 MB)
pub const DEFAULT_CACHE_BYTES: usize = 5 * 1024 * 1024;

/// Flags that take a value
const VALUE_FLAGS: &[&str] = &["-p", "-t", "-r", "-c"];

/// Flags that stand alone
const SWITCH_FLAGS: &[&str] = &["--noLRU", "--no-cache", "-h", "--help", "-V", "--version"];

/// Everything needed to run the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub port: u16,
    /// Worker thread count
    pub threads: usize,
    /// Document root
    pub root: PathBuf,
    /// Cache capacity in bytes
    pub cache_bytes: usize,
    /// Whether the file cache is used at all
    pub use_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            threads: DEFAULT_THREADS,
            root: PathBuf::from(DEFAULT_ROOT),
            cache_bytes: DEFAULT_CACHE_BYTES,
            use_cache: true,
        }
    }
}

impl ServerConfig {
    /// Document root resolved against the current directory
    pub fn absolute_root(&self) -> PathBuf {
        if self.root.is_absolute() {
            return self.root.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&self.root),
            Err(_) => self.root.clone(),
        }
    }
}

/// Command-line flags
#[derive(Parser, Debug)]
#[command(name = "staticd", author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(short = 'p', value_name = "port", default_value_t = DEFAULT_PORT, allow_hyphen_values = true)]
    pub port: u16,

    /// Number of worker threads
    #[arg(short = 't', value_name = "threads", default_value_t = DEFAULT_THREADS, allow_hyphen_values = true)]
    pub threads: usize,

    /// Directory to serve files from
    #[arg(short = 'r', value_name = "root_dir", default_value = DEFAULT_ROOT, allow_hyphen_values = true)]
    pub root: PathBuf,

    /// Cache capacity in bytes
    #[arg(short = 'c', value_name = "cache_bytes", default_value_t = DEFAULT_CACHE_BYTES, allow_hyphen_values = true)]
    pub cache_bytes: usize,

    /// Disable the file cache
    #[arg(long = "no-cache", alias = "noLRU")]
    pub no_cache: bool,
}

impl Cli {
    /// Parse the given argv, silently dropping unrecognized flags
    pub fn parse_lenient<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::parse_from(filter_known_args(args))
    }

    /// Convert flags into a server configuration
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            threads: self.threads,
            root: self.root,
            cache_bytes: self.cache_bytes,
            use_cache: !self.no_cache,
        }
    }
}

/// Keep the program name and recognized flags, drop everything else
///
/// A value flag at the end of argv with no value is dropped as well.
pub fn filter_known_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut kept: Vec<String> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            if let Some(value) = args.next() {
                kept.push(arg);
                kept.push(value);
            }
        } else if SWITCH_FLAGS.contains(&arg.as_str()) {
            kept.push(arg);
        }
    }

    kept
}
