//! Shared test setup: tracing to the console and to an NDJSON file.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ...
//! }
//! ```
//!
//! Environment:
//! - `RUST_LOG`: filter directives, e.g. `masstree_olc=debug`
//! - `MASSTREE_OLC_LOG_DIR`: log directory (default `logs/`)
//! - `MASSTREE_OLC_LOG_CONSOLE`: `0` disables console output
//!
//! The library only emits events when built with `--features tracing`.
//!
//! ```bash
//! RUST_LOG=masstree_olc=debug cargo test --features tracing --test stress_tests
//! jq 'select(.level == "DEBUG")' logs/masstree_olc.jsonl
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

#[derive(Debug, Clone)]
struct TracingConfig {
    log_dir: PathBuf,
    log_file: &'static str,
    console_enabled: bool,
    default_level: Level,
}

impl TracingConfig {
    fn from_env() -> Self {
        Self {
            log_dir: env::var("MASSTREE_OLC_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from),
            log_file: "masstree_olc.jsonl",
            console_enabled: !env::var("MASSTREE_OLC_LOG_CONSOLE").is_ok_and(|v| v == "0"),
            default_level: Level::WARN,
        }
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn setup_tracing() {
    let config = TracingConfig::from_env();

    // Console output still works when the log file cannot be created.
    let file_layer = std::fs::create_dir_all(&config.log_dir)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(config.log_dir.join(config.log_file))
        })
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_thread_ids(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .json()
                .with_filter(make_filter(config.default_level))
        });

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_target(true)
            .with_test_writer()
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let _ = Registry::default().with(console_layer).with(file_layer).try_init();
}

/// Deterministic xorshift64* stream for workload generation.
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    /// Seeded stream; a zero seed is replaced.
    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    /// Next value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Value in `0..bound`.
    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

/// Keys that share long prefixes, so workloads exercise several layers.
pub fn layered_key(i: u64) -> Vec<u8> {
    format!("tenant-{:02}/user-{:04}/k{i}", i % 3, i % 97).into_bytes()
}
