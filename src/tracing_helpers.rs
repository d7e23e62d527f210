//! Filepath: src/tracing_helpers.rs
//!
//! Logging macros that cost nothing unless the `tracing` feature is on.
//!
//! ```bash
//! # No logging code compiled in
//! cargo build --release
//!
//! # Structural events (splits, new roots, layer collapse) at debug level
//! RUST_LOG=masstree_olc=debug cargo test --features tracing
//!
//! # One module only
//! RUST_LOG=masstree_olc::tree::remove=trace cargo test --features tracing remove
//! ```
//!
//! Function spans use
//! `#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]`
//! so the attribute vanishes together with the dependency.

#![allow(unused_macros, unused_imports)]

/// Trace-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Error-level event. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! error_log {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! error_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use error_log;
pub(crate) use trace_log;

#[cfg(test)]
mod tests {
    use super::{debug_log, error_log, trace_log};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Done,
        Retry,
    }

    fn classify(step: Step) -> usize {
        match step {
            Step::Done => 0,
            Step::Retry => {
                trace_log!("retry");
                1
            }
        }
    }

    #[test]
    fn test_macros_expand_in_statement_and_arm_position() {
        let mut retries: usize = 0;
        for step in [Step::Retry, Step::Done, Step::Retry] {
            match step {
                Step::Retry => {
                    trace_log!(?step, "arm");
                }
                Step::Done => {
                    debug_log!("done");
                }
            }
            retries += classify(step);
        }

        if retries == 0 {
            error_log!(retries, "unreachable");
        }
        assert_eq!(retries, 2);
    }
}
