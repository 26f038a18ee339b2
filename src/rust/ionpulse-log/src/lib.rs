// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Logging macros of the pulser crates.
//!
//! Every record goes to the `log` facade under the `ionpulse.rust::<module>`
//! target, so one `RUST_LOG=ionpulse=debug` filter selects all of them. The
//! telemetry decoder and the record assembler report per-word events through
//! [`diagnostic!`]; those are dropped unless `ionpulse --diagnostics` (or
//! [`init_logging`]) switched them on.

use std::sync::{atomic::AtomicBool, atomic::Ordering};

#[doc(hidden)]
pub use log as _log;

/// State changes worth a line in a normal session: programs loaded, runs
/// started and stopped, bitfiles uploaded.
#[macro_export]
macro_rules! info {
    ($msg:literal, $($arg:tt)+) => {
        ionpulse_log::_log::info!(target: concat!("ionpulse.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        ionpulse_log::_log::info!(target: concat!("ionpulse.rust::", module_path!()), $msg);
    };
}

/// Input that is skipped rather than rejected, e.g. updates of unknown variables.
#[macro_export]
macro_rules! warn {
    ($msg:literal, $($arg:tt)+) => {
        ionpulse_log::_log::warn!(target: concat!("ionpulse.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        ionpulse_log::_log::warn!(target: concat!("ionpulse.rust::", module_path!()), $msg);
    };
}

/// Failures on the worker and dispatcher threads, which have no caller to
/// return an error to.
#[macro_export]
macro_rules! error {
    ($msg:literal, $($arg:tt)+) => {
        ionpulse_log::_log::error!(target: concat!("ionpulse.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        ionpulse_log::_log::error!(target: concat!("ionpulse.rust::", module_path!()), $msg);
    };
}

/// Decoder-level detail, logged at debug level only with diagnostics on.
///
/// The check comes first, so a disabled call does not format its arguments
/// on the per-word hot path.
#[macro_export]
macro_rules! diagnostic {
    ($msg:literal, $($arg:tt)+) => {
        if ionpulse_log::is_diagnostics_enabled() {
             ionpulse_log::_log::debug!(target: concat!("ionpulse.rust::", module_path!()), $msg, $($arg)+);
        }
    };
    ($msg:literal) => {
        if ionpulse_log::is_diagnostics_enabled() {
            ionpulse_log::_log::debug!(target: concat!("ionpulse.rust::", module_path!()), $msg);
        }
    };
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS_ENABLED.load(Ordering::Acquire)
}

/// Set the decoder diagnostics switch.
///
/// The logger itself belongs to the binary: `ionpulse` installs `env_logger`
/// and calls this with its `--diagnostics` flag.
pub fn init_logging(with_diagnostics: bool) {
    DIAGNOSTICS_ENABLED.store(with_diagnostics, Ordering::Release);
}
