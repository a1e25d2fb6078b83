/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */
///
/// Structured, span-based logging init built on `tracing`/`tracing-subscriber`. Every component
/// in the gateway logs through `tracing`'s macros directly (`tracing::info!`, `tracing::error!`,
/// ...); this module only owns process-wide subscriber setup, so it is intentionally thin.
///
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local/interactive runs.
    Pretty,
    /// One JSON object per line, for shipping to a log aggregator.
    Json,
}

///
/// Installs the global `tracing` subscriber. Safe to call more than once (only the first call
/// takes effect) so both the gateway binary and test harnesses can call it unconditionally.
///
/// The filter directive defaults to `info` and is overridable via `RUST_LOG`, matching every
/// other `tracing`-based service in the stack.
///
pub fn init_logging(format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = fmt().with_env_filter(filter).with_target(true);
        let result = match format {
            LogFormat::Pretty => subscriber.try_init(),
            LogFormat::Json => subscriber.json().try_init(),
        };
        if let Err(e) = result {
            eprintln!("logging already initialized elsewhere: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }
}
