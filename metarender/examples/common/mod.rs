// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the metarender examples.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: renderer decisions at debug,
/// everything else at info.
const DEFAULT_FILTER: &str = "info,metarender=debug";

/// Installs a stdout subscriber that prints thread names, so deliveries on
/// a context thread are told apart from the driver loop.
pub fn setup_logging() {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy(directives),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .init();
}
