// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ztp_dashboard::config::DashboardConfig;

#[tokio::main]
async fn main() {
    let config = DashboardConfig::parse();
    init_tracing(&config);

    if let Err(e) = ztp_dashboard::run(config).await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn init_tracing(config: &DashboardConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
