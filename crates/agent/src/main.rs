// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use dz_agent::Config;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(e) = config.validate() {
        tracing::error!(err = %e, "invalid configuration");
        std::process::exit(2);
    }

    if let Err(e) = dz_agent::run::run(config).await {
        tracing::error!(err = %e, "agent exited with error");
        std::process::exit(1);
    }
}
