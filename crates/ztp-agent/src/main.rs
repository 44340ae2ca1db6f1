// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ztp_agent::config::{AgentConfig, Cli};
use ztp_agent::engine::{Engine, SshSwitchOps, SwitchOps};
use ztp_agent::error::AgentError;
use ztp_agent::transport::frame::ControlAction;
use ztp_agent::transport::{self, TransportConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AgentConfig::load(&cli.config_path, &cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(&config, &cli.log_format);

    if let Err(e) = run(config, cli).await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn init_tracing(config: &AgentConfig, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: AgentConfig, cli: Cli) -> Result<(), AgentError> {
    let cancel = CancellationToken::new();
    let ops: Arc<dyn SwitchOps> = Arc::new(SshSwitchOps {
        port: 22,
        preferred_password: String::new(),
        command_timeout: config.command_timeout(),
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (engine, handle) = Engine::new(config.agent_id.clone(), ops, events_tx);

    let transport_config = TransportConfig {
        websocket_url: config.websocket_url(),
        auth_token: config.auth_token.clone(),
        agent_id: config.agent_id.clone(),
        hostname: config.hostname.clone(),
        subnet: config.subnet.clone(),
        reconnect_base: config.reconnect_interval(),
        ..TransportConfig::default()
    };

    if config.enable_ztp {
        handle.push_control(ControlAction::Start);
    } else {
        info!(agent_id = %config.agent_id, "ztp disabled in configuration, waiting for dashboard control frame");
    }

    info!(agent_id = %config.agent_id, server = %config.server_url, "starting ztp-agent");

    let engine_task = tokio::spawn(engine.run(cancel.clone()));
    let transport_task = tokio::spawn(transport::run(transport_config, handle, events_rx, cancel.clone()));

    wait_for_shutdown(&cli, cancel.clone()).await;

    let _ = tokio::join!(engine_task, transport_task);
    info!("ztp-agent stopped");
    Ok(())
}

/// Block until ctrl-c/SIGTERM request shutdown, re-reading the config file
/// on SIGHUP (design §6). Identity fields that name the transport's own
/// connection (agent_id, server_url) only take effect on the next process
/// restart; only the log level is applied live.
async fn wait_for_shutdown(cli: &Cli, cancel: CancellationToken) {
    #[cfg(unix)]
    {
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGHUP handler");
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received ctrl-c, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sighup.recv() => {
                    match AgentConfig::load(&cli.config_path, cli) {
                        Ok(reloaded) => info!(log_level = %reloaded.log_level, "config reloaded on SIGHUP"),
                        Err(e) => warn!(error = %e, "SIGHUP config reload failed, keeping running configuration"),
                    }
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c, shutting down");
    }

    cancel.cancel();
}
