// Copyright 2024 Vault Bridge Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vault Bridge Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix;

use vault_bridge_relayer::context::RelayerContext;
use vault_bridge_relayer::store::SledStore;
use vault_bridge_relayer::{config, probe, service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logger()?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    let config = config::load()?;
    // persistent storage for the relayer.
    let store = SledStore::open(&config.db_path)?;
    let ctx = RelayerContext::new(config, store.clone());

    // start all background services: recovery first, then the live
    // watchers and the heartbeat. Returns the fatal-error channel.
    let mut fatal = service::ignite(&ctx, Arc::new(store.clone())).await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );

    // watch for signals.
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
        },
        Some(err) = fatal.recv() => {
            tracing::error!("A relayer task failed fatally: {}", err);
            ctx.shutdown();
            store.flush()?;
            return Err(err.into());
        },
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    // send shutdown signal to all of the application.
    ctx.shutdown();
    // give the tasks a moment to reach their shutdown arms.
    tokio::time::sleep(Duration::from_millis(300)).await;
    store.flush()?;
    tracing::info!("Clean Exit ..");
    Ok(())
}

fn setup_logger() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("vault_bridge_relayer=info")
        });
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .init();
    Ok(())
}
