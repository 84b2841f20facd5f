// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::env;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trc20_custody::chain::{address, TronHttpClient};
use trc20_custody::config::Config;
use trc20_custody::pipeline::{DepositScanner, StaleWithdrawalReaper, Sweeper, WithdrawalWorker};
use trc20_custody::store::LedgerStore;
use trc20_custody::task::run_periodic;
use trc20_custody::vault::KeyVault;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env()?;

    let store = Arc::new(LedgerStore::open(&config.data_dir.join("custody.redb"))?);
    let vault = Arc::new(KeyVault::from_secret(&config.encryption_secret)?);
    let chain = Arc::new(TronHttpClient::new(
        config.rpc_url.clone(),
        config.api_key.clone(),
        config.token_contract.clone(),
    )?);

    let platform_address = address::address_from_private_key(&config.platform_private_key)?;
    info!(
        rpc = %config.rpc_url,
        token_contract = %config.token_contract,
        platform_address = %platform_address,
        "custody service starting"
    );

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(run_periodic(
        DepositScanner::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            config.min_deposit,
            config.required_confirmations,
        ),
        config.deposit_scan_interval,
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(run_periodic(
        WithdrawalWorker::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            config.platform_private_key.clone(),
            config.withdraw_batch_size,
        ),
        config.withdraw_poll_interval,
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(run_periodic(
        StaleWithdrawalReaper::new(Arc::clone(&store), config.withdraw_stale_after),
        config.withdraw_poll_interval,
        shutdown.clone(),
    )));

    if config.sweep_enabled {
        tasks.push(tokio::spawn(run_periodic(
            Sweeper::new(
                Arc::clone(&store),
                Arc::clone(&chain),
                Arc::clone(&vault),
                platform_address,
                config.platform_private_key.clone(),
                config.min_sweep_amount,
                config.gas_topup_threshold,
                config.gas_topup_amount,
            ),
            config.sweep_interval,
            shutdown.clone(),
        )));
    } else {
        info!("sweeper disabled");
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping background tasks");
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("custody service stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
