// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial TRC-20 (USDT on TRON) ledger and settlement service.
//!
//! Users are credited in an embedded off-chain ledger; the chain side is
//! handled by background pipelines over a narrow adapter interface.
//!
//! ## Modules
//!
//! - `chain` - TRON HTTP adapter, addresses, signing
//! - `vault` - encryption of custodial private keys at rest
//! - `store` - embedded redb ledger (wallets, balances, deposits, withdrawals, audit)
//! - `registry` - custodial wallet provisioning
//! - `service` - synchronous facade (provision, withdraw, deposit notify, queries)
//! - `pipeline` - deposit scanner, withdrawal worker, sweeper, stale reaper
//! - `task` - periodic background task runner

pub mod chain;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod store;
pub mod task;
pub mod vault;
