// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background pipelines.
//!
//! Each pipeline is a [`PeriodicJob`](crate::task::PeriodicJob) over the
//! store and the chain adapter. Cycles are stateless: everything a cycle
//! needs is re-read from the store and the chain, so a crash between cycles
//! loses nothing and a restart needs no recovery step.

mod deposits;
mod reaper;
mod sweeper;
mod withdrawals;

pub use deposits::DepositScanner;
pub use reaper::StaleWithdrawalReaper;
pub use sweeper::Sweeper;
pub use withdrawals::WithdrawalWorker;
