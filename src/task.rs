// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Periodic background task runner.
//!
//! One abstraction for all pipeline loops: a cycle runs to completion, then
//! the runner sleeps for the configured period. A cycle is never started
//! while the previous one is still running, and a slow cycle delays the
//! next rather than overlapping it. Cancellation is checked between cycles
//! and during the sleep, so shutdown never interrupts a cycle midway.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// A unit of recurring work driven by [`run_periodic`].
#[allow(async_fn_in_trait)]
pub trait PeriodicJob {
    fn name(&self) -> &'static str;

    /// One cycle. Must handle its own errors; a failed cycle is retried by
    /// the next scheduled one.
    async fn run_once(&self);
}

/// Drive `job` every `period` until `cancel` fires.
pub async fn run_periodic<J: PeriodicJob>(job: J, period: Duration, cancel: CancellationToken) {
    info!(
        task = job.name(),
        period_secs = period.as_secs(),
        "background task started"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        job.run_once().await;

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = cancel.cancelled() => break,
        }
    }

    info!(task = job.name(), "background task stopped");
}
