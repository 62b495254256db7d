//! SchedulerService - スケジューラのライフサイクル
//!
//! # 設計
//! - グローバルな「実行中」フラグは持たない。`start` が返す
//!   [`SchedulerHandle`] が唯一の所有者
//! - 停止は `watch` チャネルで通知。実行中の tick は最後まで走らせてから止まる
//!   （claim したまま放置される reminder を作らない）
//! - 起動時に、前回のプロセスが残した claim を解放する

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::Ticker;

use super::scheduler::ReminderScheduler;
use super::status::SchedulerStatus;

pub struct SchedulerService;

impl SchedulerService {
    /// Spawn the scheduler loop. Must be called inside a tokio runtime.
    pub fn start<T>(scheduler: Arc<ReminderScheduler>, ticker: T) -> SchedulerHandle
    where
        T: Ticker + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = Arc::new(Mutex::new(SchedulerStatus {
            running: true,
            ..SchedulerStatus::default()
        }));

        let join = tokio::spawn(scheduler_loop(
            scheduler,
            ticker,
            shutdown_rx,
            Arc::clone(&status),
        ));

        SchedulerHandle {
            shutdown_tx,
            status,
            join: Some(join),
        }
    }
}

/// Owner of a running scheduler loop.
///
/// Dropping the handle also stops the loop (after the current tick), but
/// without waiting for it.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    status: Arc<Mutex<SchedulerStatus>>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        lock(&self.status).running
    }

    pub fn status(&self) -> SchedulerStatus {
        lock(&self.status).clone()
    }

    /// Ask the loop to stop without waiting.
    pub fn request_stop(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop and wait for the in-flight tick (if any) to finish.
    pub async fn stop(mut self) -> SchedulerStatus {
        self.request_stop();
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            tracing::error!(error = %err, "scheduler task ended abnormally");
            lock(&self.status).running = false;
        }
        self.status()
    }
}

fn lock(status: &Mutex<SchedulerStatus>) -> std::sync::MutexGuard<'_, SchedulerStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

async fn scheduler_loop<T: Ticker>(
    scheduler: Arc<ReminderScheduler>,
    mut ticker: T,
    mut shutdown_rx: watch::Receiver<bool>,
    status: Arc<Mutex<SchedulerStatus>>,
) {
    match scheduler.store().release_stale_claims().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(released = n, "released claims left by a previous run"),
        Err(err) => tracing::error!(error = %err, "failed to release stale claims"),
    }
    tracing::info!("scheduler started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // 待機中だけ shutdown と競合させる。tick 本体は select の外
        let ticked = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // handle dropped
                    break;
                }
                continue;
            }
            ticked = ticker.tick() => ticked,
        };
        if !ticked {
            tracing::info!("tick source closed");
            break;
        }

        match scheduler.tick().await {
            Ok(report) => lock(&status).record_tick(report),
            Err(_) => lock(&status).record_failed_tick(),
        }
    }

    lock(&status).running = false;
    tracing::info!("scheduler stopped");
}
