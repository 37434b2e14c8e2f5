//! Periodic inventory sync scheduler.
//!
//! Independent of the order pipeline: each tick iterates the active
//! locations and runs a stock-level sync per location. Overlap between a
//! timer tick and a manual trigger is prevented by an atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use tillsync_core::Channel;
use tillsync_infra::Store;
use tillsync_merchants::ExternalMerchantRef;

use crate::engine::SyncEngine;
use crate::error::SyncError;

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: std::time::Duration,
    pub channel: Channel,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(30 * 60),
            channel: Channel::Clover,
        }
    }
}

impl SchedulerConfig {
    pub fn with_interval(mut self, interval: std::time::Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// Status surface for the operational API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub syncing: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryRunSummary {
    /// A pass that found the overlap guard held was skipped entirely.
    pub skipped: bool,
    pub locations_synced: u64,
    pub locations_failed: u64,
}

/// Periodic stock-level sync trigger.
pub struct InventoryScheduler {
    store: Arc<dyn Store>,
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    running: AtomicBool,
    syncing: AtomicBool,
    last_run_at: RwLock<Option<DateTime<Utc>>>,
}

impl InventoryScheduler {
    pub fn new(store: Arc<dyn Store>, engine: Arc<SyncEngine>, config: SchedulerConfig) -> Self {
        Self {
            store,
            engine,
            config,
            running: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            last_run_at: RwLock::new(None),
        }
    }

    /// One pass over all active locations; also the manual trigger.
    pub async fn run_once(&self) -> Result<InventoryRunSummary, SyncError> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("inventory sync already in progress; skipping");
            return Ok(InventoryRunSummary {
                skipped: true,
                locations_synced: 0,
                locations_failed: 0,
            });
        }

        let result = self.run_inner().await;
        self.syncing.store(false, Ordering::SeqCst);
        *self.last_run_at.write().unwrap() = Some(Utc::now());
        result
    }

    async fn run_inner(&self) -> Result<InventoryRunSummary, SyncError> {
        let locations = self.store.list_active_locations(self.config.channel).await?;
        let mut summary = InventoryRunSummary {
            skipped: false,
            locations_synced: 0,
            locations_failed: 0,
        };

        // Each location syncs independently: one failing location never
        // blocks the rest of the pass.
        for location in &locations {
            let external =
                ExternalMerchantRef::new(&location.external_merchant_id, location.channel)?
                    .with_name(&location.name);
            let merchant = self.engine.resolver().resolve(&external).await?;

            match self.engine.sync_inventory(merchant.id).await {
                Ok(report) => {
                    summary.locations_synced += 1;
                    tracing::debug!(
                        merchant_id = %merchant.id,
                        items = report.items_synced,
                        "location inventory synced"
                    );
                }
                Err(e) => {
                    summary.locations_failed += 1;
                    tracing::warn!(
                        merchant_id = %merchant.id,
                        location = %location.name,
                        error = %e,
                        "location inventory sync failed"
                    );
                }
            }
        }

        tracing::info!(
            synced = summary.locations_synced,
            failed = summary.locations_failed,
            "inventory sync pass finished"
        );
        Ok(summary)
    }

    pub fn status(&self) -> SchedulerStatus {
        let last_run_at = *self.last_run_at.read().unwrap();
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            syncing: self.syncing.load(Ordering::SeqCst),
            last_run_at,
            next_run_at: last_run_at.map(|at| {
                at + chrono::Duration::from_std(self.config.interval)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0))
            }),
        }
    }

    /// Spawn the periodic loop until `shutdown` is notified.
    pub fn spawn(self: Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.config.interval.as_secs(), "inventory scheduler started");

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("inventory scheduler received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "inventory sync pass failed");
                        }
                    }
                }
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::info!("inventory scheduler stopped");
        })
    }
}
