//! End-to-end tests for the sync pipeline against the in-memory store and a
//! scripted upstream.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use tillsync_core::{Channel, Money};
    use tillsync_infra::{
        CheckpointStatus, CursorDataType, JobStatus, MemoryStore, MerchantStore, JobStore,
        LocationStore, OrderStore, StockStore, CostStore, CursorStore, DailySalesStore,
        SyncCheckpoint, SyncJob,
    };
    use tillsync_merchants::{ExternalMerchantRef, Merchant, PosLocation};
    use tillsync_upstream::{
        OrderPageQuery, PosApi, PosCredentials, StockPageQuery, UpstreamError, UpstreamItem,
        UpstreamLineItem, UpstreamOrder, UpstreamStockLevel,
    };

    use crate::engine::{SyncEngine, SyncEngineConfig, SyncOptions};
    use crate::error::SyncError;
    use crate::orchestrator::{
        HistoricalSyncRequest, JobOrchestrator, OrchestratorConfig, TickOutcome,
    };
    use crate::scheduler::{InventoryScheduler, SchedulerConfig};

    /// Scripted upstream: orders/stock are filtered and paged the way the
    /// real API would, with an injectable fetch failure.
    struct MockPos {
        orders: Mutex<Vec<UpstreamOrder>>,
        stock: Mutex<Vec<UpstreamStockLevel>>,
        items: Mutex<Vec<UpstreamItem>>,
        fail_orders: AtomicBool,
    }

    impl MockPos {
        fn new() -> Self {
            Self {
                orders: Mutex::new(Vec::new()),
                stock: Mutex::new(Vec::new()),
                items: Mutex::new(Vec::new()),
                fail_orders: AtomicBool::new(false),
            }
        }

        fn push_order(&self, order: UpstreamOrder) {
            self.orders.lock().unwrap().push(order);
        }

        fn push_stock(&self, stock: UpstreamStockLevel) {
            self.stock.lock().unwrap().push(stock);
        }

        fn push_item(&self, item: UpstreamItem) {
            self.items.lock().unwrap().push(item);
        }
    }

    #[async_trait]
    impl PosApi for MockPos {
        async fn fetch_orders(
            &self,
            _credentials: &PosCredentials,
            query: &OrderPageQuery,
        ) -> Result<Vec<UpstreamOrder>, UpstreamError> {
            if self.fail_orders.load(Ordering::SeqCst) {
                return Err(UpstreamError::Transport("injected failure".to_string()));
            }

            let mut matching: Vec<UpstreamOrder> = self
                .orders
                .lock()
                .unwrap()
                .iter()
                .filter(|o| {
                    o.modified_time >= query.modified_time_min
                        && o.modified_time <= query.modified_time_max
                })
                .cloned()
                .collect();
            matching.sort_by_key(|o| o.modified_time);

            Ok(matching
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect())
        }

        async fn fetch_stock_levels(
            &self,
            _credentials: &PosCredentials,
            query: &StockPageQuery,
        ) -> Result<Vec<UpstreamStockLevel>, UpstreamError> {
            Ok(self
                .stock
                .lock()
                .unwrap()
                .iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect())
        }

        async fn find_item_by_sku(
            &self,
            _credentials: &PosCredentials,
            sku: &str,
        ) -> Result<Option<UpstreamItem>, UpstreamError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.sku.as_deref() == Some(sku))
                .cloned())
        }
    }

    fn upstream_order(id: &str, total: i64, modified_ms: i64) -> UpstreamOrder {
        UpstreamOrder {
            id: id.to_string(),
            merchant_id: None,
            state: Some("locked".to_string()),
            currency: Some("USD".to_string()),
            total,
            note: None,
            created_time: modified_ms,
            modified_time: modified_ms,
            line_items: None,
            payments: None,
            discounts: None,
            refunds: None,
        }
    }

    fn line(id: &str, price: i64, quantity: i64) -> UpstreamLineItem {
        UpstreamLineItem {
            id: id.to_string(),
            name: Some(format!("item-{id}")),
            sku: None,
            item_id: None,
            price,
            quantity,
            tax_amount: 0,
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        pos: Arc<MockPos>,
        engine: Arc<SyncEngine>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let pos = Arc::new(MockPos::new());
        let config = SyncEngineConfig::default().with_page_delay(Duration::ZERO);
        let engine = Arc::new(SyncEngine::new(store.clone(), pos.clone(), config));
        Harness { store, pos, engine }
    }

    async fn provision_merchant(harness: &Harness, external_id: &str) -> Merchant {
        let external = ExternalMerchantRef::new(external_id, Channel::Clover).unwrap();
        let merchant = harness.store.upsert_merchant(&external).await.unwrap();
        harness
            .store
            .set_merchant_token(merchant.id, Some("test-token".to_string()))
            .await
            .unwrap();
        harness.store.get_merchant(merchant.id).await.unwrap().unwrap()
    }

    fn recent_ms(seconds_ago: i64) -> i64 {
        (Utc::now() - chrono::Duration::seconds(seconds_ago)).timestamp_millis()
    }

    #[tokio::test]
    async fn two_orders_sync_with_derived_financials_and_cursor() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;

        let t1 = recent_ms(3_600);
        let t2 = recent_ms(1_800);
        let mut o1 = upstream_order("O1", 1999, t1);
        o1.line_items = Some(vec![line("L1", 999, 2)]);
        h.pos.push_order(o1);
        h.pos.push_order(upstream_order("O2", 500, t2));

        let report = h
            .engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.orders_created, 2);
        assert_eq!(report.orders_updated, 0);
        assert!(report.errors.is_empty());

        let o1 = h
            .store
            .find_order_by_external_id(merchant.id, "O1", Channel::Clover)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(o1.total.to_string(), "19.99");
        assert_eq!(o1.financials.subtotal.to_string(), "19.98");

        let cursor = h
            .store
            .get_cursor(merchant.id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_modified_ms, t2);
        assert!(cursor.last_success_at.is_some());
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;

        let mut o1 = upstream_order("O1", 1999, recent_ms(600));
        o1.line_items = Some(vec![line("L1", 999, 2)]);
        h.pos.push_order(o1);
        h.pos.push_order(upstream_order("O2", 500, recent_ms(300)));

        let first = h
            .engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.orders_created, 2);

        let date = (Utc::now() - chrono::Duration::seconds(300)).date_naive();
        let daily_before = h
            .store
            .get_daily_sales(merchant.id, Channel::Clover, date)
            .await
            .unwrap()
            .unwrap();

        let second = h
            .engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(second.orders_created, 0);

        let daily_after = h
            .store
            .get_daily_sales(merchant.id, Channel::Clover, date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(daily_before, daily_after);

        // Cursor never moved backwards.
        let cursor = h
            .store
            .get_cursor(merchant.id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_modified_ms, first.watermark_ms);
    }

    #[tokio::test]
    async fn failed_order_does_not_advance_watermark() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;

        let t_ok = recent_ms(600);
        let t_bad = recent_ms(300);
        h.pos.push_order(upstream_order("OK", 1000, t_ok));
        // Unresolvable merchant reference: this order fails per-record.
        let mut bad = upstream_order("BAD", 2000, t_bad);
        bad.merchant_id = Some("  ".to_string());
        h.pos.push_order(bad);

        let report = h
            .engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.orders_created, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].external_order_id, "BAD");

        // The watermark stops at the successful order, so the failed one
        // stays inside the next incremental window.
        let cursor = h
            .store
            .get_cursor(merchant.id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_modified_ms, t_ok);
    }

    #[tokio::test]
    async fn missing_credentials_abort_run_and_mark_cursor() {
        let h = harness().await;
        let external = ExternalMerchantRef::new("LOC1", Channel::Clover).unwrap();
        let merchant = h.store.upsert_merchant(&external).await.unwrap();

        let result = h.engine.sync_merchant(merchant.id, SyncOptions::default()).await;
        assert!(matches!(result, Err(SyncError::MissingCredentials(_))));

        let cursor = h
            .store
            .get_cursor(merchant.id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.error_count, 1);
        assert!(cursor.last_error.is_some());
        assert!(cursor.last_success_at.is_none());
    }

    #[tokio::test]
    async fn upstream_failure_aborts_and_records_cursor_error() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;
        h.pos.fail_orders.store(true, Ordering::SeqCst);

        let result = h.engine.sync_merchant(merchant.id, SyncOptions::default()).await;
        assert!(matches!(result, Err(SyncError::Upstream(_))));

        let cursor = h
            .store
            .get_cursor(merchant.id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.error_count, 1);
    }

    async fn seed_locations(h: &Harness, count: usize) {
        for i in 0..count {
            let external_id = format!("LOC{i}");
            let location =
                PosLocation::new(&external_id, Channel::Clover, format!("Location {i}")).unwrap();
            h.store.upsert_location(&location).await.unwrap();
            provision_merchant(h, &external_id).await;
        }
    }

    fn orchestrator(h: &Harness, config: OrchestratorConfig) -> JobOrchestrator {
        JobOrchestrator::new(h.store.clone(), h.engine.clone(), config)
    }

    fn backfill_request() -> HistoricalSyncRequest {
        HistoricalSyncRequest {
            channel: Channel::Clover,
            range_start: Utc::now() - chrono::Duration::days(30),
            range_end: Utc::now(),
            force_full_sync: false,
        }
    }

    #[tokio::test]
    async fn historical_job_fans_out_and_completes() {
        let h = harness().await;
        seed_locations(&h, 3).await;
        h.pos.push_order(upstream_order("O1", 1000, recent_ms(600)));

        let orch = orchestrator(&h, OrchestratorConfig::default());
        let job_id = orch.start_historical_sync(backfill_request()).await.unwrap();

        let checkpoints = h.store.checkpoints_for_job(job_id).await.unwrap();
        assert_eq!(checkpoints.len(), 3);
        assert!(checkpoints.iter().all(|c| c.status == CheckpointStatus::Pending));
        assert_eq!(
            h.store.get_job(job_id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );

        for _ in 0..3 {
            let outcome = orch.tick().await.unwrap();
            assert!(matches!(outcome, TickOutcome::CheckpointCompleted(_)));
        }
        assert_eq!(orch.tick().await.unwrap(), TickOutcome::JobCompleted(job_id));

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let checkpoints = h.store.checkpoints_for_job(job_id).await.unwrap();
        assert!(checkpoints.iter().all(|c| c.status == CheckpointStatus::Completed));
    }

    #[tokio::test]
    async fn checkpoint_fails_terminally_after_max_retries() {
        let h = harness().await;
        seed_locations(&h, 1).await;
        h.pos.fail_orders.store(true, Ordering::SeqCst);

        // Zero backoff so every tick can re-claim immediately.
        let orch = orchestrator(
            &h,
            OrchestratorConfig::default()
                .with_max_retries(5)
                .with_backoff_base(chrono::Duration::zero()),
        );
        let job_id = orch.start_historical_sync(backfill_request()).await.unwrap();

        for attempt in 1..5u32 {
            let outcome = orch.tick().await.unwrap();
            assert!(matches!(outcome, TickOutcome::CheckpointFailed(_)));
            let cp = &h.store.checkpoints_for_job(job_id).await.unwrap()[0];
            assert_eq!(cp.status, CheckpointStatus::Retry);
            assert_eq!(cp.retry_count, attempt);
        }

        // Fifth failure is terminal.
        let outcome = orch.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::CheckpointFailed(_)));
        let cp = &h.store.checkpoints_for_job(job_id).await.unwrap()[0];
        assert_eq!(cp.status, CheckpointStatus::Failed);
        assert_eq!(cp.retry_count, 5);
        assert!(cp.last_error.is_some());

        // A sixth tick does not re-attempt it; the job closes out.
        assert_eq!(orch.tick().await.unwrap(), TickOutcome::JobCompleted(job_id));
        let cp = &h.store.checkpoints_for_job(job_id).await.unwrap()[0];
        assert_eq!(cp.status, CheckpointStatus::Failed);
        assert_eq!(cp.retry_count, 5);
    }

    #[tokio::test]
    async fn retry_backoff_gates_the_next_claim() {
        let h = harness().await;
        seed_locations(&h, 1).await;
        h.pos.fail_orders.store(true, Ordering::SeqCst);

        let orch = orchestrator(
            &h,
            OrchestratorConfig::default().with_backoff_base(chrono::Duration::seconds(30)),
        );
        let job_id = orch.start_historical_sync(backfill_request()).await.unwrap();

        let outcome = orch.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::CheckpointFailed(_)));

        // Backoff has not elapsed: the worker waits instead of re-claiming.
        assert_eq!(orch.tick().await.unwrap(), TickOutcome::Waiting);
        let _ = job_id;
    }

    #[tokio::test]
    async fn startup_recovery_resets_active_rows_before_claiming() {
        let h = harness().await;
        let now = Utc::now();

        let mut job = SyncJob::new(Channel::Clover, now - chrono::Duration::days(1), now, false, now);
        job.mark_active(now);
        h.store.insert_job(&job).await.unwrap();
        let mut cp = SyncCheckpoint::new(job.id, "LOC0", "Location 0", None, now);
        cp.mark_active(now);
        h.store.insert_checkpoint(&cp).await.unwrap();

        let orch = orchestrator(&h, OrchestratorConfig::default());
        let reset = orch.recover().await.unwrap();
        assert_eq!(reset, 2);

        assert_eq!(
            h.store.get_checkpoint(cp.id).await.unwrap().unwrap().status,
            CheckpointStatus::Pending
        );
        assert_eq!(
            h.store.get_job(job.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn cancel_job_spares_nothing_claimable() {
        let h = harness().await;
        seed_locations(&h, 2).await;

        let orch = orchestrator(&h, OrchestratorConfig::default());
        let job_id = orch.start_historical_sync(backfill_request()).await.unwrap();

        orch.cancel_job(job_id).await.unwrap();

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        let checkpoints = h.store.checkpoints_for_job(job_id).await.unwrap();
        assert!(checkpoints.iter().all(|c| c.status == CheckpointStatus::Cancelled));

        // Cancelled jobs are invisible to the worker.
        assert_eq!(orch.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn inventory_pass_upserts_stock_and_tracks_cost_changes() {
        let h = harness().await;
        seed_locations(&h, 1).await;

        h.pos.push_stock(UpstreamStockLevel {
            item_id: "ITEM1".to_string(),
            sku: Some("SKU-1".to_string()),
            name: Some("Beans".to_string()),
            quantity: 42,
            cost: Some(400),
        });

        let scheduler = InventoryScheduler::new(
            h.store.clone(),
            h.engine.clone(),
            SchedulerConfig::default(),
        );

        let summary = scheduler.run_once().await.unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.locations_synced, 1);
        assert_eq!(summary.locations_failed, 0);

        let merchant = h
            .store
            .find_merchant_by_external_id("LOC0", Channel::Clover)
            .await
            .unwrap()
            .unwrap();
        let levels = h.store.stock_levels_for(merchant.id).await.unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].quantity, 42);
        assert_eq!(
            h.store.latest_cost(merchant.id, "ITEM1").await.unwrap(),
            Some(Money::from_minor_units(400))
        );

        // Unchanged cost on the next pass appends no new observation.
        scheduler.run_once().await.unwrap();
        let at = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(
            h.store.cost_at(merchant.id, "ITEM1", at).await.unwrap(),
            Some(Money::from_minor_units(400))
        );

        let status = scheduler.status();
        assert!(!status.running);
        assert!(!status.syncing);
        assert!(status.last_run_at.is_some());
        assert!(status.next_run_at.is_some());
    }

    #[tokio::test]
    async fn missing_cost_history_falls_back_to_sku_lookup() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;

        h.pos.push_item(UpstreamItem {
            id: "ITEM1".to_string(),
            sku: Some("SKU-1".to_string()),
            name: Some("Latte".to_string()),
            price: 999,
            cost: Some(350),
        });

        let mut order = upstream_order("O1", 999, recent_ms(600));
        order.line_items = Some(vec![UpstreamLineItem {
            sku: Some("SKU-1".to_string()),
            ..line("L1", 999, 1)
        }]);
        h.pos.push_order(order);

        h.engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();

        let persisted = h
            .store
            .find_order_by_external_id(merchant.id, "O1", Channel::Clover)
            .await
            .unwrap()
            .unwrap();
        let children = h.store.children_of(persisted.id).await.unwrap();
        assert_eq!(children.line_items[0].unit_cost, Some(Money::from_minor_units(350)));

        // The lookup seeded the cost history for future sales.
        assert_eq!(
            h.store.latest_cost(merchant.id, "ITEM1").await.unwrap(),
            Some(Money::from_minor_units(350))
        );
    }

    #[tokio::test]
    async fn line_items_snapshot_cost_at_sale_time() {
        let h = harness().await;
        let merchant = provision_merchant(&h, "LOC1").await;

        // Cost observed before the sale.
        h.store
            .append_cost_observation(&tillsync_inventory::CostObservation {
                merchant_id: merchant.id,
                item_external_id: "ITEM1".to_string(),
                cost: Money::from_minor_units(400),
                observed_at: Utc::now() - chrono::Duration::days(2),
            })
            .await
            .unwrap();

        let mut order = upstream_order("O1", 1998, recent_ms(600));
        order.line_items = Some(vec![UpstreamLineItem {
            item_id: Some("ITEM1".to_string()),
            ..line("L1", 999, 2)
        }]);
        h.pos.push_order(order);

        h.engine
            .sync_merchant(merchant.id, SyncOptions::default())
            .await
            .unwrap();

        let persisted = h
            .store
            .find_order_by_external_id(merchant.id, "O1", Channel::Clover)
            .await
            .unwrap()
            .unwrap();
        let children = h.store.children_of(persisted.id).await.unwrap();
        assert_eq!(children.line_items[0].unit_cost, Some(Money::from_minor_units(400)));
        assert_eq!(children.line_items[0].line_cogs, Money::from_minor_units(800));

        // cogs and margin follow the snapshot.
        assert_eq!(persisted.financials.cogs, Money::from_minor_units(800));
        assert_eq!(
            persisted.financials.gross_margin,
            Money::from_minor_units(1998 - 800)
        );
    }
}
