//! Bundled DDL for the Postgres store.
//!
//! Applied by `PostgresStore::ensure_schema` on startup; every statement is
//! idempotent so repeated application is harmless. Monetary columns are
//! BIGINT minor units; natural keys are enforced with UNIQUE constraints so
//! upsert idempotency holds at the database level regardless of how many
//! processes write.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS merchants (
    id UUID PRIMARY KEY,
    external_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    name TEXT NOT NULL,
    api_token TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (external_id, channel)
);

CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    merchant_id UUID NOT NULL REFERENCES merchants (id),
    external_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    state TEXT,
    currency TEXT NOT NULL,
    total_cents BIGINT NOT NULL,
    placed_at TIMESTAMPTZ NOT NULL,
    modified_at_ms BIGINT NOT NULL,
    note TEXT,
    subtotal_cents BIGINT NOT NULL DEFAULT 0,
    tax_cents BIGINT NOT NULL DEFAULT 0,
    tip_cents BIGINT NOT NULL DEFAULT 0,
    discount_cents BIGINT NOT NULL DEFAULT 0,
    refund_cents BIGINT NOT NULL DEFAULT 0,
    cogs_cents BIGINT NOT NULL DEFAULT 0,
    gross_margin_cents BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (merchant_id, external_id, channel)
);

CREATE INDEX IF NOT EXISTS orders_merchant_placed_idx
    ON orders (merchant_id, channel, placed_at);

CREATE TABLE IF NOT EXISTS order_line_items (
    order_id UUID NOT NULL REFERENCES orders (id),
    external_id TEXT NOT NULL,
    name TEXT NOT NULL,
    sku TEXT,
    item_external_id TEXT,
    quantity BIGINT NOT NULL,
    unit_price_cents BIGINT NOT NULL,
    line_total_cents BIGINT NOT NULL,
    tax_cents BIGINT NOT NULL,
    unit_cost_cents BIGINT,
    line_cogs_cents BIGINT NOT NULL,
    PRIMARY KEY (order_id, external_id)
);

CREATE TABLE IF NOT EXISTS order_payments (
    order_id UUID NOT NULL REFERENCES orders (id),
    external_id TEXT NOT NULL,
    method TEXT NOT NULL,
    amount_cents BIGINT NOT NULL,
    tip_cents BIGINT NOT NULL,
    tax_cents BIGINT NOT NULL,
    paid_at TIMESTAMPTZ,
    PRIMARY KEY (order_id, external_id)
);

CREATE TABLE IF NOT EXISTS order_discounts (
    order_id UUID NOT NULL REFERENCES orders (id),
    external_id TEXT NOT NULL,
    name TEXT,
    amount_cents BIGINT NOT NULL,
    PRIMARY KEY (order_id, external_id)
);

CREATE TABLE IF NOT EXISTS order_refunds (
    order_id UUID NOT NULL REFERENCES orders (id),
    external_id TEXT NOT NULL,
    amount_cents BIGINT NOT NULL,
    reason TEXT,
    refunded_at TIMESTAMPTZ,
    PRIMARY KEY (order_id, external_id)
);

CREATE TABLE IF NOT EXISTS item_cost_history (
    id BIGSERIAL PRIMARY KEY,
    merchant_id UUID NOT NULL,
    item_external_id TEXT NOT NULL,
    cost_cents BIGINT NOT NULL,
    observed_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS item_cost_history_lookup_idx
    ON item_cost_history (merchant_id, item_external_id, observed_at);

CREATE TABLE IF NOT EXISTS stock_levels (
    merchant_id UUID NOT NULL,
    item_external_id TEXT NOT NULL,
    sku TEXT,
    name TEXT,
    quantity BIGINT NOT NULL,
    as_of TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (merchant_id, item_external_id)
);

CREATE TABLE IF NOT EXISTS daily_sales (
    merchant_id UUID NOT NULL,
    channel TEXT NOT NULL,
    date DATE NOT NULL,
    order_count BIGINT NOT NULL,
    gross_cents BIGINT NOT NULL,
    net_cents BIGINT NOT NULL,
    tax_cents BIGINT NOT NULL,
    tip_cents BIGINT NOT NULL,
    discount_cents BIGINT NOT NULL,
    refund_cents BIGINT NOT NULL,
    cogs_cents BIGINT NOT NULL,
    gross_margin_cents BIGINT NOT NULL,
    payment_breakdown JSONB NOT NULL,
    PRIMARY KEY (merchant_id, channel, date)
);

CREATE TABLE IF NOT EXISTS sync_cursors (
    merchant_id UUID NOT NULL,
    channel TEXT NOT NULL,
    data_type TEXT NOT NULL,
    last_modified_ms BIGINT NOT NULL,
    batch_size INT NOT NULL,
    error_count INT NOT NULL,
    last_error TEXT,
    last_run_at TIMESTAMPTZ,
    last_success_at TIMESTAMPTZ,
    PRIMARY KEY (merchant_id, channel, data_type)
);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id UUID PRIMARY KEY,
    channel TEXT NOT NULL,
    range_start TIMESTAMPTZ NOT NULL,
    range_end TIMESTAMPTZ NOT NULL,
    force_full_sync BOOLEAN NOT NULL,
    status TEXT NOT NULL,
    processed_orders BIGINT NOT NULL,
    total_orders BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_checkpoints (
    id UUID PRIMARY KEY,
    job_id UUID NOT NULL REFERENCES sync_jobs (id),
    external_merchant_id TEXT NOT NULL,
    location_id UUID,
    location_name TEXT NOT NULL,
    status TEXT NOT NULL,
    retry_count INT NOT NULL,
    last_error TEXT,
    processed_orders BIGINT NOT NULL,
    total_orders BIGINT NOT NULL,
    last_synced_at TIMESTAMPTZ,
    next_attempt_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS sync_checkpoints_claim_idx
    ON sync_checkpoints (job_id, status, next_attempt_at);

CREATE TABLE IF NOT EXISTS pos_locations (
    external_merchant_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    name TEXT NOT NULL,
    active BOOLEAN NOT NULL,
    location_id UUID,
    PRIMARY KEY (external_merchant_id, channel)
);
"#;
