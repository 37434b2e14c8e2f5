use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use tillsync_core::{Channel, MerchantId, Money, OrderId};
use tillsync_orders::{aggregate_daily_sales, Order, OrderChildren, OrderFinancials, Payment};

fn synthetic_orders(count: usize) -> (MerchantId, Vec<(Order, OrderChildren)>) {
    let merchant_id = MerchantId::new();
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    let orders = (0..count)
        .map(|i| {
            let id = OrderId::new();
            let placed_at = base + Duration::minutes(i as i64 * 7);
            let total = Money::from_minor_units(100 + (i as i64 % 5000));
            let children = OrderChildren {
                line_items: vec![],
                payments: vec![Payment {
                    order_id: id,
                    external_id: format!("pay-{i}"),
                    method: if i % 3 == 0 { "CASH" } else { "CREDIT_CARD" }.to_string(),
                    amount: total,
                    tip_amount: Money::ZERO,
                    tax_amount: Money::ZERO,
                    paid_at: None,
                }],
                discounts: vec![],
                refunds: vec![],
            };
            let order = Order {
                id,
                merchant_id,
                external_id: format!("ord-{i}"),
                channel: Channel::Clover,
                state: None,
                currency: "USD".to_string(),
                total,
                placed_at,
                modified_at_ms: placed_at.timestamp_millis(),
                note: None,
                financials: OrderFinancials::recompute(&children),
                created_at: placed_at,
                updated_at: placed_at,
            };
            (order, children)
        })
        .collect();

    (merchant_id, orders)
}

fn bench_aggregate(c: &mut Criterion) {
    let (merchant_id, orders) = synthetic_orders(10_000);

    c.bench_function("aggregate_daily_sales_10k", |b| {
        b.iter_batched(
            || orders.clone(),
            |orders| aggregate_daily_sales(merchant_id, Channel::Clover, &orders),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
