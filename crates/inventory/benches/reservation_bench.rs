use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InMemoryInventoryLedger, InventoryItem, InventoryLedger};

fn cart_lines(count: usize) -> Vec<InventoryItem> {
    (0..count)
        .map(|i| InventoryItem::new(format!("SKU-{i:03}"), 1))
        .collect()
}

fn seeded_ledger(products: usize) -> InMemoryInventoryLedger {
    InMemoryInventoryLedger::with_stock((0..products).map(|i| (format!("SKU-{i:03}"), u32::MAX)))
}

fn bench_reserve_single_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = seeded_ledger(1);
    let items = cart_lines(1);

    c.bench_function("inventory/reserve_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .reserve_inventory(OrderId::new(), &items, 15)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_ten_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = seeded_ledger(10);
    let items = cart_lines(10);

    c.bench_function("inventory/reserve_ten_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .reserve_inventory(OrderId::new(), &items, 15)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_check_ten_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = seeded_ledger(10);
    let items = cart_lines(10);

    c.bench_function("inventory/check_ten_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.check_inventory(&items).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_single_line,
    bench_reserve_ten_lines,
    bench_check_ten_lines
);
criterion_main!(benches);
