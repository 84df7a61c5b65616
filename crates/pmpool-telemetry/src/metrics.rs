//! Prometheus metrics for pmpool.
//!
//! Covers pool operations, rejections by reason, volumes and settlement
//! compensations. Amounts are recorded as `f64`, so very large U256 values
//! lose precision in the metric (never in the ledger).
//!
//! # Panics
//!
//! Registration panics on first use if a metric name is registered twice.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    CounterVec, IntCounter, IntCounterVec, IntGaugeVec,
};

/// Successful ledger operations.
/// Labels: book (ask/bid), op (deposit/fill/claim/withdraw/exit)
pub static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pmpool_operations_total",
        "Total successful pool operations",
        &["book", "op"]
    )
    .unwrap()
});

/// Rejected ledger operations.
/// Labels: book, op, reason (error kind)
pub static REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pmpool_rejections_total",
        "Total rejected pool operations",
        &["book", "op", "reason"]
    )
    .unwrap()
});

/// Inventory units filled by takers.
pub static FILLED_VOLUME: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmpool_filled_volume",
        "Inventory units filled by takers",
        &["book"]
    )
    .unwrap()
});

/// Inventory units deposited by providers.
pub static DEPOSITED_VOLUME: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmpool_deposited_volume",
        "Inventory units deposited by providers",
        &["book"]
    )
    .unwrap()
});

/// Fills that drove a pool to zero inventory.
pub static DEPLETIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pmpool_depletions_total",
        "Fills that left a pool depleted",
        &["book"]
    )
    .unwrap()
});

/// Pool records per book (records are never deleted).
pub static POOLS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("pmpool_pools", "Known pool records", &["book"]).unwrap()
});

/// Settlement steps reversed after a collaborator failure.
pub static COMPENSATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pmpool_compensations_total",
        "Settlement steps reversed after a collaborator failure"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a committed operation.
    pub fn operation(book: &str, op: &str) {
        OPERATIONS_TOTAL.with_label_values(&[book, op]).inc();
    }

    /// Record a rejected operation.
    pub fn rejected(book: &str, op: &str, reason: &str) {
        REJECTIONS_TOTAL.with_label_values(&[book, op, reason]).inc();
    }

    /// Record filled inventory.
    pub fn filled(book: &str, amount: f64) {
        FILLED_VOLUME.with_label_values(&[book]).inc_by(amount);
    }

    /// Record deposited inventory.
    pub fn deposited(book: &str, amount: f64) {
        DEPOSITED_VOLUME.with_label_values(&[book]).inc_by(amount);
    }

    /// Record a pool reaching zero inventory.
    pub fn depleted(book: &str) {
        DEPLETIONS_TOTAL.with_label_values(&[book]).inc();
    }

    /// Set the number of pool records for a book.
    pub fn pools(book: &str, count: usize) {
        POOLS.with_label_values(&[book]).set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record reversed settlement steps.
    pub fn compensated(steps: u64) {
        COMPENSATIONS_TOTAL.inc_by(steps);
    }
}
