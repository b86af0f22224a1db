//! OIRoll Core — domain types, clip normalizer, signal state machine, profit
//! aggregation and the persistence contract.
//!
//! This crate contains everything that is computed per unit:
//! - Domain types (ratio/price series, TradeArgs, positions, trades, roll rows)
//! - Percentile clip tables and the per-run clip cache
//! - Session calendar gating and the three-state position machine
//! - Round-trip trade extraction and profit summaries
//! - The `Store` trait with an in-memory, JSON-snapshotted implementation

pub mod calendar;
pub mod domain;
pub mod error;
pub mod normalize;
pub mod profit;
pub mod signal;
pub mod store;
pub mod synthetic;

pub use error::CoreError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across sweep workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::RatioSeries>();
        require_sync::<domain::RatioSeries>();
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::TradeArgs>();
        require_sync::<domain::TradeArgs>();
        require_send::<domain::TriggerTable>();
        require_sync::<domain::TriggerTable>();
        require_send::<domain::RollExport>();
        require_sync::<domain::RollExport>();

        // Shared services
        require_send::<normalize::ClipCache>();
        require_sync::<normalize::ClipCache>();
        require_send::<calendar::SessionCalendar>();
        require_sync::<calendar::SessionCalendar>();
        require_send::<store::MemoryStore>();
        require_sync::<store::MemoryStore>();
        require_send::<error::CoreError>();
        require_sync::<error::CoreError>();
    }

    /// The store is used as a trait object by the runner.
    #[test]
    fn store_is_object_safe() {
        fn _takes_dyn(_store: &dyn store::Store) {}
        _takes_dyn(&store::MemoryStore::new());
    }
}
