//! Signal generation: threshold resolution and the position state machine.
//!
//! `resolve` turns a TradeArgs into raw per-minute trigger levels using the
//! clip cache; `machine` consumes trigger tables and ratio ticks. Replay of a
//! frozen export skips `resolve` and feeds its stored tables straight in.

pub mod machine;
pub mod resolve;

pub use machine::{transition, SignalMachine};
pub use resolve::{resolve_row, ClipResolver};
