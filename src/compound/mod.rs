//! Compounding engine
//!
//! ```text
//! Scheduler ──tick──▶ Compounder
//!                        ├─ ChainStateAggregator  (snapshot or failures)
//!                        ├─ WithdrawalPolicy      (per-account selection)
//!                        └─ TransactionBuilder    (simulate → sign → broadcast)
//! ```

pub mod aggregator;
pub mod engine;
pub mod policy;
pub mod scheduler;

pub use aggregator::{AccountState, ChainStateAggregator, EarningsTracker, QueryFailure, Snapshot};
pub use engine::{Compounder, CycleReport};
pub use policy::WithdrawalPolicy;
pub use scheduler::{spawn_quit_listener, Cycle, Scheduler};
