//! # Long-Poll Module
//!
//! In-memory long-poll event manager.
//!
//! Clients poll a named category with a watermark. If newer events are
//! buffered the poll answers at once; otherwise it parks until a matching
//! publish, its timeout, or shutdown.
//!
//! ## Architecture
//!
//! - **Event Store**: per-category buffer bounded by size and age
//! - **Category Registry**: category name → buffer + parked tickets
//! - **Coordinator**: ticket parking and exactly-once resolution
//! - **Janitor**: background TTL sweep
//! - **Manager**: lifecycle, publish and poll

pub mod coordinator;
pub mod errors;
pub mod event;
pub mod janitor;
pub mod manager;
pub mod options;
pub mod registry;
pub mod store;

pub use coordinator::PollOutcome;
pub use errors::{LongpollError, LongpollResult};
pub use event::{Event, Watermark, MAX_CATEGORY_LEN};
pub use manager::{LongpollManager, PollRequest};
pub use options::Options;
pub use registry::CategoryStats;
pub use store::EventBuffer;
