//! Streaming execution runtime: filter, windows, aggregation, orchestrator.

pub mod aggregation;
pub mod config;
pub mod expression;
pub mod filter;
pub mod stream;
pub mod types;
pub mod window;

pub use config::{StreamConfig, WindowConfig, WindowSpec};
pub use stream::Stream;
pub use types::{FieldValue, Record, Row, TimeSlot};
