//! Streaming SQL engine.
//!
//! streamql compiles a SQL-like query once at configuration time, then
//! continuously folds an unbounded stream of key/value records into
//! windowed, per-group aggregate rows delivered to registered sinks.
//!
//! ```rust,no_run
//! use streamql::streamql::sql::parser::Parser;
//! use streamql::streamql::sql::execution::stream::Stream;
//!
//! # async fn run() -> Result<(), streamql::SqlError> {
//! let stmt = Parser::new(
//!     "select deviceId, avg(temperature) as aa from Input \
//!      where deviceId = 'aa' group by deviceId, TumblingWindow('10s')",
//! )
//! .parse()?;
//! let (config, condition) = stmt.to_stream_config()?;
//!
//! let mut stream = Stream::new(config)?;
//! stream.register_filter(&condition)?;
//! stream.add_sink(|results| println!("{:?}", results));
//! stream.start();
//! # Ok(())
//! # }
//! ```

pub mod streamql;

// Re-export main API
pub use streamql::sql::ast::SelectStatement;
pub use streamql::sql::error::{SqlError, SqlResult};
pub use streamql::sql::execution::config::StreamConfig;
pub use streamql::sql::execution::stream::Stream;
pub use streamql::sql::execution::types::{FieldValue, Record};
pub use streamql::sql::parser::Parser;
