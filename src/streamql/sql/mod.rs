// Streaming SQL module for streamql
// Query compilation (lexer, parser, plan builder) and the windowed
// execution runtime live here.

pub mod ast;
pub mod error;
pub mod execution;
pub mod parser;

// Re-export main API
pub use ast::SelectStatement;
pub use error::{SqlError, SqlResult};
pub use execution::stream::Stream;
pub use execution::types::FieldValue;
pub use parser::Parser;
