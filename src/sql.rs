//! Main module for sqlreflow functionality

pub mod dialect;
pub mod errors;
pub mod lexer;
pub mod markers;
pub mod parser;
pub mod pipeline;
pub mod reflow;
pub mod segments;
pub mod templated;
pub mod testing;

pub use dialect::{Dialect, DialectRegistry};
pub use errors::{CompileError, ReflowError, SqlParseError, TemplateError};
pub use parser::{ParseDiagnostic, ParsedFile, Parser, ParserConfig};
pub use pipeline::{Pipeline, PipelineError, ReindentOutcome};
pub use segments::{Segment, SyntaxKind, SyntaxSet};
