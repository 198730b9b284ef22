//! ANSI console emulation: parser, styled lines and the document model.

pub mod line;
pub mod model;
pub mod parser;
pub mod style;

pub use line::{ConsoleLine, Span};
pub use model::{ConsoleDelta, ConsoleModel, MAX_COLUMN};
pub use parser::{AnsiParser, AnsiSink, Control};
pub use style::{AnsiColor, SpanStyle, StreamKind, StyleError, StyleFlags};
