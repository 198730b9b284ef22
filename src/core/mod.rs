//! Core console emulation components.
//!
//! - **term**: ANSI parser, styled lines and the console document model
//! - **service**: Thread-safe shared console with change listeners and stdin routing
//! - **runner**: Child process plumbing feeding a console
//!
//! # Architecture
//!
//! ```text
//! ConsoleService (Mutex + listeners + stdin slot)
//! └── ConsoleModel
//!     ├── lines: Vec<ConsoleLine> (text + style spans)
//!     ├── cursor, current style, saved cursor
//!     └── AnsiParser (ESC / CSI state machine)
//! ```

pub mod runner;
pub mod service;
pub mod term;
