//! runconsole - an embedded console core for spawned processes
//!
//! Consumes interleaved stdout/stderr text containing ANSI escape sequences
//! and keeps a styled, line-oriented transcript that a UI can render from
//! snapshots or incremental deltas.
//!
//! ```
//! use std::sync::Arc;
//! use runconsole::config::TabConfig;
//! use runconsole::core::service::ConsoleService;
//! use runconsole::core::term::StreamKind;
//!
//! let console = ConsoleService::new(1000, Arc::new(TabConfig::default()));
//! console.write("\x1b[31mred\x1b[0m plain", StreamKind::Stdout);
//! let lines = console.create_lines_snapshot();
//! assert_eq!(lines[0].text(), "red plain");
//! assert_eq!(lines[0].spans().len(), 1);
//! ```

pub mod config;
pub mod core;
pub mod ui;
