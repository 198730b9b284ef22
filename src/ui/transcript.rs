//! Incremental transcript printing
//!
//! Prints each console line once, when the cursor has moved below it. Lines
//! are tracked by stable number (snapshot `first_line` plus index), so
//! scrollback eviction does not hide new output.

use std::io::{self, Write};

use tracing::debug;

use super::renderer::Renderer;
use crate::core::service::ConsoleSnapshot;
use crate::core::term::ConsoleDelta;

pub struct TranscriptPrinter {
    renderer: Renderer,
    /// Stable number of the first line not printed yet
    printed: usize,
}

impl TranscriptPrinter {
    pub fn new(renderer: Renderer) -> Self {
        Self { renderer, printed: 0 }
    }

    /// Print every line above the cursor that has not been printed yet
    pub fn commit<W: Write>(
        &mut self,
        out: &mut W,
        snapshot: &ConsoleSnapshot,
        delta: ConsoleDelta,
    ) -> io::Result<()> {
        if delta == ConsoleDelta::None {
            return Ok(());
        }
        let (cursor_line, _) = snapshot.cursor;
        let end = cursor_line.min(snapshot.lines.len());
        let start = self.relative_start(snapshot, delta);
        if start < end {
            self.renderer.render_lines(out, &snapshot.lines[start..end])?;
        }
        self.printed = snapshot.first_line + start.max(end);
        Ok(())
    }

    /// Print whatever remains, leaving out a trailing empty line
    pub fn finish<W: Write>(&mut self, out: &mut W, snapshot: &ConsoleSnapshot) -> io::Result<()> {
        let lines = &snapshot.lines;
        let end = match lines.last() {
            Some(last) if last.is_empty() => lines.len() - 1,
            _ => lines.len(),
        };
        let start = self.relative_start(snapshot, ConsoleDelta::None);
        if start < end {
            self.renderer.render_lines(out, &lines[start..end])?;
        }
        self.printed = snapshot.first_line + start.max(end);
        Ok(())
    }

    /// Index into `snapshot.lines` of the first unprinted line
    fn relative_start(&self, snapshot: &ConsoleSnapshot, delta: ConsoleDelta) -> usize {
        if self.printed < snapshot.first_line {
            debug!(
                "{} lines evicted before they were printed",
                snapshot.first_line - self.printed
            );
        }
        let start = self.printed.saturating_sub(snapshot.first_line);
        match delta {
            // The document was emptied in place; what was above the cursor is gone
            ConsoleDelta::Cleared | ConsoleDelta::ResetAll => start.min(snapshot.cursor.0),
            _ => start,
        }
    }
}
