//! Console document model
//!
//! Owns the ordered lines, the cursor, the active style and the embedded
//! parser. Each `write` feeds one chunk through the parser and reports what
//! changed as a [`ConsoleDelta`].

use std::sync::Arc;

use super::line::ConsoleLine;
use super::parser::{AnsiParser, AnsiSink, Control};
use super::style::{AnsiColor, SpanStyle, StreamKind};
use crate::config::TabSettings;

/// Highest column a cursor movement can address. Printed text may still run
/// past it; only the padding a cursor jump would force is bounded.
pub const MAX_COLUMN: usize = 16_384;

/// What changed after one `write` or `clear`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleDelta {
    /// Nothing visible changed
    None,
    /// Lines `from..=to` need to be redrawn
    LinesChanged { from: usize, to: usize },
    /// The document was cleared
    Cleared,
    /// Reserved, not produced by the model
    AppendedLines { from: usize, count: usize },
    /// Lines were removed or shifted; redraw everything
    ResetAll,
}

/// Console model: document state plus the parser feeding it
pub struct ConsoleModel {
    parser: AnsiParser,
    doc: Document,
}

impl ConsoleModel {
    pub fn new(max_lines: usize, tabs: Arc<dyn TabSettings>) -> Self {
        Self {
            parser: AnsiParser::new(),
            doc: Document::new(max_lines.max(1), tabs),
        }
    }

    /// Feed a chunk of process output
    pub fn write(&mut self, chunk: &str, stream: StreamKind) -> ConsoleDelta {
        self.doc.switch_stream(stream);
        self.parser.feed_str(chunk, &mut self.doc);
        self.doc.enforce_max_lines();
        self.doc.damage.take()
    }

    /// Reset to a single empty line with the cursor at the origin
    pub fn clear(&mut self) -> ConsoleDelta {
        self.parser.reset();
        self.doc.reset_document();
        self.doc.damage = Damage::default();
        ConsoleDelta::Cleared
    }

    pub fn lines(&self) -> &[ConsoleLine] {
        &self.doc.lines
    }

    pub fn line(&self, index: usize) -> Option<&ConsoleLine> {
        self.doc.lines.get(index)
    }

    pub fn line_count(&self) -> usize {
        self.doc.lines.len()
    }

    /// Cursor as `(line, column)`, both 0-based
    pub fn cursor(&self) -> (usize, usize) {
        (self.doc.cursor_line, self.doc.cursor_column)
    }

    pub fn current_style(&self) -> SpanStyle {
        self.doc.current_style
    }

    pub fn current_stream(&self) -> StreamKind {
        self.doc.current_stream
    }

    pub fn max_lines(&self) -> usize {
        self.doc.max_lines
    }

    /// Total lines dropped off the top by the scrollback cap since creation.
    /// Adding it to an index in `lines()` gives a stable line number.
    pub fn evicted_lines(&self) -> usize {
        self.doc.evicted
    }

    /// Whether the cursor line received output since the last line feed
    pub fn is_mid_line(&self) -> bool {
        self.doc.mid_line
    }

    /// Plain text of the whole document, lines joined with `\n`
    pub fn text(&self) -> String {
        self.doc
            .lines
            .iter()
            .map(ConsoleLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lines touched during the current write
#[derive(Default)]
struct Damage {
    range: Option<(usize, usize)>,
    reset: bool,
}

impl Damage {
    fn mark(&mut self, line: usize) {
        self.range = Some(match self.range {
            Some((from, to)) => (from.min(line), to.max(line)),
            None => (line, line),
        });
    }

    fn take(&mut self) -> ConsoleDelta {
        let delta = if self.reset {
            ConsoleDelta::ResetAll
        } else if let Some((from, to)) = self.range {
            ConsoleDelta::LinesChanged { from, to }
        } else {
            ConsoleDelta::None
        };
        *self = Damage::default();
        delta
    }
}

/// Document state; receives parser events
struct Document {
    lines: Vec<ConsoleLine>,
    max_lines: usize,
    cursor_line: usize,
    cursor_column: usize,
    current_style: SpanStyle,
    current_stream: StreamKind,
    saved_cursor: Option<(usize, usize)>,
    mid_line: bool,
    evicted: usize,
    tabs: Arc<dyn TabSettings>,
    damage: Damage,
}

impl Document {
    fn new(max_lines: usize, tabs: Arc<dyn TabSettings>) -> Self {
        Self {
            lines: vec![ConsoleLine::new()],
            max_lines,
            cursor_line: 0,
            cursor_column: 0,
            current_style: SpanStyle::default(),
            current_stream: StreamKind::Stdout,
            saved_cursor: None,
            mid_line: false,
            evicted: 0,
            tabs,
            damage: Damage::default(),
        }
    }

    fn reset_document(&mut self) {
        self.lines.clear();
        self.lines.push(ConsoleLine::new());
        self.cursor_line = 0;
        self.cursor_column = 0;
        self.mid_line = false;
    }

    fn switch_stream(&mut self, stream: StreamKind) {
        if stream != self.current_stream {
            tracing::debug!("Stream switch: {:?} -> {:?}", self.current_stream, stream);
            self.current_stream = stream;
            self.current_style = SpanStyle::default_for(stream);
        }
    }

    fn last_line(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// Make sure line `index` exists, padding with blank lines
    fn ensure_line(&mut self, index: usize) {
        while self.lines.len() <= index {
            self.lines.push(ConsoleLine::new());
            self.damage.mark(self.lines.len() - 1);
        }
    }

    /// Write one character at the cursor and advance
    fn put_char(&mut self, ch: char) {
        let row = self.cursor_line;
        self.ensure_line(row);
        self.lines[row].overwrite_char_at(self.cursor_column, ch, self.current_style);
        self.damage.mark(row);
        self.cursor_column += 1;
        self.mid_line = true;
    }

    fn linefeed(&mut self) {
        self.cursor_line += 1;
        self.cursor_column = 0;
        self.mid_line = false;
        self.ensure_line(self.cursor_line);
    }

    /// Literal tab, or spaces up to the next tab stop
    fn horizontal_tab(&mut self) {
        if self.tabs.use_spaces_for_tabs() {
            let width = self.tabs.spaces_per_tab().max(1);
            let count = width - self.cursor_column % width;
            for _ in 0..count {
                self.put_char(' ');
            }
        } else {
            self.put_char('\t');
        }
    }

    fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor_line, self.cursor_column));
    }

    fn restore_cursor(&mut self) {
        if let Some((line, column)) = self.saved_cursor {
            self.cursor_line = line;
            self.cursor_column = column;
        }
    }

    /// Erase in line
    fn erase_in_line(&mut self, mode: u32) {
        let row = self.cursor_line;
        let column = self.cursor_column;
        let Some(line) = self.lines.get_mut(row) else {
            return;
        };

        match mode {
            0 => {
                // From cursor to end of line
                if line.len() > column {
                    line.truncate(column);
                    self.damage.mark(row);
                }
            }
            1 => {
                // From start to cursor, inclusive
                if !line.is_empty() {
                    line.blank_range(0, column + 1);
                    self.damage.mark(row);
                }
            }
            2 => {
                // Entire line. Also homes the column, unlike VT terminals.
                if !line.is_empty() {
                    line.truncate(0);
                    self.damage.mark(row);
                }
                self.cursor_column = 0;
            }
            _ => {}
        }
    }

    /// Erase in display
    fn erase_in_display(&mut self, mode: u32) {
        let row = self.cursor_line;
        match mode {
            0 => {
                // From cursor to end of document
                self.erase_in_line(0);
                if self.lines.len() > row + 1 {
                    self.lines.truncate(row + 1);
                    self.damage.reset = true;
                }
            }
            1 => {
                // From start of document to cursor
                let end = row.min(self.lines.len());
                for index in 0..end {
                    if !self.lines[index].is_empty() {
                        self.lines[index].truncate(0);
                        self.damage.mark(index);
                    }
                }
                self.erase_in_line(1);
            }
            2 => {
                self.reset_document();
                self.damage.reset = true;
            }
            _ => {}
        }
    }

    fn select_graphic_rendition(&mut self, params: &[u32]) {
        let mut i = 0;
        while i < params.len() {
            let code = params[i];
            let style = self.current_style;
            self.current_style = match code {
                0 => SpanStyle::default_for(self.current_stream),
                1 => style.with_bold(true),
                22 => style.with_bold(false),
                3 => style.with_italic(true),
                23 => style.with_italic(false),
                4 => style.with_underline(true),
                24 => style.with_underline(false),
                9 => style.with_strikethrough(true),
                29 => style.with_strikethrough(false),

                // Foreground colors (standard, bright)
                30..=37 => style.with_fg(AnsiColor::Indexed((code - 30) as u8)),
                90..=97 => style.with_fg(AnsiColor::Indexed((code - 90 + 8) as u8)),
                39 => style.with_fg(AnsiColor::DEFAULT_FG),

                // Background colors (standard, bright)
                40..=47 => style.with_bg(AnsiColor::Indexed((code - 40) as u8)),
                100..=107 => style.with_bg(AnsiColor::Indexed((code - 100 + 8) as u8)),
                49 => style.with_bg(AnsiColor::DEFAULT_BG),

                // Extended colors: 5;n or 2;r;g;b
                38 | 48 => {
                    let (color, consumed) = extended_color(&params[i + 1..]);
                    i += consumed;
                    match color {
                        Some(color) if code == 38 => style.with_fg(color),
                        Some(color) => style.with_bg(color),
                        None => style,
                    }
                }

                _ => style,
            };
            i += 1;
        }
    }

    /// Drop the oldest lines beyond `max_lines`, shifting the cursor with them
    fn enforce_max_lines(&mut self) {
        let excess = self.lines.len().saturating_sub(self.max_lines);
        if excess == 0 {
            return;
        }
        self.lines.drain(..excess);
        self.evicted += excess;
        let shift = |(line, column): (usize, usize)| {
            if line >= excess {
                (line - excess, column)
            } else {
                (0, 0)
            }
        };
        (self.cursor_line, self.cursor_column) = shift((self.cursor_line, self.cursor_column));
        self.saved_cursor = self.saved_cursor.map(shift);
        self.damage.reset = true;
        tracing::trace!("Evicted {} scrollback lines", excess);
    }
}

/// Parse the sub-parameters after 38/48. Returns the color, if any, and how
/// many parameters were consumed.
fn extended_color(rest: &[u32]) -> (Option<AnsiColor>, usize) {
    let (color, consumed) = match rest {
        [5, index, ..] => (AnsiColor::indexed(*index), 2),
        [2, r, g, b, ..] => (AnsiColor::rgb(*r, *g, *b), 4),
        // Truncated sequence: swallow what is left
        [5 | 2, partial @ ..] => return (None, 1 + partial.len()),
        [_, ..] => return (None, 1),
        [] => return (None, 0),
    };
    match color {
        Ok(color) => (Some(color), consumed),
        Err(e) => {
            tracing::debug!("Ignoring extended color: {}", e);
            (None, consumed)
        }
    }
}

impl AnsiSink for Document {
    fn print(&mut self, ch: char) {
        self.put_char(ch);
    }

    fn control(&mut self, control: Control) {
        match control {
            Control::LineFeed => self.linefeed(),
            Control::CarriageReturn => self.cursor_column = 0,
            Control::Backspace => self.cursor_column = self.cursor_column.saturating_sub(1),
            Control::Tab => self.horizontal_tab(),
            Control::SaveCursor => self.save_cursor(),
            Control::RestoreCursor => self.restore_cursor(),
        }
    }

    fn csi(&mut self, params: &[u32], final_byte: char) {
        let first = params.first().copied().unwrap_or(0);
        let count = first.max(1) as usize;

        match final_byte {
            'm' => self.select_graphic_rendition(params),
            'K' => self.erase_in_line(first),
            'J' => self.erase_in_display(first),

            // Cursor movement
            'A' => self.cursor_line = self.cursor_line.saturating_sub(count),
            'B' => {
                // A restored cursor may sit past the last line; never move it up
                let limit = self.last_line().max(self.cursor_line);
                self.cursor_line = self.cursor_line.saturating_add(count).min(limit);
            }
            'C' => self.cursor_column = self.cursor_column.saturating_add(count).min(MAX_COLUMN),
            'D' => self.cursor_column = self.cursor_column.saturating_sub(count),
            'G' => self.cursor_column = (first as usize).saturating_sub(1).min(MAX_COLUMN),
            'H' | 'f' => {
                let row = params.first().copied().unwrap_or(1) as usize;
                let col = params.get(1).copied().unwrap_or(1) as usize;
                self.cursor_line = row.saturating_sub(1).min(self.last_line());
                self.cursor_column = col.saturating_sub(1).min(MAX_COLUMN);
            }

            's' => self.save_cursor(),
            'u' => self.restore_cursor(),

            _ => {
                tracing::debug!("Unknown CSI: params={:?}, final={:?}", params, final_byte);
            }
        }
    }
}
