//! Console renderer using crossterm
//!
//! Paints styled console lines onto any writer, plus a plain-text debug dump.

use std::io::{self, Write};

use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal,
};
use unicode_width::UnicodeWidthChar;

use crate::core::term::{AnsiColor, ConsoleLine, SpanStyle, StreamKind};

/// Styled line renderer
pub struct Renderer {
    /// Foreground for stderr text that carries no explicit color
    stderr_color: Color,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            stderr_color: Color::Red,
        }
    }

    /// Get the host terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Queue one line without a trailing newline
    pub fn render_line<W: Write>(&self, out: &mut W, line: &ConsoleLine) -> io::Result<()> {
        let chars: Vec<char> = line.text().chars().collect();
        for (range, style) in line.runs() {
            let text: String = chars[range].iter().collect();
            if style.is_default() {
                queue!(out, Print(text))?;
                continue;
            }
            self.apply_style(out, &style)?;
            queue!(out, Print(text), SetAttribute(Attribute::Reset), ResetColor)?;
        }
        Ok(())
    }

    /// Render lines separated by CRLF and flush
    pub fn render_lines<W: Write>(&self, out: &mut W, lines: &[ConsoleLine]) -> io::Result<()> {
        for line in lines {
            self.render_line(out, line)?;
            queue!(out, Print("\r\n"))?;
        }
        out.flush()
    }

    fn apply_style<W: Write>(&self, out: &mut W, style: &SpanStyle) -> io::Result<()> {
        if style.is_bold() {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if style.is_italic() {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if style.is_underline() {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if style.is_strikethrough() {
            queue!(out, SetAttribute(Attribute::CrossedOut))?;
        }

        let fg = match (style.fg(), style.origin()) {
            (AnsiColor::Default { .. }, StreamKind::Stderr) => Some(self.stderr_color),
            (AnsiColor::Default { .. }, _) => None,
            (color, _) => Some(to_crossterm(color)),
        };
        if let Some(fg) = fg {
            queue!(out, SetForegroundColor(fg))?;
        }
        if !style.bg().is_default() {
            queue!(out, SetBackgroundColor(to_crossterm(style.bg())))?;
        }
        Ok(())
    }
}

/// Convert to crossterm color
fn to_crossterm(color: AnsiColor) -> Color {
    match color {
        AnsiColor::Default { .. } => Color::Reset,
        AnsiColor::Indexed(n) => Color::AnsiValue(n),
        AnsiColor::Rgb(r, g, b) => Color::Rgb { r, g, b },
    }
}

/// Debug renderer (text output)
pub struct DebugRenderer;

impl DebugRenderer {
    /// Render lines to a string, clipped to `width` display columns
    pub fn render(lines: &[ConsoleLine], cursor: (usize, usize), width: usize) -> String {
        let (cursor_line, cursor_col) = cursor;
        let mut output = String::new();

        output.push_str(&format!("=== Console {} lines ===\n", lines.len()));
        output.push_str(&format!("Cursor: ({}, {})\n", cursor_line, cursor_col));
        output.push_str("─".repeat(width).as_str());
        output.push('\n');

        for (row_idx, line) in lines.iter().enumerate() {
            // Row indicator
            output.push(if row_idx == cursor_line { '>' } else { ' ' });

            let mut used = 0;
            let mut col_idx = 0;
            while used < width {
                let ch = match line.char_at(col_idx) {
                    Some(_) if row_idx == cursor_line && col_idx == cursor_col => '█',
                    Some(ch) if ch.is_control() => ' ',
                    Some(ch) => ch,
                    None if row_idx == cursor_line && col_idx == cursor_col => '█',
                    None if col_idx < cursor_col && row_idx == cursor_line => ' ',
                    None => break,
                };
                let w = ch.width().unwrap_or(1);
                if used + w > width {
                    break;
                }
                output.push(ch);
                used += w;
                col_idx += 1;
            }

            output.push('\n');
        }

        output.push_str("─".repeat(width).as_str());
        output.push('\n');

        output
    }
}
