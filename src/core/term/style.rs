//! Style values attached to console text
//!
//! Colors, per-stream default styles and the immutable `SpanStyle` value that
//! spans carry. Every mutator returns a new value.

use bitflags::bitflags;
use thiserror::Error;

/// Validation failure for style and span values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StyleError {
    #[error("Palette index out of range: {0} (expected 0..=255)")]
    InvalidColorIndex(u32),

    #[error("RGB channel {channel} out of range: {value} (expected 0..=255)")]
    InvalidChannel { channel: char, value: u32 },

    #[error("Inverted span range: start {start} > end {end}")]
    InvertedSpan { start: usize, end: usize },
}

/// Origin stream of a piece of output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StreamKind {
    #[default]
    Stdout,
    Stderr,
    /// Messages produced by the host itself (exit codes, banners)
    System,
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnsiColor {
    Default { foreground: bool },
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl AnsiColor {
    pub const DEFAULT_FG: AnsiColor = AnsiColor::Default { foreground: true };
    pub const DEFAULT_BG: AnsiColor = AnsiColor::Default { foreground: false };

    /// Palette color from a raw SGR parameter
    pub fn indexed(index: u32) -> Result<Self, StyleError> {
        u8::try_from(index)
            .map(AnsiColor::Indexed)
            .map_err(|_| StyleError::InvalidColorIndex(index))
    }

    /// 24-bit color from raw SGR parameters
    pub fn rgb(r: u32, g: u32, b: u32) -> Result<Self, StyleError> {
        let channel = |channel: char, value: u32| {
            u8::try_from(value).map_err(|_| StyleError::InvalidChannel { channel, value })
        };
        Ok(AnsiColor::Rgb(channel('r', r)?, channel('g', g)?, channel('b', b)?))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, AnsiColor::Default { .. })
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StyleFlags: u8 {
        const BOLD          = 0b0000_0001;
        const ITALIC        = 0b0000_0010;
        const UNDERLINE     = 0b0000_0100;
        const STRIKETHROUGH = 0b0000_1000;
    }
}

/// Style of a run of characters
///
/// `SpanStyle::default()` is the plain stdout style. Text in that style is
/// never stored as a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanStyle {
    origin: StreamKind,
    flags: StyleFlags,
    fg: AnsiColor,
    bg: AnsiColor,
}

impl Default for SpanStyle {
    fn default() -> Self {
        Self::default_for(StreamKind::Stdout)
    }
}

impl SpanStyle {
    /// Canonical default style of a stream. System output is bold.
    pub const fn default_for(origin: StreamKind) -> Self {
        let flags = match origin {
            StreamKind::System => StyleFlags::BOLD,
            StreamKind::Stdout | StreamKind::Stderr => StyleFlags::empty(),
        };
        Self {
            origin,
            flags,
            fg: AnsiColor::DEFAULT_FG,
            bg: AnsiColor::DEFAULT_BG,
        }
    }

    pub fn origin(&self) -> StreamKind {
        self.origin
    }

    pub fn flags(&self) -> StyleFlags {
        self.flags
    }

    pub fn fg(&self) -> AnsiColor {
        self.fg
    }

    pub fn bg(&self) -> AnsiColor {
        self.bg
    }

    pub fn is_bold(&self) -> bool {
        self.flags.contains(StyleFlags::BOLD)
    }

    pub fn is_italic(&self) -> bool {
        self.flags.contains(StyleFlags::ITALIC)
    }

    pub fn is_underline(&self) -> bool {
        self.flags.contains(StyleFlags::UNDERLINE)
    }

    pub fn is_strikethrough(&self) -> bool {
        self.flags.contains(StyleFlags::STRIKETHROUGH)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_origin(self, origin: StreamKind) -> Self {
        Self { origin, ..self }
    }

    pub fn with_flag(self, flag: StyleFlags, on: bool) -> Self {
        let mut flags = self.flags;
        flags.set(flag, on);
        Self { flags, ..self }
    }

    pub fn with_bold(self, on: bool) -> Self {
        self.with_flag(StyleFlags::BOLD, on)
    }

    pub fn with_italic(self, on: bool) -> Self {
        self.with_flag(StyleFlags::ITALIC, on)
    }

    pub fn with_underline(self, on: bool) -> Self {
        self.with_flag(StyleFlags::UNDERLINE, on)
    }

    pub fn with_strikethrough(self, on: bool) -> Self {
        self.with_flag(StyleFlags::STRIKETHROUGH, on)
    }

    pub fn with_fg(self, fg: AnsiColor) -> Self {
        Self { fg, ..self }
    }

    pub fn with_bg(self, bg: AnsiColor) -> Self {
        Self { bg, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_validation() {
        assert_eq!(AnsiColor::indexed(196), Ok(AnsiColor::Indexed(196)));
        assert_eq!(
            AnsiColor::indexed(256),
            Err(StyleError::InvalidColorIndex(256))
        );
        assert_eq!(AnsiColor::rgb(1, 2, 3), Ok(AnsiColor::Rgb(1, 2, 3)));
        assert_eq!(
            AnsiColor::rgb(0, 300, 0),
            Err(StyleError::InvalidChannel { channel: 'g', value: 300 })
        );
    }

    #[test]
    fn test_stream_defaults() {
        assert!(SpanStyle::default().is_default());
        assert!(!SpanStyle::default_for(StreamKind::Stdout).is_bold());
        assert!(!SpanStyle::default_for(StreamKind::Stderr).is_bold());
        assert!(SpanStyle::default_for(StreamKind::System).is_bold());
        // stderr text is distinguishable from stdout text
        assert!(!SpanStyle::default_for(StreamKind::Stderr).is_default());
    }

    #[test]
    fn test_functional_update() {
        let base = SpanStyle::default();
        let styled = base.with_bold(true).with_fg(AnsiColor::Indexed(1));
        assert!(base.is_default());
        assert!(styled.is_bold());
        assert_eq!(styled.fg(), AnsiColor::Indexed(1));
        assert_eq!(styled.with_bold(false).with_fg(AnsiColor::DEFAULT_FG), base);
    }
}
