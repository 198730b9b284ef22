//! Console lines and their style spans
//!
//! A line stores its characters plus a sorted list of non-overlapping spans.
//! Text in the default style has no span, so memory grows with the number of
//! style transitions rather than with line length.

use std::ops::Range;

use super::style::{SpanStyle, StyleError};

/// A styled range `[start, end)` of a line, in character columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    start: usize,
    end: usize,
    style: SpanStyle,
}

impl Span {
    pub fn new(start: usize, end: usize, style: SpanStyle) -> Result<Self, StyleError> {
        if start > end {
            return Err(StyleError::InvertedSpan { start, end });
        }
        Ok(Self { start, end, style })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn style(&self) -> SpanStyle {
        self.style
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, column: usize) -> bool {
        self.start <= column && column < self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One visual row of console output
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsoleLine {
    chars: Vec<char>,
    spans: Vec<Span>,
}

impl ConsoleLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line holding `text` in a single style
    pub fn with_text(text: &str, style: SpanStyle) -> Self {
        let mut line = Self::new();
        line.append_text(text, style);
        line
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn char_at(&self, column: usize) -> Option<char> {
        self.chars.get(column).copied()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Style of the character at `column`; default when unstyled or out of range
    pub fn style_at(&self, column: usize) -> SpanStyle {
        self.span_index_at(column)
            .map(|i| self.spans[i].style)
            .unwrap_or_default()
    }

    /// The whole line as consecutive style runs, default runs included
    pub fn runs(&self) -> Vec<(Range<usize>, SpanStyle)> {
        let mut runs = Vec::with_capacity(self.spans.len() * 2 + 1);
        let mut pos = 0;
        for span in &self.spans {
            if span.start > pos {
                runs.push((pos..span.start, SpanStyle::default()));
            }
            runs.push((span.range(), span.style));
            pos = span.end;
        }
        if pos < self.chars.len() {
            runs.push((pos..self.chars.len(), SpanStyle::default()));
        }
        runs
    }

    pub fn append_char(&mut self, ch: char, style: SpanStyle) {
        let start = self.chars.len();
        self.chars.push(ch);
        self.push_span(start, start + 1, style);
    }

    pub fn append_text(&mut self, text: &str, style: SpanStyle) {
        let start = self.chars.len();
        self.chars.extend(text.chars());
        let end = self.chars.len();
        if end > start {
            self.push_span(start, end, style);
        }
    }

    /// Replace the character at `column`, padding with default-style spaces
    /// when the column lies past the end of the line.
    pub fn overwrite_char_at(&mut self, column: usize, ch: char, style: SpanStyle) {
        if column >= self.chars.len() {
            self.chars.resize(column, ' ');
            self.append_char(ch, style);
            return;
        }
        self.chars[column] = ch;
        self.set_style_at(column, style);
    }

    /// Restyle a single existing column, splitting and re-merging spans.
    pub fn set_style_at(&mut self, column: usize, style: SpanStyle) {
        if column >= self.chars.len() {
            return;
        }

        match self.span_index_at(column) {
            Some(i) => {
                let old = self.spans[i];
                if old.style == style {
                    return;
                }
                let mut parts = Vec::with_capacity(3);
                if old.start < column {
                    parts.push(Span { start: old.start, end: column, style: old.style });
                }
                let middle = i + parts.len();
                if !style.is_default() {
                    parts.push(Span { start: column, end: column + 1, style });
                }
                if column + 1 < old.end {
                    parts.push(Span { start: column + 1, end: old.end, style: old.style });
                }
                let styled = !style.is_default();
                self.spans.splice(i..=i, parts);
                if styled {
                    self.coalesce_at(middle);
                }
            }
            None => {
                if style.is_default() {
                    return;
                }
                let at = self.spans.partition_point(|s| s.end <= column);
                self.spans.insert(at, Span { start: column, end: column + 1, style });
                self.coalesce_at(at);
            }
        }
    }

    /// Overwrite `[start, end)` with default-style spaces, clipped to the line.
    pub fn blank_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.chars.len());
        for column in start..end {
            self.chars[column] = ' ';
            self.set_style_at(column, SpanStyle::default());
        }
    }

    /// Drop everything from `new_len` on.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len >= self.chars.len() {
            return;
        }
        self.chars.truncate(new_len);
        self.spans.retain(|s| s.start < new_len);
        if let Some(last) = self.spans.last_mut() {
            last.end = last.end.min(new_len);
        }
    }

    fn span_index_at(&self, column: usize) -> Option<usize> {
        let i = self.spans.partition_point(|s| s.end <= column);
        self.spans.get(i).filter(|s| s.contains(column)).map(|_| i)
    }

    /// Add a styled range at the tail of the span list.
    fn push_span(&mut self, start: usize, end: usize, style: SpanStyle) {
        if style.is_default() {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if last.end == start && last.style == style {
                last.end = end;
                return;
            }
        }
        self.spans.push(Span { start, end, style });
    }

    /// Merge span `i` with equal-style neighbours that touch it.
    fn coalesce_at(&mut self, i: usize) {
        if i + 1 < self.spans.len() {
            let next = self.spans[i + 1];
            if self.spans[i].end == next.start && self.spans[i].style == next.style {
                self.spans[i].end = next.end;
                self.spans.remove(i + 1);
            }
        }
        if i > 0 {
            let current = self.spans[i];
            let prev = &mut self.spans[i - 1];
            if prev.end == current.start && prev.style == current.style {
                prev.end = current.end;
                self.spans.remove(i);
            }
        }
    }

    /// Sorted, non-empty, non-overlapping, in bounds, coalesced, no default spans
    #[cfg(test)]
    pub(crate) fn spans_are_canonical(&self) -> bool {
        let in_bounds = self
            .spans
            .iter()
            .all(|s| s.start < s.end && s.end <= self.chars.len() && !s.style.is_default());
        let ordered = self.spans.windows(2).all(|w| {
            w[0].end <= w[1].start && !(w[0].end == w[1].start && w[0].style == w[1].style)
        });
        in_bounds && ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::style::{AnsiColor, StreamKind};

    fn red() -> SpanStyle {
        SpanStyle::default().with_fg(AnsiColor::Indexed(1))
    }

    fn bold() -> SpanStyle {
        SpanStyle::default().with_bold(true)
    }

    #[test]
    fn test_span_rejects_inverted_range() {
        assert!(Span::new(2, 2, red()).is_ok());
        assert_eq!(
            Span::new(3, 2, red()),
            Err(StyleError::InvertedSpan { start: 3, end: 2 })
        );
    }

    #[test]
    fn test_append_coalesces_and_skips_default() {
        let mut line = ConsoleLine::new();
        line.append_text("ab", red());
        line.append_char('c', red());
        line.append_text(" plain", SpanStyle::default());
        line.append_text("!", red());

        assert_eq!(line.text(), "abc plain!");
        assert_eq!(line.spans().len(), 2);
        assert_eq!(line.spans()[0].range(), 0..3);
        assert_eq!(line.spans()[1].range(), 9..10);
        assert!(line.spans_are_canonical());
    }

    #[test]
    fn test_overwrite_splits_span_in_three() {
        let mut line = ConsoleLine::with_text("hello", red());
        line.overwrite_char_at(2, 'L', bold());

        assert_eq!(line.text(), "heLlo");
        let ranges: Vec<_> = line.spans().iter().map(|s| (s.range(), s.style())).collect();
        assert_eq!(
            ranges,
            vec![(0..2, red()), (2..3, bold()), (3..5, red())]
        );
        assert!(line.spans_are_canonical());
    }

    #[test]
    fn test_overwrite_with_default_removes_styling() {
        let mut line = ConsoleLine::with_text("abc", red());
        line.overwrite_char_at(0, 'X', SpanStyle::default());
        line.overwrite_char_at(2, 'Z', SpanStyle::default());

        assert_eq!(line.text(), "XbZ");
        assert_eq!(line.spans().len(), 1);
        assert_eq!(line.spans()[0].range(), 1..2);
        assert_eq!(line.style_at(0), SpanStyle::default());
        assert_eq!(line.style_at(1), red());
    }

    #[test]
    fn test_uniform_overwrites_produce_one_span() {
        let mut line = ConsoleLine::with_text("..........", SpanStyle::default());
        // scattered order, same style everywhere in 2..8
        for column in [5, 2, 7, 3, 6, 4] {
            line.overwrite_char_at(column, '#', red());
            assert!(line.spans_are_canonical());
        }
        assert_eq!(line.spans().len(), 1);
        assert_eq!(line.spans()[0].range(), 2..8);
    }

    #[test]
    fn test_restyle_bridges_gap_between_spans() {
        let mut line = ConsoleLine::with_text("aa", red());
        line.append_text("b", bold());
        line.append_text("aa", red());
        line.set_style_at(2, red());

        assert_eq!(line.spans().len(), 1);
        assert_eq!(line.spans()[0].range(), 0..5);
    }

    #[test]
    fn test_overwrite_past_end_pads_with_default() {
        let mut line = ConsoleLine::with_text("hello", SpanStyle::default());
        line.overwrite_char_at(10, 'X', red());

        assert_eq!(line.text(), "hello     X");
        assert_eq!(line.len(), 11);
        assert_eq!(line.spans().len(), 1);
        assert_eq!(line.spans()[0].range(), 10..11);
        assert_eq!(line.style_at(7), SpanStyle::default());
    }

    #[test]
    fn test_truncate_shortens_straddling_span() {
        let mut line = ConsoleLine::with_text("ab", bold());
        line.append_text("cdef", red());
        line.append_text("gh", bold());
        line.truncate(4);

        assert_eq!(line.text(), "abcd");
        assert_eq!(line.spans().len(), 2);
        assert_eq!(line.spans()[1].range(), 2..4);
        assert!(line.spans_are_canonical());

        line.truncate(0);
        assert!(line.is_empty());
        assert!(line.spans().is_empty());
    }

    #[test]
    fn test_blank_range_clears_text_and_style() {
        let mut line = ConsoleLine::with_text("abcdef", red());
        line.blank_range(1, 3);

        assert_eq!(line.text(), "a  def");
        assert_eq!(line.spans().len(), 2);
        assert_eq!(line.spans()[0].range(), 0..1);
        assert_eq!(line.spans()[1].range(), 3..6);

        line.blank_range(4, 100);
        assert_eq!(line.text(), "a  d  ");
    }

    #[test]
    fn test_runs_include_default_gaps() {
        let stderr = SpanStyle::default_for(StreamKind::Stderr);
        let mut line = ConsoleLine::with_text("out ", SpanStyle::default());
        line.append_text("err", stderr);
        line.append_text(" out", SpanStyle::default());

        let runs = line.runs();
        assert_eq!(
            runs,
            vec![
                (0..4, SpanStyle::default()),
                (4..7, stderr),
                (7..11, SpanStyle::default()),
            ]
        );
    }
}
