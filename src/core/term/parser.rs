//! ANSI escape sequence parser
//!
//! Classifies a character stream into printable characters, simple controls
//! and CSI commands. The parser keeps no document state; events go to an
//! [`AnsiSink`]. State survives between `feed` calls so a sequence may be
//! split across chunks.

/// Simple control events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    LineFeed,
    CarriageReturn,
    Backspace,
    Tab,
    /// ESC 7
    SaveCursor,
    /// ESC 8
    RestoreCursor,
}

/// Receiver of parser events
pub trait AnsiSink {
    fn print(&mut self, ch: char);
    fn control(&mut self, control: Control);
    fn csi(&mut self, params: &[u32], final_byte: char);
}

/// Parser state machine
#[derive(Debug, Default)]
pub struct AnsiParser {
    state: ParserState,
    params: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ParserState {
    #[default]
    Text,
    Escape,
    Csi,
}

impl AnsiParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Text,
            params: String::with_capacity(16),
        }
    }

    /// Drop any partial sequence and return to plain text
    pub fn reset(&mut self) {
        self.state = ParserState::Text;
        self.params.clear();
    }

    /// Feed a single character to the parser
    pub fn feed(&mut self, ch: char, sink: &mut impl AnsiSink) {
        match self.state {
            ParserState::Text => self.text(ch, sink),
            ParserState::Escape => self.escape(ch, sink),
            ParserState::Csi => self.csi(ch, sink),
        }
    }

    pub fn feed_str(&mut self, chunk: &str, sink: &mut impl AnsiSink) {
        for ch in chunk.chars() {
            self.feed(ch, sink);
        }
    }

    fn text(&mut self, ch: char, sink: &mut impl AnsiSink) {
        match ch {
            '\x1b' => self.state = ParserState::Escape,
            '\n' => sink.control(Control::LineFeed),
            '\r' => sink.control(Control::CarriageReturn),
            '\x08' => sink.control(Control::Backspace),
            '\t' => sink.control(Control::Tab),
            _ => sink.print(ch),
        }
    }

    fn escape(&mut self, ch: char, sink: &mut impl AnsiSink) {
        match ch {
            '[' => {
                self.state = ParserState::Csi;
                self.params.clear();
            }
            '7' => {
                sink.control(Control::SaveCursor);
                self.state = ParserState::Text;
            }
            '8' => {
                sink.control(Control::RestoreCursor);
                self.state = ParserState::Text;
            }
            _ => {
                tracing::trace!("Dropped unsupported escape: ESC {:?}", ch);
                self.state = ParserState::Text;
            }
        }
    }

    fn csi(&mut self, ch: char, sink: &mut impl AnsiSink) {
        match ch {
            '0'..='9' | ';' | '?' => self.params.push(ch),
            _ => {
                // Final byte
                let params = parse_params(&self.params);
                self.params.clear();
                self.state = ParserState::Text;
                sink.csi(&params, ch);
            }
        }
    }
}

/// Split `1;;x;42` into `[1, 0, 0, 42]`
fn parse_params(raw: &str) -> Vec<u32> {
    raw.split(';')
        .map(|field| field.parse::<u32>().unwrap_or(0))
        .collect()
}
