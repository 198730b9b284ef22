pub mod renderer;
pub mod transcript;

pub use renderer::{DebugRenderer, Renderer};
pub use transcript::TranscriptPrinter;
