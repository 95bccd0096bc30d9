pub mod gemini;
pub mod notion;
