//! Text-to-speech seam and text chunking.
//!
//! # Module layout
//!
//! | Module      | Responsibility                                           |
//! |-------------|----------------------------------------------------------|
//! | [`engine`]  | `TextToSpeech` trait, lifecycle events, `LogSpeech`      |
//! | [`chunker`] | Word/character-bounded chunking with resume positions    |

pub mod chunker;
pub mod engine;

pub use chunker::SpeechChunker;
pub use engine::{
    LogSpeech, SpeechError, SpeechEvent, SpeechEventReceiver, SpeechEventSender, TextToSpeech,
};

#[cfg(test)]
pub use engine::MockSpeech;
