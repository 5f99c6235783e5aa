//! Entity models cached by the process.

pub mod voice;

pub use voice::{ChannelSettings, VOICE_COLLECTION, VoiceData, VoiceStatistics};
