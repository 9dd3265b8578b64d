pub mod config;
pub mod core;
pub mod session;

// Re-export commonly used items for convenience
pub use config::{ConfigError, EngineConfig};
pub use self::core::*;
pub use session::{ConversationObserver, VoiceSession, VoiceSessionBuilder, spawn_observer};
