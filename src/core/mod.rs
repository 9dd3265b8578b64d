pub mod audio;
pub mod capture;
pub mod playback;
pub mod realtime;
pub mod tools;

// Re-export commonly used types for convenience
pub use audio::{AudioFrame, CaptureDevice, DeviceError, Direction, PlaybackDevice};
pub use capture::{CaptureConfig, CaptureHandle, CapturePipeline};
pub use playback::{ManualClock, PlaybackClock, PlaybackScheduler, ScheduledFrame, SystemClock};
pub use realtime::{
    AudioSender, ConnectionError, ErrorKind, RealtimeConfig, RealtimeError, RealtimeResult,
    RealtimeSession, SessionEvent, SessionState, TranscriptEntry, TranscriptRole,
};
pub use tools::{
    SharedDocument, ToolCall, ToolDefinition, ToolError, ToolHandler, ToolRegistry, ToolResult,
    document_tools,
};
