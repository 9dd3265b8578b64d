//! Callback-style consumption of session events.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::realtime::{ConnectionError, SessionEvent, SessionState, TranscriptEntry};
use crate::core::tools::ToolResult;

/// Receives conversation events. Every method defaults to doing nothing.
pub trait ConversationObserver: Send + 'static {
    fn on_connection_state_changed(&mut self, _state: SessionState) {}

    /// Interim and final transcript entries for both roles.
    fn on_transcript(&mut self, _entry: &TranscriptEntry) {}

    fn on_error(&mut self, _error: &ConnectionError) {}

    fn on_tool_invoked(&mut self, _name: &str, _arguments: &Value, _result: &ToolResult) {}

    fn on_speech_started(&mut self) {}

    fn on_speech_stopped(&mut self) {}

    fn on_response_done(&mut self, _status: Option<&str>) {}
}

/// Route one event to the matching observer method.
pub fn dispatch_event<O: ConversationObserver + ?Sized>(observer: &mut O, event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionStateChanged(state) => observer.on_connection_state_changed(*state),
        SessionEvent::Transcript(entry) => observer.on_transcript(entry),
        SessionEvent::Error(error) => observer.on_error(error),
        SessionEvent::ToolInvoked {
            name,
            arguments,
            result,
        } => observer.on_tool_invoked(name, arguments, result),
        SessionEvent::SpeechStarted => observer.on_speech_started(),
        SessionEvent::SpeechStopped => observer.on_speech_stopped(),
        SessionEvent::ResponseDone { status } => observer.on_response_done(status.as_deref()),
    }
}

/// Drive `observer` until the event stream ends, then hand it back.
pub fn spawn_observer<O: ConversationObserver>(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut observer: O,
) -> JoinHandle<O> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatch_event(&mut observer, &event);
        }
        observer
    })
}
