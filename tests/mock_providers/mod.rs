//! Mock servers for integration tests.
//!
//! The realtime mock speaks enough of the OpenAI Realtime protocol to drive a
//! session end to end: it acknowledges `session.update`, records every client
//! event, and lets a test push arbitrary server events.

#![allow(dead_code)]

pub mod realtime_mock;

pub use realtime_mock::{MockBehavior, MockRealtimeServer};
