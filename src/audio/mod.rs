//! # Audio Module
//!
//! The producer side of the pipeline: chunk data model, the shared voice
//! buffer, and the per-session activity counters that drive the flush
//! decision.
//!
//! ## Components:
//! - **chunk**: `SessionKey` and the immutable `AudioChunk` arrival unit
//! - **buffer**: shared chunk store with global-cap eviction
//! - **activity**: per-session flush heuristic (count + time thresholds)

pub mod activity;
pub mod buffer;
pub mod chunk;

pub use activity::ActivityTracker;
pub use buffer::VoiceBuffer;
pub use chunk::{AudioChunk, SessionKey};
