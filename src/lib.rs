//! Morse/CW signal-processing library: a receiver decoder and a
//! tone-queued generator sharing a common Morse table and timing model.

pub mod audio;
pub mod bridge;
pub mod error;
pub mod generator;
pub mod morse;
pub mod receiver;
pub mod synth;
pub mod timing;
pub mod tone_queue;
