//! Conferencing server side of the extension boundary

pub mod engine;

pub use engine::{Admission, ConferenceEngine};
