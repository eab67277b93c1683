//! The debate workflow engine.
//!
//! A moderator triages the question, an expert drafts and refines an answer,
//! a critic scores it, looping until a termination condition is met. The
//! fixed four-phase cycle is an explicit state machine in
//! [`engine::DebateEngine`]; no generic graph runtime.

pub mod compress;
pub mod engine;
pub mod events;
pub mod mode;
pub mod parse;
pub mod prompts;
pub mod state;
