//! Integration test crate for the Blackmagic RAW reader.
//!
//! This crate exists solely to hold cross-crate integration tests. They
//! drive the reader through the stub codec backend.

#[cfg(test)]
mod support;

#[cfg(test)]
mod decode_chain;

#[cfg(test)]
mod clip_state;
