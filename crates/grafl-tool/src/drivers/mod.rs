//! Thin adapters exposing the engine to external fuzzing hosts.

mod blackbox;
mod libfuzzer;

pub use blackbox::BlackboxDriver;
pub use libfuzzer::LibFuzzerDriver;
