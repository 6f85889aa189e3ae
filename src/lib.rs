#![deny(missing_docs)]

//! Core library for the mnemo memory tool server.

/// Lazy construction of the memory component bundle.
pub mod adapter;
/// Adapter options, transport selection, and environment overrides.
pub mod config;
/// Memory collaborators: block store, short-term store, cache, prompt composer, temporal reasoner.
pub mod engine;
/// Structured logging and tracing setup.
pub mod logging;
/// Dispatch counters.
pub mod metrics;
/// Transport server and request dispatch.
pub mod server;
/// Tool providers and the registry.
pub mod tools;
