//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the ports (traits)
//! that interact with external systems.

pub mod pipeline;

pub use pipeline::PipelineClient;
