//! Application layer - Use case services.
//!
//! Services are thin orchestrators that:
//! - Accept domain types as inputs
//! - Use ports (traits) for external dependencies
//! - Return domain types as outputs

mod node_ssh;

pub use node_ssh::{run_session, NodeSshService, PreparedSession};
