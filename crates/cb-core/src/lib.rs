//! cerberus/crates/cb-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Cerberus.

pub mod error;
pub mod fitter;
pub mod models;
pub mod topics;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use topics::RecentTopics;
pub use traits::*;
