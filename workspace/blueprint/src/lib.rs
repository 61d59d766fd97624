mod blueprint;
mod build;
mod index;

// Public API
pub mod error;
pub use blueprint::*;
pub use index::*;
