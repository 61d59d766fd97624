mod cause;
mod error;
mod transform;
mod valid;

pub use cause::*;
pub use error::*;
pub use transform::*;
pub use valid::*;
