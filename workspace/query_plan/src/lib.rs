mod builder;
mod config;
mod decompose;
mod fetch;
mod merge;
mod model;
mod operation;
mod plan;
mod planner;
mod transform;
mod tree;

pub mod error;

pub use builder::*;
pub use config::*;
pub use decompose::*;
pub use fetch::*;
pub use merge::*;
pub use model::{Argument, PathSegment, ResponsePath, SelectionNode, SelectionSet};
pub use operation::*;
pub use plan::*;
pub use planner::*;
pub use transform::*;
pub use tree::*;
