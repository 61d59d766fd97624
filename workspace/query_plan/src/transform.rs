mod minify;

pub use minify::*;
