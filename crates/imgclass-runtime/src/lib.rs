//! Image classification on top of an exported model and its signature.

pub mod classifier;
pub mod prediction;
pub mod preprocess;
pub mod registry;

pub use classifier::*;
pub use prediction::*;
pub use preprocess::*;
pub use registry::*;
