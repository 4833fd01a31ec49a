pub mod interpolate;
pub mod solar;
pub mod wind;

pub use interpolate::*;
pub use solar::*;
pub use wind::*;
