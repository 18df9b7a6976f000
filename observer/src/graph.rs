mod construction;
pub use construction::*;

pub mod dot;
