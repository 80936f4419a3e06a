//! Microregime math utilities.

pub mod math;

pub use math::beta::*;
pub use math::descriptive;
pub use math::gamma::*;
pub use math::info::*;
pub use math::stable::*;
