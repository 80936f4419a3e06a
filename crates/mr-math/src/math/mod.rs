//! Core math modules.

pub mod beta;
pub mod descriptive;
pub mod gamma;
pub mod info;
pub mod stable;
