// src/hal/mod.rs
//! Hardware and bus abstraction for the exoskeleton experiment

pub mod traits;
pub mod types;
pub mod simulator;


pub use traits::*;
pub use types::*;
