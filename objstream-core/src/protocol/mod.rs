//! Wire-level constants of the object stream protocol.

pub mod constants;

pub use constants::*;
