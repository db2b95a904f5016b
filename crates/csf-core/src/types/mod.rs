//! Core types used across the secured fields kit.

mod brand;
mod common;
mod field;
mod setup;
mod token;

pub use brand::*;
pub use common::*;
pub use field::*;
pub use setup::*;
pub use token::*;
