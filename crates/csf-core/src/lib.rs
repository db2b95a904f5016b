//! Card secured fields core library.
//!
//! This library provides the wire contract and shared types exchanged between a host
//! document and the isolated frames that collect card data.

pub mod errors;
pub mod types;
pub mod wire;
