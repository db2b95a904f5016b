pub mod aggregator;
pub mod channel;
pub mod concepts;
pub mod config;
pub mod controller;
pub mod events;
pub mod keys;
pub mod registry;
pub mod setup;

#[cfg(feature = "key-client")]
pub mod key_client;
