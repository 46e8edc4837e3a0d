//! logship transport
//!
//! HTTP implementation of the delivery contract: batched log posts and
//! heartbeats against the collection endpoint.

pub mod client;

pub use client::ApiClient;
