//! The remote node's external contract: block/log fetching and Merkle-tree membership checks.

mod client;
mod error;
pub mod http;
pub mod memory;

pub use client::{LogKind, NodeClient};
pub use error::NodeClientError;
pub use http::HttpNodeClient;
pub use memory::InMemoryNodeClient;
