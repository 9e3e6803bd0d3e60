//! Core types and utilities for dock-relay.
//!
//! This crate provides the foundational types shared by the dock-relay crates:
//!
//! - **Host addresses**: [`HostAddr`], the `ip:port` key every listener, watermark
//!   and enriched event is addressed by
//! - **Org derivation**: [`org_from_node_name`] for cluster node names
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use dock_relay_core::{org_from_node_name, HostAddr};
//!
//! let host = HostAddr::parse("10.4.132.87:4242").unwrap();
//! assert_eq!(host.ip(), "10.4.132.87");
//! assert_eq!(host.port(), 4242);
//! assert_eq!(host.to_url(), "http://10.4.132.87:4242");
//!
//! assert_eq!(org_from_node_name("ip-10-4-132-87.123123123"), Some("123123123"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod host;

pub use error::{CoreError, Result};
pub use host::{org_from_node_name, HostAddr};
