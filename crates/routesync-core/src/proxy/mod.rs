//! Reverse-proxy reconciliation
//!
//! - [`render`]: turns the template and the source address list into a configuration file
//! - [`ProxyReconciler`]: makes the proxy process match the address list

pub mod reconciler;
pub mod render;

pub use reconciler::ProxyReconciler;
pub use render::{render_config, server_list, write_atomic};
