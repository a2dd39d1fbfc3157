//! Shared CLI presentation utilities.
//!
//! Format-only helpers; nothing here touches the gateway.

pub mod server_display;
pub mod tables;

pub use server_display::{display_server_info, status_label};
pub use tables::{format_optional, format_timestamp, print_separator, truncate_string};
