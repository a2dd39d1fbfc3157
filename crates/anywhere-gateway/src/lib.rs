#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod blocking;
pub mod error;
pub mod locks;
pub mod service;

pub use blocking::BlockingGateway;
pub use error::GatewayError;
pub use locks::ServerLocks;
pub use service::{GatewayService, ServerInfo, ServerStartResult, StartReport};
