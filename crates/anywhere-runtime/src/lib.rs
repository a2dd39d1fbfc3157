#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod bridge;
pub mod container;
pub mod discovery;
pub mod docker;

pub use bridge::{BridgeError, EventLoopBridge, LoopHandle, MainLoop};
pub use container::{ContainerError, ContainerManager, ContainerNaming, StartedContainer};
pub use discovery::StdioDiscovery;
pub use docker::DockerCli;
