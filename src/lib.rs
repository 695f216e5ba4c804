pub mod algorithms;
pub mod client;
pub mod config;
pub mod control_server;
pub mod error;
pub mod liveness;
pub mod network;
pub mod persist;
pub mod protocol;
pub mod router;
pub mod routing_table;

pub use error::{Error, Result};

pub type NodeId = u32;
pub type RouterName = String;
pub type ClientPort = u16;
