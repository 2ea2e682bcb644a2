//! Adapters that deliver inbound commands to the lifecycle controller.

pub mod http;
pub mod udp;
