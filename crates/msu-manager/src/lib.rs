pub mod config;
pub mod controller;
pub mod logging;
pub mod transport;
pub mod uplink;

#[cfg(test)]
pub(crate) mod test_utils;
