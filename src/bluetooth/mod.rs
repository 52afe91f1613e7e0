//! Bluetooth transport layer.
//!
//! L2CAP socket management for the AAP control channel, and the BlueZ
//! device observer that drives connect/disconnect events from it.

pub mod l2cap;
pub mod observer;
