//! Apple Accessory Protocol codec.
//!
//! Pure, I/O-free: classifies and decodes inbound frames, and builds
//! outbound control frames. Nothing here owns a socket.

pub mod builder;
pub mod model;
pub mod parser;
pub mod protocol;
