//! Error taxonomy for the daemon.
//!
//! Mirrors §7: Parse errors are logged and dropped by the orchestrator,
//! never propagated as a hard failure; Transport errors trigger a
//! disconnect + reset; Command errors are reported to the bus caller as a
//! warning, not an exception; Bus-surface name loss is fatal only at
//! startup; Config I/O failures are non-fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AapError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus connection error: {0}")]
   DBusConnection(#[from] zbus::fdo::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("peer not connected")]
   NotConnected,

   #[error("connection lost")]
   ConnectionLost,

   #[error("connection closed")]
   ConnectionClosed,

   #[error("request timed out")]
   RequestTimeout,

   #[error("could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("invalid listening-modes bitmask: fewer than two bits set")]
   InvalidListeningModes,

   #[error("actor panicked: {0}")]
   ActorPanicked(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AapError>;
