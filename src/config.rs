//! On-disk configuration store.
//!
//! Two TOML files under the user config directory, per §6: one global file
//! holding the ear-pause policy, and one per-peer file with one table per
//! MAC address (colons replaced with underscores in the table name).
//! Persistence itself is out of CORE scope, but the daemon cannot run
//! without *something* behind this interface, so it is implemented here in
//! the teacher's own TOML-on-disk idiom.

use std::{collections::HashMap, env, fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AapError, Result};

/// Global, not-per-peer preference.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GlobalConfig {
   #[serde(default)]
   pub ear_pause_mode: i32,
}

impl Default for GlobalConfig {
   fn default() -> Self {
      Self { ear_pause_mode: 0 }
   }
}

/// Saved per-peer preferences, read back on reconnect.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerProfile {
   #[serde(default)]
   pub display_name: String,
   #[serde(default)]
   pub listening_off: bool,
   #[serde(default)]
   pub listening_transparency: bool,
   #[serde(default)]
   pub listening_anc: bool,
   #[serde(default)]
   pub listening_adaptive: bool,
   #[serde(default)]
   pub conversational_awareness: bool,
   #[serde(default)]
   pub adaptive_level: u8,
   #[serde(default = "default_noise_control_mode")]
   pub noise_control_mode: String,
   #[serde(default)]
   pub has_saved_settings: bool,
}

fn default_noise_control_mode() -> String {
   "off".to_string()
}

impl Default for PeerProfile {
   fn default() -> Self {
      Self {
         display_name: String::new(),
         listening_off: true,
         listening_transparency: true,
         listening_anc: false,
         listening_adaptive: false,
         conversational_awareness: false,
         adaptive_level: 0,
         noise_control_mode: default_noise_control_mode(),
         has_saved_settings: false,
      }
   }
}

/// Config directory resolution: `AIRPODS_HOME` > `XDG_CONFIG_HOME` > `$HOME/.config`.
fn config_dir() -> Result<PathBuf> {
   let dir = if let Ok(home) = env::var("AIRPODS_HOME") {
      PathBuf::from(home)
   } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
      PathBuf::from(config_home).join("aapd")
   } else if let Ok(home) = env::var("HOME") {
      PathBuf::from(home).join(".config").join("aapd")
   } else {
      return Err(AapError::ConfigDirNotFound);
   };
   Ok(dir)
}

fn global_config_path() -> Result<PathBuf> {
   Ok(config_dir()?.join("config.toml"))
}

fn peers_config_path() -> Result<PathBuf> {
   Ok(config_dir()?.join("peers.toml"))
}

/// Replaces `:` with `_` in a MAC address to produce a valid TOML table
/// name, per §6.
pub fn table_name(address: &str) -> String {
   address.replace(':', "_")
}

/// Loads the global preference file, creating it with defaults if absent.
/// Failure to read or write is non-fatal: defaults take over and the error
/// is only logged by the caller.
pub fn load_global() -> Result<GlobalConfig> {
   let path = global_config_path()?;
   if path.exists() {
      let contents = fs::read_to_string(&path)?;
      Ok(toml::from_str(&contents)?)
   } else {
      let config = GlobalConfig::default();
      save_global(&config)?;
      Ok(config)
   }
}

pub fn save_global(config: &GlobalConfig) -> Result<()> {
   let path = global_config_path()?;
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   fs::write(&path, toml::to_string_pretty(config)?)?;
   Ok(())
}

/// All per-peer profiles, keyed by MAC-derived table name.
pub fn load_peers() -> Result<HashMap<String, PeerProfile>> {
   let path = peers_config_path()?;
   if path.exists() {
      let contents = fs::read_to_string(&path)?;
      Ok(toml::from_str(&contents)?)
   } else {
      Ok(HashMap::new())
   }
}

pub fn save_peers(peers: &HashMap<String, PeerProfile>) -> Result<()> {
   let path = peers_config_path()?;
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   fs::write(&path, toml::to_string_pretty(peers)?)?;
   Ok(())
}

/// Loads the single profile for one peer, if any has been saved.
pub fn load_peer(address: &str) -> Result<Option<PeerProfile>> {
   Ok(load_peers()?.remove(&table_name(address)))
}

/// Persists (inserts or replaces) the profile for one peer.
pub fn save_peer(address: &str, profile: PeerProfile) -> Result<()> {
   let mut peers = load_peers()?;
   peers.insert(table_name(address), profile);
   save_peers(&peers)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn table_name_replaces_colons() {
      assert_eq!(table_name("AA:BB:CC:DD:EE:FF"), "AA_BB_CC_DD_EE_FF");
   }

   #[test]
   fn peer_round_trip() {
      let dir = tempfile::tempdir().unwrap();
      unsafe {
         env::set_var("AIRPODS_HOME", dir.path());
      }

      let mut profile = PeerProfile::default();
      profile.display_name = "Jordan's AirPods".into();
      profile.has_saved_settings = true;
      save_peer("AA:BB:CC:DD:EE:FF", profile).unwrap();

      let loaded = load_peer("AA:BB:CC:DD:EE:FF").unwrap().expect("profile present");
      assert_eq!(loaded.display_name, "Jordan's AirPods");
      assert!(loaded.has_saved_settings);

      unsafe {
         env::remove_var("AIRPODS_HOME");
      }
   }

   #[test]
   fn global_config_defaults_on_first_load() {
      let dir = tempfile::tempdir().unwrap();
      unsafe {
         env::set_var("AIRPODS_HOME", dir.path());
      }
      let config = load_global().unwrap();
      assert_eq!(config.ear_pause_mode, 0);
      unsafe {
         env::remove_var("AIRPODS_HOME");
      }
   }
}
