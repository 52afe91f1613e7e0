//! Shared, mutex-guarded record of the currently associated peer.
//!
//! Per §4.5/§5, this is one `parking_lot::Mutex` with bounded critical
//! sections — wider-grained than the teacher's struct-of-atomics, because
//! several fields here (the three battery components, the four
//! listening-mode flags) must be read together as one consistent snapshot
//! by the bus surface, which a per-field atomic cannot guarantee. All
//! mutations go through the typed setters below; no callback runs while
//! the mutex is held.

use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::aap::{
   model::Model,
   protocol::{BatteryState, Component, NoiseControlMode},
};

/// Whether a setter actually changed observable state. The bus surface and
/// orchestrator use this to decide whether to emit a signal / PropertiesChanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
   Unchanged,
   Changed,
}

impl Update {
   pub const fn changed(self) -> bool {
      matches!(self, Self::Changed)
   }

   fn from_eq<T: PartialEq>(prev: &T, new: &T) -> Self {
      if prev == new { Self::Unchanged } else { Self::Changed }
   }
}

#[derive(Debug, Clone)]
struct Inner {
   connected: bool,
   address: SmolStr,
   name: SmolStr,
   display_name: SmolStr,
   model: Model,
   is_headphones: bool,
   supports_anc: bool,
   supports_adaptive: bool,

   battery_left: BatteryState,
   battery_right: BatteryState,
   battery_case: BatteryState,

   noise_control_mode: NoiseControlMode,
   conversational_awareness: bool,
   adaptive_level: u8,

   left_in_ear: bool,
   right_in_ear: bool,
   primary_left: bool,

   listening_off: bool,
   listening_transparency: bool,
   listening_anc: bool,
   listening_adaptive: bool,

   /// Global ear-pause policy. Not reset on peer disconnect — it is a
   /// standing preference, not session state.
   ear_pause_mode: i32,
}

impl Default for Inner {
   fn default() -> Self {
      Self {
         connected: false,
         address: SmolStr::default(),
         name: SmolStr::default(),
         display_name: SmolStr::default(),
         model: Model::Unknown,
         is_headphones: false,
         supports_anc: false,
         supports_adaptive: false,
         battery_left: BatteryState::UNKNOWN,
         battery_right: BatteryState::UNKNOWN,
         battery_case: BatteryState::UNKNOWN,
         noise_control_mode: NoiseControlMode::Off,
         conversational_awareness: false,
         adaptive_level: 0,
         left_in_ear: false,
         right_in_ear: false,
         primary_left: true,
         listening_off: true,
         listening_transparency: true,
         listening_anc: false,
         listening_adaptive: false,
         ear_pause_mode: 0,
      }
   }
}

/// A point-in-time copy of Device State, safe to hold across an await
/// point since it no longer borrows the mutex.
#[derive(Debug, Clone)]
pub struct Snapshot {
   pub connected: bool,
   pub address: SmolStr,
   pub name: SmolStr,
   pub display_name: SmolStr,
   pub model: Model,
   pub is_headphones: bool,
   pub supports_anc: bool,
   pub supports_adaptive: bool,
   pub battery_left: BatteryState,
   pub battery_right: BatteryState,
   pub battery_case: BatteryState,
   pub noise_control_mode: NoiseControlMode,
   pub conversational_awareness: bool,
   pub adaptive_level: u8,
   pub left_in_ear: bool,
   pub right_in_ear: bool,
   pub primary_left: bool,
   pub listening_off: bool,
   pub listening_transparency: bool,
   pub listening_anc: bool,
   pub listening_adaptive: bool,
   pub ear_pause_mode: i32,
}

/// Guarded device state. Cheap to construct, safe to share behind an `Arc`.
#[derive(Default)]
pub struct DeviceState(Mutex<Inner>);

impl DeviceState {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn snapshot(&self) -> Snapshot {
      let g = self.0.lock();
      Snapshot {
         connected: g.connected,
         address: g.address.clone(),
         name: g.name.clone(),
         display_name: g.display_name.clone(),
         model: g.model,
         is_headphones: g.is_headphones,
         supports_anc: g.supports_anc,
         supports_adaptive: g.supports_adaptive,
         battery_left: g.battery_left,
         battery_right: g.battery_right,
         battery_case: g.battery_case,
         noise_control_mode: g.noise_control_mode,
         conversational_awareness: g.conversational_awareness,
         adaptive_level: g.adaptive_level,
         left_in_ear: g.left_in_ear,
         right_in_ear: g.right_in_ear,
         primary_left: g.primary_left,
         listening_off: g.listening_off,
         listening_transparency: g.listening_transparency,
         listening_anc: g.listening_anc,
         listening_adaptive: g.listening_adaptive,
         ear_pause_mode: g.ear_pause_mode,
      }
   }

   pub fn set_connected(&self, connected: bool) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.connected, &connected);
      g.connected = connected;
      update
   }

   /// Sets peer identity on transport-connected. Model starts Unknown
   /// until a metadata frame resolves it.
   pub fn set_identity(&self, address: &str, name: &str) {
      let mut g = self.0.lock();
      g.address = address.into();
      g.name = name.into();
   }

   pub fn set_display_name(&self, display_name: &str) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.display_name.as_str(), &display_name);
      g.display_name = display_name.into();
      update
   }

   pub fn set_model(&self, model: Model, supports_anc: bool, supports_adaptive: bool, is_headphones: bool) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.model, &model);
      g.model = model;
      g.supports_anc = supports_anc;
      g.supports_adaptive = supports_adaptive;
      g.is_headphones = is_headphones;
      update
   }

   pub fn set_battery(&self, component: Component, state: BatteryState) -> Update {
      let mut g = self.0.lock();
      let slot = match component {
         Component::Single | Component::Left => &mut g.battery_left,
         Component::Right => &mut g.battery_right,
         Component::Case => &mut g.battery_case,
      };
      let update = Update::from_eq(slot, &state);
      *slot = state;
      update
   }

   pub fn battery_triple(&self) -> (i8, i8, i8) {
      let g = self.0.lock();
      (g.battery_left.level, g.battery_right.level, g.battery_case.level)
   }

   pub fn set_ear_detection(&self, left_in_ear: bool, right_in_ear: bool) -> Update {
      let mut g = self.0.lock();
      let update =
         if g.left_in_ear == left_in_ear && g.right_in_ear == right_in_ear { Update::Unchanged } else { Update::Changed };
      g.left_in_ear = left_in_ear;
      g.right_in_ear = right_in_ear;
      update
   }

   pub fn primary_left(&self) -> bool {
      self.0.lock().primary_left
   }

   pub fn set_noise_control_mode(&self, mode: NoiseControlMode) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.noise_control_mode, &mode);
      g.noise_control_mode = mode;
      update
   }

   pub fn set_conversational_awareness(&self, enabled: bool) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.conversational_awareness, &enabled);
      g.conversational_awareness = enabled;
      update
   }

   pub fn set_adaptive_level(&self, level: u8) -> Update {
      let level = level.min(100);
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.adaptive_level, &level);
      g.adaptive_level = level;
      update
   }

   pub fn set_listening_modes(&self, off: bool, transparency: bool, anc: bool, adaptive: bool) -> Update {
      let mut g = self.0.lock();
      let update = if g.listening_off == off
         && g.listening_transparency == transparency
         && g.listening_anc == anc
         && g.listening_adaptive == adaptive
      {
         Update::Unchanged
      } else {
         Update::Changed
      };
      g.listening_off = off;
      g.listening_transparency = transparency;
      g.listening_anc = anc;
      g.listening_adaptive = adaptive;
      update
   }

   pub fn set_ear_pause_mode(&self, mode: i32) -> Update {
      let mut g = self.0.lock();
      let update = Update::from_eq(&g.ear_pause_mode, &mode);
      g.ear_pause_mode = mode;
      update
   }

   /// Full reset on transport disconnect/error: identity cleared, every
   /// battery level back to the sentinel, noise/ear state back to
   /// defaults. `ear_pause_mode` is preserved — it is a standing global
   /// preference, not part of the peer session.
   pub fn reset(&self) {
      let mut g = self.0.lock();
      let ear_pause_mode = g.ear_pause_mode;
      *g = Inner { ear_pause_mode, ..Inner::default() };
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn property_6_reset_clears_connection_and_batteries() {
      let state = DeviceState::new();
      state.set_connected(true);
      state.set_battery(Component::Left, BatteryState { level: 90, status: crate::aap::protocol::BatteryStatus::Discharging });
      state.reset();
      let snap = state.snapshot();
      assert!(!snap.connected);
      assert_eq!(snap.battery_left.level, -1);
      assert_eq!(snap.battery_right.level, -1);
      assert_eq!(snap.battery_case.level, -1);
   }

   #[test]
   fn reset_preserves_ear_pause_mode() {
      let state = DeviceState::new();
      state.set_ear_pause_mode(2);
      state.reset();
      assert_eq!(state.snapshot().ear_pause_mode, 2);
   }

   #[test]
   fn setters_report_unchanged_on_repeat() {
      let state = DeviceState::new();
      assert_eq!(state.set_noise_control_mode(NoiseControlMode::Anc), Update::Changed);
      assert_eq!(state.set_noise_control_mode(NoiseControlMode::Anc), Update::Unchanged);
   }
}
