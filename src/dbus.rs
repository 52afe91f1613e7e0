//! Session-bus service surface.
//!
//! Registers a single object at `/org/librepods/AirPods` on interface
//! `org.librepods.AirPods1`. Properties mirror Device State verbatim;
//! setters forward to the orchestrator over a channel and always reply
//! success to the caller — validation failures are a logged warning, not
//! a bus error, per §7.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;
use zbus::{interface, object_server::SignalEmitter};

use crate::{
   aap::protocol::NoiseControlMode,
   device_state::DeviceState,
};

pub const BUS_NAME: &str = "org.librepods.Daemon";
pub const OBJECT_PATH: &str = "/org/librepods/AirPods";
pub const INTERFACE: &str = "org.librepods.AirPods1";

/// Commands accepted from the bus surface, forwarded to the orchestrator
/// for validation, codec encoding, and transport send.
#[derive(Debug, Clone)]
pub enum Command {
   SetNoiseControlMode(NoiseControlMode),
   SetConversationalAwareness(bool),
   SetAdaptiveLevel(u8),
   SetEarPauseMode(i32),
   SetListeningModes { off: bool, transparency: bool, anc: bool, adaptive: bool },
   SetDisplayName(String),
}

pub struct AirPodsService {
   state: Arc<DeviceState>,
   commands: mpsc::Sender<Command>,
}

impl AirPodsService {
   pub const fn new(state: Arc<DeviceState>, commands: mpsc::Sender<Command>) -> Self {
      Self { state, commands }
   }

   fn dispatch(&self, command: Command) {
      if self.commands.try_send(command).is_err() {
         warn!("orchestrator command channel full or closed, dropping command");
      }
   }
}

#[interface(name = "org.librepods.AirPods1")]
impl AirPodsService {
   // -- properties, mirroring Device State --

   #[zbus(property)]
   async fn connected(&self) -> bool {
      self.state.snapshot().connected
   }

   #[zbus(property)]
   async fn device_name(&self) -> String {
      self.state.snapshot().name.to_string()
   }

   #[zbus(property)]
   async fn device_address(&self) -> String {
      self.state.snapshot().address.to_string()
   }

   #[zbus(property)]
   async fn device_model(&self) -> String {
      self.state.snapshot().model.to_string()
   }

   #[zbus(property)]
   async fn display_name(&self) -> String {
      self.state.snapshot().display_name.to_string()
   }

   #[zbus(property)]
   async fn is_headphones(&self) -> bool {
      self.state.snapshot().is_headphones
   }

   #[zbus(property)]
   async fn supports_anc(&self) -> bool {
      self.state.snapshot().supports_anc
   }

   #[zbus(property)]
   async fn supports_adaptive(&self) -> bool {
      self.state.snapshot().supports_adaptive
   }

   #[zbus(property)]
   async fn battery_left(&self) -> i32 {
      self.state.snapshot().battery_left.level as i32
   }

   #[zbus(property)]
   async fn battery_right(&self) -> i32 {
      self.state.snapshot().battery_right.level as i32
   }

   #[zbus(property)]
   async fn battery_case(&self) -> i32 {
      self.state.snapshot().battery_case.level as i32
   }

   #[zbus(property)]
   async fn charging_left(&self) -> bool {
      self.state.snapshot().battery_left.status == crate::aap::protocol::BatteryStatus::Charging
   }

   #[zbus(property)]
   async fn charging_right(&self) -> bool {
      self.state.snapshot().battery_right.status == crate::aap::protocol::BatteryStatus::Charging
   }

   #[zbus(property)]
   async fn charging_case(&self) -> bool {
      self.state.snapshot().battery_case.status == crate::aap::protocol::BatteryStatus::Charging
   }

   #[zbus(property)]
   async fn noise_control_mode(&self) -> String {
      self.state.snapshot().noise_control_mode.as_str().to_string()
   }

   #[zbus(property)]
   async fn conversational_awareness(&self) -> bool {
      self.state.snapshot().conversational_awareness
   }

   #[zbus(property)]
   async fn left_in_ear(&self) -> bool {
      self.state.snapshot().left_in_ear
   }

   #[zbus(property)]
   async fn right_in_ear(&self) -> bool {
      self.state.snapshot().right_in_ear
   }

   #[zbus(property)]
   async fn adaptive_noise_level(&self) -> i32 {
      self.state.snapshot().adaptive_level as i32
   }

   #[zbus(property)]
   async fn ear_pause_mode(&self) -> i32 {
      self.state.snapshot().ear_pause_mode
   }

   #[zbus(property)]
   async fn listening_mode_off(&self) -> bool {
      self.state.snapshot().listening_off
   }

   #[zbus(property)]
   async fn listening_mode_transparency(&self) -> bool {
      self.state.snapshot().listening_transparency
   }

   #[zbus(property)]
   async fn listening_mode_anc(&self) -> bool {
      self.state.snapshot().listening_anc
   }

   #[zbus(property)]
   async fn listening_mode_adaptive(&self) -> bool {
      self.state.snapshot().listening_adaptive
   }

   // -- methods --

   async fn set_noise_control_mode(&self, mode: String) {
      self.dispatch(Command::SetNoiseControlMode(NoiseControlMode::from_loose_str(&mode)));
   }

   async fn set_conversational_awareness(&self, enabled: bool) {
      self.dispatch(Command::SetConversationalAwareness(enabled));
   }

   async fn set_adaptive_noise_level(&self, level: i32) {
      self.dispatch(Command::SetAdaptiveLevel(level.clamp(0, 100) as u8));
   }

   async fn set_ear_pause_mode(&self, mode: i32) {
      self.dispatch(Command::SetEarPauseMode(mode));
   }

   async fn set_listening_modes(&self, off: bool, transparency: bool, anc: bool, adaptive: bool) {
      self.dispatch(Command::SetListeningModes { off, transparency, anc, adaptive });
   }

   async fn set_display_name(&self, name: String) {
      self.dispatch(Command::SetDisplayName(name));
   }

   // -- signals --

   #[zbus(signal)]
   pub async fn device_connected(emitter: &SignalEmitter<'_>, address: &str, name: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn device_disconnected(emitter: &SignalEmitter<'_>, address: &str, name: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn battery_changed(emitter: &SignalEmitter<'_>, left: i32, right: i32, case: i32) -> zbus::Result<()>;

   // Named distinctly from the `noise_control_mode` property's own
   // macro-generated `noise_control_mode_changed` notifier, which this
   // would otherwise collide with.
   #[zbus(signal, name = "NoiseControlModeChanged")]
   pub async fn noise_control_changed(emitter: &SignalEmitter<'_>, mode: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn ear_detection_changed(emitter: &SignalEmitter<'_>, left: bool, right: bool) -> zbus::Result<()>;
}
