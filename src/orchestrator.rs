//! Wires the BlueZ observer, L2CAP transport, AAP codec, Device State, bus
//! surface, and media controller together into the single event loop
//! described by §4.4. Transport and peer identity are local to the loop
//! rather than fields on `Orchestrator`, so the struct itself only ever
//! needs a shared borrow — the mutable session state is threaded through
//! explicitly instead of living behind `&mut self`.

use std::{sync::Arc, time::Duration};

use bluer::Address;
use log::{debug, info, warn};
use tokio::{
   sync::{mpsc, watch},
   task::JoinSet,
   time,
};
use zbus::object_server::InterfaceRef;

use crate::{
   aap::{
      builder,
      model,
      parser::{Frame, ParseOutcome, parse},
      protocol::{ListeningModes, PKT_HANDSHAKE},
   },
   bluetooth::{
      l2cap::{self, L2CapReceiver, L2CapSender, Packet, TransportState},
      observer::ObserverEvent,
   },
   config,
   dbus::{AirPodsService, Command},
   device_state::{DeviceState, Update},
   error::{AapError, Result},
   media::{EarPauseMode, MediaController},
};

/// Delay between the init triplet sends, per §4.2's "sent in order, with
/// the peer given time to process" contract. This is a documented peer
/// quirk, not a protocol requirement, hence the magic-looking sleep.
const INIT_SEND_GAP: Duration = Duration::from_millis(75);

/// Feature-set / request-notifications frames sent after the handshake.
/// The spec names only the handshake constant's bytes explicitly; these
/// two preserve the same on-wire bodies this protocol has always used
/// for feature negotiation (opcode `0x4d`) and notification subscription
/// (opcode `0x0f`).
const PKT_FEATURES: &[u8] = &[0x04, 0x00, 0x04, 0x00, 0x4D, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const PKT_REQUEST_NOTIFY: &[u8] = &[0x04, 0x00, 0x04, 0x00, 0x0F, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

struct Peer {
   address: Address,
   name: String,
}

/// A live L2CAP session: the send/receive halves, the background tasks
/// that drive them, and the state-transition watch.
struct Transport {
   jset: JoinSet<()>,
   sender: L2CapSender,
   receiver: L2CapReceiver,
   state_rx: watch::Receiver<TransportState>,
}

enum TransportEvent {
   State(TransportState),
   Packet(Result<Packet>),
}

async fn next_transport_event(transport: &mut Option<Transport>) -> TransportEvent {
   let Some(t) = transport.as_mut() else {
      return std::future::pending().await;
   };
   tokio::select! {
      changed = t.state_rx.changed() => match changed {
         Ok(()) => TransportEvent::State(*t.state_rx.borrow()),
         Err(_) => TransportEvent::Packet(Err(AapError::ConnectionClosed)),
      },
      packet = t.receiver.recv() => TransportEvent::Packet(packet),
   }
}

/// Owns Device State and the media controller and mediates every other
/// component's events into them. Cheap to clone-by-reference — the heavy
/// session state lives in `run`'s locals, not here.
pub struct Orchestrator {
   state: Arc<DeviceState>,
   media: Arc<MediaController>,
   iface: InterfaceRef<AirPodsService>,
}

impl Orchestrator {
   pub fn new(state: Arc<DeviceState>, media: Arc<MediaController>, iface: InterfaceRef<AirPodsService>) -> Self {
      Self { state, media, iface }
   }

   /// Loads the standing ear-pause preference at startup and applies it
   /// to both Device State and the media controller's edge detector.
   pub fn load_global_config(&self) {
      let mode = config::load_global().map(|c| c.ear_pause_mode).unwrap_or_else(|e| {
         warn!("failed to load global config, using defaults: {e}");
         0
      });
      self.state.set_ear_pause_mode(mode);
      self.media.set_policy(EarPauseMode::from_i32(mode));
   }

   /// Runs the event loop until the observer and command channels both
   /// close, which in practice only happens at shutdown.
   pub async fn run(&self, mut observer_rx: mpsc::Receiver<ObserverEvent>, mut command_rx: mpsc::Receiver<Command>) {
      let mut transport: Option<Transport> = None;
      let mut peer: Option<Peer> = None;

      loop {
         tokio::select! {
            Some(event) = observer_rx.recv() => {
               self.handle_observer_event(event, &mut transport, &mut peer).await;
            },
            event = next_transport_event(&mut transport) => {
               self.handle_transport_event(event, &mut transport, &mut peer).await;
            },
            Some(cmd) = command_rx.recv() => {
               self.handle_command(cmd, &mut transport, &mut peer).await;
            },
            else => break,
         }
      }
   }

   async fn handle_observer_event(
      &self,
      event: ObserverEvent,
      transport: &mut Option<Transport>,
      peer: &mut Option<Peer>,
   ) {
      match event {
         ObserverEvent::Connected { address, name } => {
            if transport.is_some() {
               debug!("ignoring connected event for {address}, a peer is already attached");
               return;
            }
            *peer = Some(Peer { address, name: name.to_string() });
            self.state.set_identity(&address.to_string(), &name);

            let mut jset = JoinSet::new();
            let (state_tx, state_rx) = watch::channel(TransportState::Disconnected);
            match l2cap::connect(&mut jset, address, state_tx).await {
               Ok((receiver, sender)) => {
                  *transport = Some(Transport { jset, sender, receiver, state_rx });
               },
               Err(e) => {
                  warn!("failed to connect to {address}: {e}");
                  self.state.reset();
                  *peer = None;
               },
            }
         },
         ObserverEvent::Disconnected { address, .. } => {
            if peer.as_ref().is_some_and(|p| p.address == address) {
               self.teardown(transport, peer).await;
            }
         },
      }
   }

   async fn handle_transport_event(
      &self,
      event: TransportEvent,
      transport: &mut Option<Transport>,
      peer: &mut Option<Peer>,
   ) {
      match event {
         TransportEvent::State(TransportState::Connected) => {
            let Some(sender) = transport.as_ref().map(|t| t.sender.clone()) else { return };
            let Some(address) = peer.as_ref().map(|p| p.address) else { return };
            info!("{address}: running init sequence");

            if self.run_init_sequence(&sender).await.is_err() {
               self.teardown(transport, peer).await;
               return;
            }

            if self.state.set_connected(true).changed()
               && let Some(p) = peer.as_ref()
            {
               let _ = self.iface.device_connected(&p.address.to_string(), &p.name).await;
            }

            if let Some(profile) = config::load_peer(&address.to_string()).ok().flatten() {
               self.state.set_display_name(&profile.display_name);
            }
         },
         TransportEvent::State(TransportState::Disconnected | TransportState::Error) => {
            self.teardown(transport, peer).await;
         },
         TransportEvent::State(TransportState::Connecting) => {},
         TransportEvent::Packet(Ok(data)) => self.handle_frame_bytes(&data, peer).await,
         TransportEvent::Packet(Err(e)) => {
            warn!("transport error, tearing down: {e}");
            self.teardown(transport, peer).await;
         },
      }
   }

   async fn run_init_sequence(&self, sender: &L2CapSender) -> Result<()> {
      sender.send(PKT_HANDSHAKE).await?;
      time::sleep(INIT_SEND_GAP).await;
      sender.send(PKT_FEATURES).await?;
      time::sleep(INIT_SEND_GAP).await;
      sender.send(PKT_REQUEST_NOTIFY).await?;
      Ok(())
   }

   async fn teardown(&self, transport: &mut Option<Transport>, peer: &mut Option<Peer>) {
      let was_connected = self.state.snapshot().connected;
      if let Some(mut t) = transport.take() {
         t.jset.abort_all();
      }
      let peer = peer.take();
      self.state.reset();

      if was_connected
         && let Some(p) = peer
      {
         let _ = self.iface.device_disconnected(&p.address.to_string(), &p.name).await;
      }
   }

   async fn handle_frame_bytes(&self, data: &[u8], peer: &Option<Peer>) {
      match parse(data) {
         ParseOutcome::Ok(frame) => self.handle_frame(frame, peer).await,
         ParseOutcome::UnknownOpcode => {},
         ParseOutcome::Incomplete | ParseOutcome::InvalidHeader | ParseOutcome::Malformed(_) => {
            debug!("dropping unparseable frame ({} bytes)", data.len());
         },
      }
   }

   async fn handle_frame(&self, frame: Frame, peer: &Option<Peer>) {
      match frame {
         Frame::Battery(records) => {
            let mut changed = false;
            for record in records {
               if self.state.set_battery(record.component, record.state).changed() {
                  changed = true;
               }
            }
            if changed {
               let (left, right, case) = self.state.battery_triple();
               let _ = self.iface.battery_changed(left as i32, right as i32, case as i32).await;
               let emitter = self.iface.signal_emitter();
               let iface = self.iface.get().await;
               let _ = iface.battery_left_changed(emitter).await;
               let _ = iface.battery_right_changed(emitter).await;
               let _ = iface.battery_case_changed(emitter).await;
            }
         },
         Frame::EarDetection { primary_in_ear, secondary_in_ear } => {
            let (left_in_ear, right_in_ear) = if self.state.primary_left() {
               (primary_in_ear, secondary_in_ear)
            } else {
               (secondary_in_ear, primary_in_ear)
            };

            if self.state.set_ear_detection(left_in_ear, right_in_ear).changed() {
               let _ = self.iface.ear_detection_changed(left_in_ear, right_in_ear).await;
               let emitter = self.iface.signal_emitter();
               let iface = self.iface.get().await;
               let _ = iface.left_in_ear_changed(emitter).await;
               let _ = iface.right_in_ear_changed(emitter).await;
               drop(iface);
               if let Err(e) = self.media.on_ear_detection_changed(left_in_ear, right_in_ear).await {
                  warn!("media controller error: {e}");
               }
            }
         },
         Frame::NoiseControl(mode) => {
            if self.state.set_noise_control_mode(mode).changed() {
               let _ = self.iface.noise_control_changed(mode.as_str()).await;
               let _ = self.iface.get().await.noise_control_mode_changed(self.iface.signal_emitter()).await;
               if let Some(p) = peer {
                  self.persist_peer(&p.address.to_string());
               }
            }
         },
         Frame::ConversationalAwareness(enabled) => {
            if self.state.set_conversational_awareness(enabled).changed() {
               let _ = self.iface.get().await.conversational_awareness_changed(self.iface.signal_emitter()).await;
            }
         },
         Frame::AdaptiveLevel(level) => {
            if self.state.set_adaptive_level(level).changed() {
               let _ = self.iface.get().await.adaptive_noise_level_changed(self.iface.signal_emitter()).await;
               if let Some(p) = peer {
                  self.persist_peer(&p.address.to_string());
               }
            }
         },
         Frame::ListeningModes(modes) => {
            let update =
               self
                  .state
                  .set_listening_modes(modes.off(), modes.transparency(), modes.anc(), modes.adaptive());
            if update == Update::Changed {
               let emitter = self.iface.signal_emitter();
               let iface = self.iface.get().await;
               let _ = iface.listening_mode_off_changed(emitter).await;
               let _ = iface.listening_mode_transparency_changed(emitter).await;
               let _ = iface.listening_mode_anc_changed(emitter).await;
               let _ = iface.listening_mode_adaptive_changed(emitter).await;
               drop(iface);
               if let Some(p) = peer {
                  self.persist_peer(&p.address.to_string());
               }
            }
         },
         Frame::Metadata(meta) => {
            let (model, supports_anc, supports_adaptive, is_headphones) = model::resolve(&meta.model_number);
            if model != crate::aap::model::Model::Unknown
               && self.state.set_model(model, supports_anc, supports_adaptive, is_headphones).changed()
            {
               debug!("resolved model {model} from \"{}\"", meta.model_number);
               let emitter = self.iface.signal_emitter();
               let iface = self.iface.get().await;
               let _ = iface.device_model_changed(emitter).await;
               let _ = iface.is_headphones_changed(emitter).await;
               let _ = iface.supports_anc_changed(emitter).await;
               let _ = iface.supports_adaptive_changed(emitter).await;
            }
         },
         Frame::CaDetection(level) => {
            debug!("conversational-awareness detection level: {}", level.0);
         },
      }
   }

   async fn handle_command(&self, command: Command, transport: &mut Option<Transport>, peer: &mut Option<Peer>) {
      match &command {
         Command::SetEarPauseMode(mode) => {
            self.state.set_ear_pause_mode(*mode);
            self.media.set_policy(EarPauseMode::from_i32(*mode));
            let mut global = config::load_global().unwrap_or_default();
            global.ear_pause_mode = *mode;
            if let Err(e) = config::save_global(&global) {
               warn!("failed to persist ear-pause mode: {e}");
            }
            return;
         },
         Command::SetDisplayName(name) => {
            if self.state.set_display_name(name).changed()
               && let Some(p) = peer.as_ref()
            {
               self.persist_peer(&p.address.to_string());
            }
            return;
         },
         _ => {},
      }

      let Some(sender) = transport.as_ref().map(|t| t.sender.clone()) else {
         warn!("command {command:?} refused: no peer connected");
         return;
      };

      let frame = match command {
         Command::SetNoiseControlMode(mode) => builder::build_noise_control(mode),
         Command::SetConversationalAwareness(enabled) => builder::build_conversational_awareness(enabled),
         Command::SetAdaptiveLevel(level) => builder::build_adaptive_level(level),
         Command::SetListeningModes { off, transparency, anc, adaptive } => {
            let modes = ListeningModes::from_flags(off, transparency, anc, adaptive);
            if !modes.is_valid() {
               warn!("refusing SetListeningModes: fewer than two bits set");
               return;
            }
            self.state.set_listening_modes(off, transparency, anc, adaptive);
            builder::build_listening_modes(modes)
         },
         Command::SetEarPauseMode(_) | Command::SetDisplayName(_) => unreachable!("handled above"),
      };

      if let Err(e) = sender.send(&frame).await {
         warn!("send failed, tearing down transport: {e}");
         self.teardown(transport, peer).await;
      }
   }

   fn persist_peer(&self, address: &str) {
      let snap = self.state.snapshot();
      let profile = config::PeerProfile {
         display_name: snap.display_name.to_string(),
         listening_off: snap.listening_off,
         listening_transparency: snap.listening_transparency,
         listening_anc: snap.listening_anc,
         listening_adaptive: snap.listening_adaptive,
         conversational_awareness: snap.conversational_awareness,
         adaptive_level: snap.adaptive_level,
         noise_control_mode: snap.noise_control_mode.as_str().to_string(),
         has_saved_settings: true,
      };
      if let Err(e) = config::save_peer(address, profile) {
         warn!("failed to persist profile for {address}: {e}");
      }
   }
}
