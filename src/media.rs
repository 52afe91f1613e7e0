//! MPRIS media-player pause/resume and the ear-pause edge detector.
//!
//! Grounded in the session-bus enumerate/pause/resume pattern used widely
//! for MPRIS control: `DBusProxy::list_names()` filtered to the
//! `org.mpris.MediaPlayer2.*` family, `PlaybackStatus` reads, and
//! `Pause`/`Play` calls via `call_noreply`. PulseAudio routing and A2DP
//! profile switching are out of scope here; this module only drives MPRIS.

use std::collections::HashSet;

use log::{debug, info, warn};
use parking_lot::Mutex;
use zbus::Connection;

use crate::error::Result;

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";

/// Global ear-pause policy, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarPauseMode {
   #[default]
   Disabled,
   OneOut,
   BothOut,
}

impl EarPauseMode {
   pub const fn from_i32(v: i32) -> Self {
      match v {
         1 => Self::OneOut,
         2 => Self::BothOut,
         _ => Self::Disabled,
      }
   }

   pub const fn as_i32(self) -> i32 {
      match self {
         Self::Disabled => 0,
         Self::OneOut => 1,
         Self::BothOut => 2,
      }
   }

   fn is_out(self, left_in_ear: bool, right_in_ear: bool) -> Option<bool> {
      match self {
         Self::Disabled => None,
         Self::OneOut => Some(!left_in_ear || !right_in_ear),
         Self::BothOut => Some(!left_in_ear && !right_in_ear),
      }
   }
}

#[derive(Debug, Clone, Copy)]
enum EdgeAction {
   None,
   PauseAll,
   Resume,
}

struct State {
   session: Option<Connection>,
   paused_by_us: HashSet<String>,
   policy: EarPauseMode,
   /// `None` until the first ear-detection reading after construction or a
   /// policy change — per property 7, that first reading must not fire an
   /// edge.
   previous_out: Option<bool>,
}

/// Pauses and resumes MPRIS players on ear-detection edges, remembering
/// only the players it paused itself.
pub struct MediaController(Mutex<State>);

impl Default for MediaController {
   fn default() -> Self {
      Self::new()
   }
}

impl MediaController {
   pub fn new() -> Self {
      Self(Mutex::new(State {
         session: None,
         paused_by_us: HashSet::new(),
         policy: EarPauseMode::Disabled,
         previous_out: None,
      }))
   }

   /// Changing the policy invalidates the previous edge-detector state.
   pub fn set_policy(&self, policy: EarPauseMode) {
      let mut g = self.0.lock();
      g.policy = policy;
      g.previous_out = None;
   }

   async fn session(&self) -> Option<Connection> {
      {
         let g = self.0.lock();
         if let Some(conn) = &g.session {
            return Some(conn.clone());
         }
      }
      match Connection::session().await {
         Ok(conn) => {
            self.0.lock().session = Some(conn.clone());
            Some(conn)
         },
         Err(e) => {
            warn!("could not connect to session bus for media control: {e}");
            None
         },
      }
   }

   async fn player_names(conn: &Connection) -> Vec<String> {
      let Ok(dbus) = zbus::fdo::DBusProxy::new(conn).await else {
         return Vec::new();
      };
      let Ok(names) = dbus.list_names().await else {
         return Vec::new();
      };
      names
         .into_iter()
         .map(|n| n.to_string())
         .filter(|n| n.starts_with(MPRIS_PREFIX))
         .collect()
   }

   async fn playback_status(conn: &Connection, service: &str) -> Option<String> {
      let proxy = zbus::Proxy::new(
         conn,
         service.to_owned(),
         "/org/mpris/MediaPlayer2",
         "org.mpris.MediaPlayer2.Player",
      )
      .await
      .ok()?;
      proxy.get_property::<String>("PlaybackStatus").await.ok()
   }

   /// Pauses every currently-`Playing` player, remembering exactly the set
   /// it paused. Overwrites any previously remembered set per §3's
   /// invariant: cleared before being repopulated.
   pub async fn pause_all(&self) -> Result<()> {
      let Some(conn) = self.session().await else { return Ok(()) };
      let names = Self::player_names(&conn).await;

      let mut paused = HashSet::new();
      for service in &names {
         if Self::playback_status(&conn, service).await.as_deref() != Some("Playing") {
            continue;
         }
         let Ok(proxy) = zbus::Proxy::new(
            &conn,
            service.clone(),
            "/org/mpris/MediaPlayer2",
            "org.mpris.MediaPlayer2.Player",
         )
         .await
         else {
            continue;
         };
         if proxy.call_noreply("Pause", &()).await.is_ok() {
            info!("paused {service}");
            paused.insert(service.clone());
         } else {
            warn!("failed to pause {service}");
         }
      }

      self.0.lock().paused_by_us = paused;
      Ok(())
   }

   /// Resumes exactly the players this controller paused, then clears the
   /// remembered set. Never touches a player it did not pause.
   pub async fn resume(&self) -> Result<()> {
      let services: Vec<String> = {
         let mut g = self.0.lock();
         std::mem::take(&mut g.paused_by_us).into_iter().collect()
      };
      if services.is_empty() {
         return Ok(());
      }
      let Some(conn) = self.session().await else { return Ok(()) };

      for service in &services {
         let Ok(proxy) = zbus::Proxy::new(
            &conn,
            service.clone(),
            "/org/mpris/MediaPlayer2",
            "org.mpris.MediaPlayer2.Player",
         )
         .await
         else {
            continue;
         };
         if proxy.call_noreply("Play", &()).await.is_ok() {
            info!("resumed {service}");
         } else {
            warn!("failed to resume {service}");
         }
      }
      Ok(())
   }

   fn edge(&self, left_in_ear: bool, right_in_ear: bool) -> EdgeAction {
      let mut g = self.0.lock();
      let Some(out_now) = g.policy.is_out(left_in_ear, right_in_ear) else {
         return EdgeAction::None;
      };
      let action = match g.previous_out {
         None => EdgeAction::None,
         Some(false) if out_now => EdgeAction::PauseAll,
         Some(true) if !out_now => EdgeAction::Resume,
         _ => EdgeAction::None,
      };
      g.previous_out = Some(out_now);
      action
   }

   /// Edge-detects on an ear-detection transition and pauses/resumes as
   /// the policy truth table in §4.7 dictates.
   pub async fn on_ear_detection_changed(&self, left_in_ear: bool, right_in_ear: bool) -> Result<()> {
      match self.edge(left_in_ear, right_in_ear) {
         EdgeAction::None => {
            debug!("ear-detection edge: no action (left={left_in_ear} right={right_in_ear})");
            Ok(())
         },
         EdgeAction::PauseAll => self.pause_all().await,
         EdgeAction::Resume => self.resume().await,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn property_7_first_call_emits_no_action() {
      let mc = MediaController::new();
      mc.set_policy(EarPauseMode::OneOut);
      assert!(matches!(mc.edge(false, false), EdgeAction::None));
   }

   #[test]
   fn one_out_policy_pauses_then_resumes() {
      let mc = MediaController::new();
      mc.set_policy(EarPauseMode::OneOut);
      mc.edge(true, true); // seed previous state: in
      assert!(matches!(mc.edge(false, true), EdgeAction::PauseAll));
      assert!(matches!(mc.edge(true, true), EdgeAction::Resume));
   }

   #[test]
   fn both_out_requires_both_buds_out() {
      let mc = MediaController::new();
      mc.set_policy(EarPauseMode::BothOut);
      mc.edge(true, true);
      assert!(matches!(mc.edge(false, true), EdgeAction::None));
      assert!(matches!(mc.edge(false, false), EdgeAction::PauseAll));
   }

   #[test]
   fn disabled_policy_never_fires() {
      let mc = MediaController::new();
      mc.edge(true, true);
      assert!(matches!(mc.edge(false, false), EdgeAction::None));
   }

   #[test]
   fn policy_change_invalidates_previous_state() {
      let mc = MediaController::new();
      mc.set_policy(EarPauseMode::OneOut);
      mc.edge(true, true);
      mc.set_policy(EarPauseMode::BothOut);
      assert!(matches!(mc.edge(false, true), EdgeAction::None));
   }
}
