//! aapd — session-bus bridge between Apple Accessory Protocol earbuds and
//! the desktop.
//!
//! Observes BlueZ for AAP-capable peers, speaks the protocol over L2CAP,
//! and republishes the resulting state on the session bus while driving
//! MPRIS pause/resume on ear-detection transitions.

use std::sync::Arc;

use log::{error, info};
use tokio::{signal, sync::mpsc};
use zbus::connection;

mod aap;
mod bluetooth;
mod config;
mod dbus;
mod device_state;
mod error;
mod media;
mod orchestrator;

use crate::{
   bluetooth::observer,
   dbus::{AirPodsService, BUS_NAME, OBJECT_PATH},
   device_state::DeviceState,
   error::Result,
   media::MediaController,
   orchestrator::Orchestrator,
};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
   info!("starting aapd");

   let state = Arc::new(DeviceState::new());
   let media = Arc::new(MediaController::new());

   let (command_tx, command_rx) = mpsc::channel(32);
   let service = AirPodsService::new(state.clone(), command_tx);

   let connection = connection::Builder::session()?
      .name(BUS_NAME)?
      .serve_at(OBJECT_PATH, service)?
      .build()
      .await?;
   info!("bus surface registered at {BUS_NAME}{OBJECT_PATH}");

   let iface = connection.object_server().interface::<_, AirPodsService>(OBJECT_PATH).await?;

   let bt_session = bluer::Session::new().await?;
   let (observer_tx, observer_rx) = mpsc::channel(32);
   observer::spawn_all(&bt_session, observer_tx).await?;
   info!("BlueZ observer started");

   let orchestrator = Orchestrator::new(state, media, iface);
   orchestrator.load_global_config();

   tokio::spawn(async move {
      orchestrator.run(observer_rx, command_rx).await;
   });

   wait_for_shutdown_signal().await;
   info!("shutting down aapd");
   Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
   use tokio::signal::unix::{SignalKind, signal as unix_signal};

   let mut sigterm = match unix_signal(SignalKind::terminate()) {
      Ok(s) => s,
      Err(e) => {
         error!("failed to install SIGTERM handler: {e}");
         let _ = signal::ctrl_c().await;
         return;
      },
   };

   tokio::select! {
      _ = signal::ctrl_c() => {},
      _ = sigterm.recv() => {},
   }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
   let _ = signal::ctrl_c().await;
}
