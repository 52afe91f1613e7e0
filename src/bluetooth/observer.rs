//! BlueZ device observer.
//!
//! Watches the system bus (through `bluer`'s own wrapping of
//! `PropertiesChanged`/`InterfacesAdded`/`InterfacesRemoved`) for peers
//! advertising the AAP service UUID, and emits connect/disconnect events.
//! `bluer::Session` already performs the managed-objects walk internally
//! and tracks the object graph for the lifetime of the session, so this
//! module rides its `Adapter::events()`/`Device::events()` streams rather
//! than matching raw D-Bus signals — the two are the same subscription,
//! expressed through the crate the rest of this daemon already depends on.

use std::collections::HashMap;

use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, Session};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use smol_str::SmolStr;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// `74ec2172-0bad-4d01-8f77-997b2be0722a` — the AAP service UUID peers
/// must advertise to qualify.
pub const AAP_SERVICE_UUID: Uuid = Uuid::from_bytes([
   0x74, 0xec, 0x21, 0x72, 0x0b, 0xad, 0x4d, 0x01, 0x8f, 0x77, 0x99, 0x7b, 0x2b, 0xe0, 0x72, 0x2a,
]);

#[derive(Debug, Clone)]
pub enum ObserverEvent {
   Connected { address: Address, name: SmolStr },
   Disconnected { address: Address, name: SmolStr },
}

#[derive(Debug, Clone)]
struct CachedIdentity {
   name: SmolStr,
   connected: bool,
}

async fn is_aap_capable(device: &Device) -> bool {
   match device.uuids().await {
      Ok(Some(uuids)) => uuids.contains(&AAP_SERVICE_UUID),
      _ => false,
   }
}

async fn device_name(device: &Device, address: Address) -> SmolStr {
   device
      .name()
      .await
      .ok()
      .flatten()
      .map(SmolStr::from)
      .unwrap_or_else(|| SmolStr::new(address.to_string()))
}

/// Runs the observer loop for one Bluetooth adapter until the adapter's
/// event stream ends. Intended to be spawned once per adapter and to live
/// for the lifetime of the daemon.
pub async fn run_adapter(adapter: Adapter, event_tx: mpsc::Sender<ObserverEvent>) -> Result<()> {
   let mut identities: HashMap<Address, CachedIdentity> = HashMap::new();

   // Startup walk: catch peers already connected before the daemon came up.
   if let Ok(addresses) = adapter.device_addresses().await {
      for address in addresses {
         if let Ok(device) = adapter.device(address) {
            handle_device_added(&adapter, &device, address, &mut identities, &event_tx).await;
         }
      }
   }

   let mut events = adapter.events().await?;
   while let Some(event) = events.next().await {
      match event {
         AdapterEvent::DeviceAdded(address) => {
            let Ok(device) = adapter.device(address) else { continue };
            handle_device_added(&adapter, &device, address, &mut identities, &event_tx).await;
         },
         AdapterEvent::DeviceRemoved(address) => {
            if let Some(identity) = identities.remove(&address)
               && identity.connected
            {
               let _ = event_tx
                  .send(ObserverEvent::Disconnected { address, name: identity.name })
                  .await;
            }
         },
         AdapterEvent::PropertyChanged(_) => {},
      }
   }

   warn!("adapter event stream ended");
   Ok(())
}

async fn handle_device_added(
   adapter: &Adapter,
   device: &Device,
   address: Address,
   identities: &mut HashMap<Address, CachedIdentity>,
   event_tx: &mpsc::Sender<ObserverEvent>,
) {
   if !is_aap_capable(device).await {
      return;
   }

   let name = device_name(device, address).await;
   let connected = device.is_connected().await.unwrap_or(false);
   let changed = identities
      .get(&address)
      .is_none_or(|cached| cached.connected != connected);
   identities.insert(address, CachedIdentity { name: name.clone(), connected });

   if changed {
      if connected {
         info!("AAP peer connected: {name} ({address})");
         let _ = event_tx.send(ObserverEvent::Connected { address, name }).await;
      }
   }

   // Track subsequent Connected transitions for this device path.
   if let Ok(mut device_events) = device.events().await {
      let event_tx = event_tx.clone();
      let adapter_name = adapter.name().to_string();
      tokio::spawn(async move {
         while let Some(event) = device_events.next().await {
            let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event else {
               continue;
            };
            debug!("{adapter_name}: {address} connected={connected}");
            if connected {
               let _ = event_tx
                  .send(ObserverEvent::Connected { address, name: name.clone() })
                  .await;
            } else {
               let _ = event_tx
                  .send(ObserverEvent::Disconnected { address, name: name.clone() })
                  .await;
            }
         }
      });
   }
}

/// Spawns an observer task for every adapter known to `session`, forwarding
/// all events onto a single channel.
pub async fn spawn_all(session: &Session, event_tx: mpsc::Sender<ObserverEvent>) -> Result<()> {
   let names = session.adapter_names().await?;
   for name in names {
      let adapter = session.adapter(&name)?;
      let event_tx = event_tx.clone();
      tokio::spawn(async move {
         if let Err(e) = run_adapter(adapter, event_tx).await {
            warn!("adapter {name} observer exited: {e}");
         }
      });
   }
   Ok(())
}
