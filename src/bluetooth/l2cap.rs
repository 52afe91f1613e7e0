//! L2CAP socket transport for the Apple Accessory Protocol control channel.
//!
//! Owns the socket; exposes send/receive and connect/disconnect; publishes
//! transport-state transitions to a `watch` channel so the orchestrator can
//! `select!` on them alongside frame reception and bus commands.

use std::{sync::Arc, time::Duration};

use bluer::{
   Address, AddressType,
   l2cap::{SeqPacket, Socket, SocketAddr},
};
use log::{debug, warn};
use smallvec::SmallVec;
use tokio::{
   sync::{mpsc, oneshot, watch},
   task::JoinSet,
   time,
};

use crate::error::{AapError, Result};

pub type Packet = SmallVec<[u8; 32]>;

/// Fixed PSM for the AAP control channel.
pub const PSM_CONTROL: u16 = 0x1001;
/// Maximum transmission/reception unit; larger frames are neither
/// expected nor supported.
const L2CAP_MTU: usize = 1024;
const WRITE_TIMEOUT: Duration = Duration::from_secs(25);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport lifecycle, per §4.2: `Disconnected → Connecting → Connected →
/// {Disconnected, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
   #[default]
   Disconnected,
   Connecting,
   Connected,
   Error,
}

enum Command {
   Send { data: Packet, then: oneshot::Sender<Result<()>> },
}

/// Receiver half of an L2CAP connection.
#[derive(Debug)]
pub struct L2CapReceiver {
   rx: mpsc::Receiver<Result<Packet>>,
}

impl L2CapReceiver {
   pub async fn recv(&mut self) -> Result<Packet> {
      self.rx.recv().await.ok_or(AapError::ConnectionClosed)?
   }
}

/// Sender half of an L2CAP connection. Cheaply cloneable.
#[derive(Debug, Clone)]
pub struct L2CapSender {
   tx: mpsc::Sender<Command>,
}

impl L2CapSender {
   pub fn is_connected(&self) -> bool {
      !self.tx.is_closed()
   }

   pub async fn send(&self, data: &[u8]) -> Result<()> {
      if !self.is_connected() {
         return Err(AapError::ConnectionClosed);
      }

      let (tx, rx) = oneshot::channel();
      self
         .tx
         .send(Command::Send { data: Packet::from_slice(data), then: tx })
         .await
         .map_err(|_| AapError::ConnectionClosed)?;

      time::timeout(WRITE_TIMEOUT, rx)
         .await
         .map_err(|_| AapError::RequestTimeout)?
         .map_err(|_| AapError::ConnectionClosed)?
   }
}

/// Opens the control channel to `address` on the fixed PSM, spawning the
/// send/receive tasks onto `jset`. Publishes state transitions to
/// `state_tx` as it goes; the caller is expected to already have sent
/// `Connecting` before calling this (or this function does it for you on
/// entry).
pub async fn connect(
   jset: &mut JoinSet<()>,
   address: Address,
   state_tx: watch::Sender<TransportState>,
) -> Result<(L2CapReceiver, L2CapSender)> {
   let _ = state_tx.send(TransportState::Connecting);
   debug!("creating L2CAP socket for {address}");

   let socket = Socket::new_seq_packet()?;
   let addr = SocketAddr::new(address, AddressType::BrEdr, PSM_CONTROL);

   let seq_packet = match time::timeout(CONNECT_TIMEOUT, socket.connect(addr)).await {
      Ok(Ok(sp)) => sp,
      Ok(Err(e)) => {
         let _ = state_tx.send(TransportState::Error);
         return Err(e.into());
      },
      Err(_) => {
         let _ = state_tx.send(TransportState::Error);
         return Err(AapError::RequestTimeout);
      },
   };

   let (cmd_tx, cmd_rx) = mpsc::channel(128);
   let (in_tx, in_rx) = mpsc::channel(128);

   let seq_packet = Arc::new(seq_packet);
   jset.spawn(recv_thread(address, in_tx, seq_packet.clone(), state_tx.clone()));
   jset.spawn(send_thread(address, cmd_rx, seq_packet));

   let _ = state_tx.send(TransportState::Connected);
   Ok((L2CapReceiver { rx: in_rx }, L2CapSender { tx: cmd_tx }))
}

/// Recognizes the disconnect-trigger conditions from §4.2: a zero-length
/// read, or one of `ECONNRESET`/`EPIPE`/`ENOTCONN`.
fn is_disconnect_error(err: &std::io::Error) -> bool {
   use std::io::ErrorKind;
   matches!(
      err.kind(),
      ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::NotConnected
   )
}

async fn recv_thread(
   adr: Address,
   tx: mpsc::Sender<Result<Packet>>,
   sp: Arc<SeqPacket>,
   state_tx: watch::Sender<TransportState>,
) {
   let mut buf = [0u8; L2CAP_MTU];
   loop {
      match sp.recv(&mut buf).await {
         Ok(0) => {
            warn!("{adr}: zero-length read, transport disconnecting");
            let _ = state_tx.send(TransportState::Disconnected);
            let _ = tx.send(Err(AapError::ConnectionLost)).await;
            return;
         },
         Ok(n) => {
            let recvd = &buf[..n];
            debug!("← {adr}: {}", hex::encode(recvd));
            let packet = Packet::from_slice(recvd);
            if tx.send(Ok(packet)).await.is_err() {
               return;
            }
            buf[..n].fill(0);
         },
         Err(e) => {
            if is_disconnect_error(&e) {
               warn!("{adr}: transport disconnect: {e}");
               let _ = state_tx.send(TransportState::Disconnected);
            } else {
               warn!("{adr}: transport error: {e}");
               let _ = state_tx.send(TransportState::Error);
            }
            let _ = tx.send(Err(e.into())).await;
            return;
         },
      }
   }
}

async fn send_thread(adr: Address, mut rx: mpsc::Receiver<Command>, sp: Arc<SeqPacket>) {
   while let Some(cmd) = rx.recv().await {
      match cmd {
         Command::Send { data, then } => {
            debug!("→ {adr}: {}", hex::encode(&data));
            if let Err(e) = sp.send(&data).await {
               warn!("{adr}: send failed: {e}");
               let _ = then.send(Err(AapError::Io(e)));
            } else {
               let _ = then.send(Ok(()));
            }
         },
      }
   }
}
