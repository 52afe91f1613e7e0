//! Apple Accessory Protocol wire constants and value types.
//!
//! This module contains the protocol-specific constants, packet layouts,
//! and value types shared by the parser and builder. It is pure and
//! I/O-free: nothing here touches a socket or a bus connection.

use std::num::NonZeroU8;

use serde::{Deserialize, Serialize};

/// Standard 4-byte frame header present on every non-handshake frame.
pub const HDR_STANDARD: &[u8] = &[0x04, 0x00, 0x04, 0x00];
/// Handshake-only 2-byte prefix, distinct from the standard header.
pub const HDR_HANDSHAKE: &[u8] = &[0x00, 0x00];

/// The 16-byte client-hello frame sent once per connection.
pub const PKT_HANDSHAKE: &[u8] = &[
   0x00, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub const OPCODE_BATTERY: u8 = 0x04;
pub const OPCODE_EAR_DETECTION: u8 = 0x06;
pub const OPCODE_CONTROL: u8 = 0x09;
pub const OPCODE_METADATA: u8 = 0x1D;
pub const OPCODE_CA_DETECTION: u8 = 0x4B;

pub const SUBOP_NOISE_CONTROL: u8 = 0x0D;
pub const SUBOP_LISTENING_MODES: u8 = 0x1A;
pub const SUBOP_CONVERSATIONAL_AWARENESS: u8 = 0x28;
pub const SUBOP_ADAPTIVE_LEVEL: u8 = 0x2E;

/// Header shared by every opcode-0x09 control frame, up to and including
/// the `0x00` spacer byte that precedes the sub-opcode.
pub const HDR_CONTROL: &[u8] = &[0x04, 0x00, 0x04, 0x00, 0x09, 0x00];

/// Battery component tag carried in a battery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Component {
   /// `0x01` — single-battery (headphones) form factor, routed to `Left`.
   Single,
   Right,
   Left,
   Case,
}

impl Component {
   pub const fn from_byte(b: u8) -> Option<Self> {
      match b {
         0x01 => Some(Self::Single),
         0x02 => Some(Self::Right),
         0x04 => Some(Self::Left),
         0x08 => Some(Self::Case),
         _ => None,
      }
   }
}

/// Battery status for a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
pub enum BatteryStatus {
   #[default]
   Unknown,
   Charging,
   Discharging,
   Disconnected,
}

impl BatteryStatus {
   pub const fn from_byte(b: u8) -> Self {
      match b {
         0x01 => Self::Charging,
         0x02 => Self::Discharging,
         0x04 => Self::Disconnected,
         _ => Self::Unknown,
      }
   }
}

/// Level/status pair for one battery component. `level == -1` is the
/// "not reported" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryState {
   pub level: i8,
   pub status: BatteryStatus,
}

impl BatteryState {
   pub const UNKNOWN: Self = Self {
      level: -1,
      status: BatteryStatus::Unknown,
   };
}

impl Default for BatteryState {
   fn default() -> Self {
      Self::UNKNOWN
   }
}

/// A single parsed battery record: which component, and its new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryRecord {
   pub component: Component,
   pub state: BatteryState,
}

/// Noise-control mode, as carried in control sub-opcode `0x0D` and as the
/// currently active mode on Device State.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
)]
#[repr(u8)]
pub enum NoiseControlMode {
   #[strum(serialize = "off")]
   Off = 1,
   #[strum(serialize = "anc")]
   Anc = 2,
   #[strum(serialize = "transparency")]
   Transparency = 3,
   #[strum(serialize = "adaptive")]
   Adaptive = 4,
}

impl NoiseControlMode {
   /// Parses the loose noise-control string encoding from §6: case
   /// insensitive, with `noise_cancellation`/`cancellation` aliasing to
   /// `anc` and `transparent` aliasing to `transparency`. Unknown strings
   /// map to `Off` rather than erroring.
   pub fn from_loose_str(s: &str) -> Self {
      let lower = s.to_ascii_lowercase();
      match lower.as_str() {
         "anc" | "noise_cancellation" | "cancellation" => Self::Anc,
         "transparency" | "transparent" => Self::Transparency,
         "adaptive" => Self::Adaptive,
         "off" => Self::Off,
         _ => Self::Off,
      }
   }

   pub fn as_str(self) -> &'static str {
      self.into()
   }
}

/// Bitmask of listening modes participating in the peer's long-press
/// cycle. Mirrors the `FeatureId` bitpos-wrapper idiom: a transparent
/// newtype with associated bit constants rather than a `bitflags` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(transparent)]
pub struct ListeningModes(u8);

impl ListeningModes {
   pub const OFF: u8 = 0x01;
   pub const TRANSPARENCY: u8 = 0x02;
   pub const ANC: u8 = 0x04;
   pub const ADAPTIVE: u8 = 0x08;

   pub const fn from_bits(bits: u8) -> Self {
      Self(bits)
   }

   pub const fn bits(self) -> u8 {
      self.0
   }

   pub const fn from_flags(off: bool, transparency: bool, anc: bool, adaptive: bool) -> Self {
      let mut bits = 0u8;
      if off {
         bits |= Self::OFF;
      }
      if transparency {
         bits |= Self::TRANSPARENCY;
      }
      if anc {
         bits |= Self::ANC;
      }
      if adaptive {
         bits |= Self::ADAPTIVE;
      }
      Self(bits)
   }

   pub const fn off(self) -> bool {
      self.0 & Self::OFF != 0
   }
   pub const fn transparency(self) -> bool {
      self.0 & Self::TRANSPARENCY != 0
   }
   pub const fn anc(self) -> bool {
      self.0 & Self::ANC != 0
   }
   pub const fn adaptive(self) -> bool {
      self.0 & Self::ADAPTIVE != 0
   }

   /// §4.1/§8 invariant: at least two bits must be set.
   pub const fn is_valid(self) -> bool {
      self.0.count_ones() >= 2
   }
}

/// Ear-in-ear status for both buds, plus the primary-left orientation bit.
/// Packed into a `NonZeroU8` the same way the teacher packs
/// `EarDetectionStatus`, so a default-constructed value can never be
/// mistaken for "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EarDetection(NonZeroU8);

impl EarDetection {
   const LEFT: u8 = 1 << 0;
   const RIGHT: u8 = 1 << 1;
   const PRIMARY_LEFT: u8 = 1 << 2;
   const VALID: u8 = 0x80;

   pub const fn new(left_in_ear: bool, right_in_ear: bool, primary_left: bool) -> Self {
      let mut bits = Self::VALID;
      if left_in_ear {
         bits |= Self::LEFT;
      }
      if right_in_ear {
         bits |= Self::RIGHT;
      }
      if primary_left {
         bits |= Self::PRIMARY_LEFT;
      }
      Self(NonZeroU8::new(bits).expect("VALID bit is always set"))
   }

   pub const fn left_in_ear(self) -> bool {
      self.0.get() & Self::LEFT != 0
   }
   pub const fn right_in_ear(self) -> bool {
      self.0.get() & Self::RIGHT != 0
   }
   pub const fn primary_left(self) -> bool {
      self.0.get() & Self::PRIMARY_LEFT != 0
   }
}

impl Default for EarDetection {
   fn default() -> Self {
      Self::new(false, false, true)
   }
}

/// Metadata frame payload: device name, model number, manufacturer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
   pub name: smol_str::SmolStr,
   pub model_number: smol_str::SmolStr,
   pub manufacturer: smol_str::SmolStr,
}

/// Maximum length a metadata string field is truncated to on parse.
pub const METADATA_FIELD_MAX: usize = 128;

/// Conversational-awareness opaque-volume CA-detection payload. The wire
/// format beyond "some volume level" is not specified; the codec treats it
/// as an opaque byte for the orchestrator to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaDetection(pub u8);
