//! Construction of outbound Apple Accessory Protocol frames.

use smallvec::SmallVec;

use crate::aap::protocol::{
   HDR_CONTROL, ListeningModes, NoiseControlMode, SUBOP_ADAPTIVE_LEVEL,
   SUBOP_CONVERSATIONAL_AWARENESS, SUBOP_LISTENING_MODES, SUBOP_NOISE_CONTROL,
};

/// Outbound wire frame. Control frames are a fixed 11 bytes; this alias
/// just gives the builder functions a concrete, cheaply-moved return type.
pub type Frame = SmallVec<[u8; 16]>;

fn control_frame(sub_opcode: u8, arg: u8) -> Frame {
   let mut frame = Frame::new();
   frame.extend_from_slice(HDR_CONTROL);
   frame.push(sub_opcode);
   frame.push(arg);
   frame.extend_from_slice(&[0x00, 0x00, 0x00]);
   frame
}

/// Builds a `SetNoiseControlMode` control frame. The argument byte is one
/// of four fixed pre-images indexed by mode.
pub fn build_noise_control(mode: NoiseControlMode) -> Frame {
   control_frame(SUBOP_NOISE_CONTROL, mode as u8)
}

/// Builds a `SetListeningModes` control frame. The bitmask is embedded
/// verbatim — the ≥2-bits invariant is the caller's responsibility to
/// enforce before reaching the codec.
pub fn build_listening_modes(modes: ListeningModes) -> Frame {
   control_frame(SUBOP_LISTENING_MODES, modes.bits())
}

/// Builds a `SetConversationalAwareness` control frame.
pub fn build_conversational_awareness(enabled: bool) -> Frame {
   control_frame(SUBOP_CONVERSATIONAL_AWARENESS, if enabled { 1 } else { 2 })
}

/// Builds a `SetAdaptiveNoiseLevel` control frame, clamping to [0, 100]
/// before embedding.
pub fn build_adaptive_level(level: u8) -> Frame {
   control_frame(SUBOP_ADAPTIVE_LEVEL, level.min(100))
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::aap::parser::{Frame as ParsedFrame, ParseOutcome, parse};

   #[test]
   fn s4_set_noise_control_anc() {
      let frame = build_noise_control(NoiseControlMode::Anc);
      assert_eq!(
         frame.as_slice(),
         &[0x04, 0x00, 0x04, 0x00, 0x09, 0x00, 0x0D, 0x02, 0x00, 0x00, 0x00]
      );
   }

   #[test]
   fn s5_listening_modes_bitmask() {
      let modes = ListeningModes::from_flags(false, true, true, false);
      assert_eq!(modes.bits(), 0x06);
      let frame = build_listening_modes(modes);
      assert_eq!(frame[7], 0x06);
   }

   #[test]
   fn round_trip_noise_control() {
      for mode in [
         NoiseControlMode::Off,
         NoiseControlMode::Anc,
         NoiseControlMode::Transparency,
         NoiseControlMode::Adaptive,
      ] {
         let frame = build_noise_control(mode);
         assert_eq!(parse(&frame), ParseOutcome::Ok(ParsedFrame::NoiseControl(mode)));
      }
   }

   #[test]
   fn round_trip_listening_modes_at_least_two_bits() {
      let modes = ListeningModes::from_flags(true, false, true, false);
      assert!(modes.is_valid());
      let frame = build_listening_modes(modes);
      assert_eq!(parse(&frame), ParseOutcome::Ok(ParsedFrame::ListeningModes(modes)));
   }

   #[test]
   fn round_trip_conversational_awareness() {
      for enabled in [true, false] {
         let frame = build_conversational_awareness(enabled);
         assert_eq!(
            parse(&frame),
            ParseOutcome::Ok(ParsedFrame::ConversationalAwareness(enabled))
         );
      }
   }

   #[test]
   fn round_trip_adaptive_level_after_clamping() {
      let frame = build_adaptive_level(255);
      assert_eq!(parse(&frame), ParseOutcome::Ok(ParsedFrame::AdaptiveLevel(100)));
   }
}
