//! Parsing of inbound Apple Accessory Protocol frames.
//!
//! Pure and I/O-free: given a single SEQPACKET-delivered frame, classify it
//! and decode its payload. Reassembly across multiple reads is not this
//! module's job — the L2CAP transport guarantees one `recv` yields one
//! frame.

use log::debug;

use crate::aap::protocol::{
   BatteryRecord, BatteryState, CaDetection, Component, EarDetection, HDR_STANDARD, METADATA_FIELD_MAX,
   Metadata, NoiseControlMode, OPCODE_BATTERY, OPCODE_CA_DETECTION, OPCODE_CONTROL,
   OPCODE_EAR_DETECTION, OPCODE_METADATA, SUBOP_ADAPTIVE_LEVEL, SUBOP_CONVERSATIONAL_AWARENESS,
   SUBOP_LISTENING_MODES, SUBOP_NOISE_CONTROL, ListeningModes,
};

/// A decoded frame, independent of any device state. Mapping a raw
/// `EarDetection` reading onto left/right is the orchestrator's job, since
/// it depends on the peer's current primary-left bit.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
   Battery(Vec<BatteryRecord>),
   EarDetection { primary_in_ear: bool, secondary_in_ear: bool },
   NoiseControl(NoiseControlMode),
   ListeningModes(ListeningModes),
   ConversationalAwareness(bool),
   AdaptiveLevel(u8),
   Metadata(Metadata),
   CaDetection(CaDetection),
}

/// The outcome of parsing one frame. Kept as a dedicated enum rather than
/// a `Result` alias so `UnknownOpcode` is distinguishable at the call site
/// from a genuinely malformed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
   Ok(Frame),
   /// Buffer shorter than required to even read the opcode for this frame
   /// class.
   Incomplete,
   /// Neither the standard header nor the handshake prefix matched.
   InvalidHeader,
   /// Header and opcode are both well-formed, but the opcode is not one
   /// this codec recognizes. Not an error — callers should not log this as
   /// a warning.
   UnknownOpcode,
   /// Header valid, opcode known, payload violates the expected shape.
   Malformed(String),
}

pub fn parse(data: &[u8]) -> ParseOutcome {
   if data.len() < 6 {
      return ParseOutcome::Incomplete;
   }
   if !data.starts_with(HDR_STANDARD) {
      return ParseOutcome::InvalidHeader;
   }

   match data[4] {
      OPCODE_BATTERY => parse_battery(data),
      OPCODE_EAR_DETECTION => parse_ear_detection(data),
      OPCODE_CONTROL => parse_control(data),
      OPCODE_METADATA => parse_metadata(data),
      OPCODE_CA_DETECTION => parse_ca_detection(data),
      _ => ParseOutcome::UnknownOpcode,
   }
}

fn parse_battery(data: &[u8]) -> ParseOutcome {
   if data.len() < 7 {
      return ParseOutcome::Incomplete;
   }
   let count = data[6];
   if !(1..=3).contains(&count) {
      return ParseOutcome::Malformed(format!("battery component count out of range: {count}"));
   }
   let expected_len = 7 + 5 * count as usize;
   if data.len() != expected_len {
      return ParseOutcome::Malformed(format!(
         "battery frame length mismatch: expected {expected_len}, got {}",
         data.len()
      ));
   }

   let mut records = Vec::with_capacity(count as usize);
   for i in 0..count as usize {
      let offset = 7 + 5 * i;
      let record = &data[offset..offset + 5];
      let Some(component) = Component::from_byte(record[0]) else {
         debug!("unknown battery component byte 0x{:02x}, skipping", record[0]);
         continue;
      };
      let raw_level = record[2];
      let level = if raw_level > 100 { -1 } else { raw_level as i8 };
      let status = crate::aap::protocol::BatteryStatus::from_byte(record[3]);
      records.push(BatteryRecord {
         component,
         state: BatteryState { level, status },
      });
   }
   ParseOutcome::Ok(Frame::Battery(records))
}

fn parse_ear_detection(data: &[u8]) -> ParseOutcome {
   if data.len() < 8 {
      return ParseOutcome::Incomplete;
   }
   let decode = |b: u8| b == 0x00;
   ParseOutcome::Ok(Frame::EarDetection {
      primary_in_ear: decode(data[6]),
      secondary_in_ear: decode(data[7]),
   })
}

fn parse_control(data: &[u8]) -> ParseOutcome {
   if data.len() < 7 {
      return ParseOutcome::Incomplete;
   }
   let sub_opcode = data[6];
   if data.len() < 8 {
      return ParseOutcome::Incomplete;
   }
   let arg = data[7];

   match sub_opcode {
      SUBOP_NOISE_CONTROL => match arg {
         1 => ParseOutcome::Ok(Frame::NoiseControl(NoiseControlMode::Off)),
         2 => ParseOutcome::Ok(Frame::NoiseControl(NoiseControlMode::Anc)),
         3 => ParseOutcome::Ok(Frame::NoiseControl(NoiseControlMode::Transparency)),
         4 => ParseOutcome::Ok(Frame::NoiseControl(NoiseControlMode::Adaptive)),
         other => ParseOutcome::Malformed(format!("unknown noise-control byte: {other}")),
      },
      SUBOP_LISTENING_MODES => ParseOutcome::Ok(Frame::ListeningModes(ListeningModes::from_bits(arg))),
      SUBOP_CONVERSATIONAL_AWARENESS => match arg {
         1 => ParseOutcome::Ok(Frame::ConversationalAwareness(true)),
         2 => ParseOutcome::Ok(Frame::ConversationalAwareness(false)),
         other => ParseOutcome::Malformed(format!("unknown conversational-awareness byte: {other}")),
      },
      SUBOP_ADAPTIVE_LEVEL => ParseOutcome::Ok(Frame::AdaptiveLevel(arg.min(100))),
      _ => ParseOutcome::UnknownOpcode,
   }
}

fn parse_metadata(data: &[u8]) -> ParseOutcome {
   // header(4) + opcode(1) + 0x00(1) + 6 unspecified bytes = 12
   if data.len() < 13 {
      return ParseOutcome::Incomplete;
   }
   let strings = &data[12..];
   let mut fields = Vec::with_capacity(3);
   let mut rest = strings;
   for _ in 0..3 {
      let Some(nul) = rest.iter().position(|&b| b == 0) else {
         return ParseOutcome::Malformed("metadata frame missing NUL terminator".into());
      };
      let field = String::from_utf8_lossy(&rest[..nul.min(METADATA_FIELD_MAX)]).into_owned();
      fields.push(field);
      rest = &rest[nul + 1..];
   }

   ParseOutcome::Ok(Frame::Metadata(Metadata {
      name: fields[0].as_str().into(),
      model_number: fields[1].as_str().into(),
      manufacturer: fields[2].as_str().into(),
   }))
}

fn parse_ca_detection(data: &[u8]) -> ParseOutcome {
   if data.len() < 7 {
      return ParseOutcome::Incomplete;
   }
   ParseOutcome::Ok(Frame::CaDetection(CaDetection(data[6])))
}

#[cfg(test)]
mod tests {
   use super::*;

   fn hex(s: &str) -> Vec<u8> {
      hex::decode(s.replace(' ', "")).unwrap()
   }

   #[test]
   fn s1_battery_earbuds() {
      let data = hex("04 00 04 00 04 00 03 04 00 5A 02 00 02 00 50 02 00 08 00 64 01 00");
      let ParseOutcome::Ok(Frame::Battery(records)) = parse(&data) else {
         panic!("expected battery frame");
      };
      assert_eq!(records.len(), 3);
      assert_eq!(records[0].component, Component::Left);
      assert_eq!(records[0].state.level, 90);
      assert_eq!(records[0].state.status, crate::aap::protocol::BatteryStatus::Discharging);
      assert_eq!(records[1].component, Component::Right);
      assert_eq!(records[1].state.level, 80);
      assert_eq!(records[2].component, Component::Case);
      assert_eq!(records[2].state.level, 100);
      assert_eq!(records[2].state.status, crate::aap::protocol::BatteryStatus::Charging);
   }

   #[test]
   fn s2_battery_headphones() {
      let data = hex("04 00 04 00 04 00 01 01 00 46 02 00");
      let ParseOutcome::Ok(Frame::Battery(records)) = parse(&data) else {
         panic!("expected battery frame");
      };
      assert_eq!(records.len(), 1);
      assert_eq!(records[0].component, Component::Single);
      assert_eq!(records[0].state.level, 70);
   }

   #[test]
   fn s3_ear_detection() {
      let data = hex("04 00 04 00 06 00 01 00");
      let ParseOutcome::Ok(Frame::EarDetection { primary_in_ear, secondary_in_ear }) = parse(&data) else {
         panic!("expected ear detection frame");
      };
      assert!(!primary_in_ear);
      assert!(secondary_in_ear);
   }

   #[test]
   fn unknown_opcode_is_not_an_error() {
      let data = hex("04 00 04 00 FF 00");
      assert_eq!(parse(&data), ParseOutcome::UnknownOpcode);
   }

   #[test]
   fn invalid_header_rejected() {
      let data = hex("AA BB CC DD EE FF");
      assert_eq!(parse(&data), ParseOutcome::InvalidHeader);
   }

   #[test]
   fn battery_component_count_out_of_range_is_malformed() {
      let data = hex("04 00 04 00 04 00 04");
      assert!(matches!(parse(&data), ParseOutcome::Malformed(_)));
   }

   #[test]
   fn s6_metadata() {
      let mut data = hex("04 00 04 00 1D 00 00 00 00 00 00 00");
      data.extend_from_slice(b"Jordan's AirPods\0A2699\0Apple Inc.\0");
      let ParseOutcome::Ok(Frame::Metadata(meta)) = parse(&data) else {
         panic!("expected metadata frame");
      };
      assert_eq!(meta.model_number.as_str(), "A2699");
      assert_eq!(meta.manufacturer.as_str(), "Apple Inc.");
   }
}
