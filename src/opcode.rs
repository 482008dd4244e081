//! The closed set of Arcus opcodes.

/// Every message kind the protocol understands, in both directions. The codec
/// rejects any wire byte outside this set with `Error::InvalidHeader`.
///
/// Crosses the wire only as a `u8` via `as_u8`/`from_u8`, never as JSON, so
/// this doesn't derive `Serialize`/`Deserialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
  Hello = 0,
  SoftStop = 1,
  Allocated = 2,
  Metadata = 3,
  LiveStateRequest = 4,
  LiveStateResponse = 5,
  HostInformationRequest = 6,
  HostInformationResponse = 7,
  ApplicationInstanceInformationRequest = 8,
  ApplicationInstanceInformationResponse = 9,
  ApplicationInstanceGetStatusRequest = 10,
  ApplicationInstanceGetStatusResponse = 11,
  ApplicationInstanceSetStatusRequest = 12,
  ApplicationInstanceSetStatusResponse = 13,
  PlayerJoinedEventResponse = 14,
  PlayerLeftResponse = 15,
  Health = 16,
}

impl Opcode {
  pub const fn as_u8(self) -> u8 {
    self as u8
  }

  /// Maps a wire byte to an `Opcode`, or `None` if it falls outside the
  /// closed set (the codec turns that into `Error::InvalidHeader`).
  pub fn from_u8(value: u8) -> Option<Self> {
    Some(match value {
      0 => Self::Hello,
      1 => Self::SoftStop,
      2 => Self::Allocated,
      3 => Self::Metadata,
      4 => Self::LiveStateRequest,
      5 => Self::LiveStateResponse,
      6 => Self::HostInformationRequest,
      7 => Self::HostInformationResponse,
      8 => Self::ApplicationInstanceInformationRequest,
      9 => Self::ApplicationInstanceInformationResponse,
      10 => Self::ApplicationInstanceGetStatusRequest,
      11 => Self::ApplicationInstanceGetStatusResponse,
      12 => Self::ApplicationInstanceSetStatusRequest,
      13 => Self::ApplicationInstanceSetStatusResponse,
      14 => Self::PlayerJoinedEventResponse,
      15 => Self::PlayerLeftResponse,
      16 => Self::Health,
      _ => return None,
    })
  }
}

pub fn is_opcode_supported(value: u8) -> bool {
  Opcode::from_u8(value).is_some()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_every_variant() {
    for raw in 0..=16u8 {
      let op = Opcode::from_u8(raw).expect("every 0..=16 is supported");
      assert_eq!(op.as_u8(), raw);
    }
  }

  #[test]
  fn rejects_out_of_range_bytes() {
    assert!(Opcode::from_u8(17).is_none());
    assert!(Opcode::from_u8(255).is_none());
    assert!(!is_opcode_supported(200));
  }
}
