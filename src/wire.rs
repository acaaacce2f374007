//! Fixed, big-endian wire framing for BEACON, LEARN, and TEACH messages.
//! Plain functions over [`bytes::{Buf, BufMut, BytesMut}`] rather than an
//! `Encoder`/`Decoder` impl: the medium hands back parsed [`Message`]
//! values, not a byte stream, so there is no substream framing layer to
//! attach a codec to here.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::{bloom::BloomFilter, identity::PeerId};

const TYPE_BEACON: u16 = 1;
const TYPE_LEARN: u16 = 2;
const TYPE_TEACH: u16 = 3;

/// `size(u16) + type(u16) + sender(32B)`.
pub const HEADER_LEN: usize = 2 + 2 + 32;

/// `peer(32B) + hops(i16) + next_tag(u32) + age(i64)`.
pub const FORWARD_LEN: usize = 32 + 2 + 4 + 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
  #[error("buffer too short: need at least {need} bytes, have {have}")]
  TooShort { need: usize, have: usize },

  #[error("unknown message type {0}")]
  UnknownType(u16),

  #[error("declared size {declared} does not match actual buffer length {actual}")]
  SizeMismatch { declared: usize, actual: usize },

  #[error("TEACH payload length {0} is not a multiple of the forward record size")]
  MisalignedTeachPayload(usize),

  #[error("LEARN filter declares {declared} bitset bytes but only {actual} remain")]
  TruncatedFilter { declared: usize, actual: usize },
}

/// A single forward announcement, as carried on the wire inside a TEACH
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forward {
  pub peer: PeerId,
  pub hops: i16,
  pub next_tag: u32,
  pub age: i64,
}

impl Forward {
  pub fn encode(&self, buf: &mut BytesMut) {
    buf.put_slice(self.peer.as_bytes());
    buf.put_i16(self.hops);
    buf.put_u32(self.next_tag);
    buf.put_i64(self.age);
  }

  pub fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
    if buf.remaining() < FORWARD_LEN {
      return Err(DecodeError::TooShort {
        need: FORWARD_LEN,
        have: buf.remaining(),
      });
    }
    let mut peer_bytes = [0u8; 32];
    buf.copy_to_slice(&mut peer_bytes);
    let hops = buf.get_i16();
    let next_tag = buf.get_u32();
    let age = buf.get_i64();
    Ok(Forward {
      peer: PeerId::new(peer_bytes),
      hops,
      next_tag,
      age,
    })
  }
}

/// The three message kinds exchanged between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
  Beacon {
    sender: PeerId,
  },
  Learn {
    sender: PeerId,
    filter: BloomFilter,
  },
  Teach {
    sender: PeerId,
    announce: Vec<Forward>,
  },
}

impl Message {
  pub fn sender(&self) -> PeerId {
    match self {
      Message::Beacon { sender } => *sender,
      Message::Learn { sender, .. } => *sender,
      Message::Teach { sender, .. } => *sender,
    }
  }

  fn type_tag(&self) -> u16 {
    match self {
      Message::Beacon { .. } => TYPE_BEACON,
      Message::Learn { .. } => TYPE_LEARN,
      Message::Teach { .. } => TYPE_TEACH,
    }
  }

  /// Encodes the message, populating `size` with the true byte length.
  pub fn encode(&self) -> BytesMut {
    let mut body = BytesMut::new();
    match self {
      Message::Beacon { .. } => {}
      Message::Learn { filter, .. } => {
        body.put_u32(filter.salt());
        body.put_u32(filter.num_bits());
        body.put_u32(filter.num_hashes());
        body.put_slice(filter.bits());
      }
      Message::Teach { announce, .. } => {
        for fwd in announce {
          fwd.encode(&mut body);
        }
      }
    }

    let size = HEADER_LEN + body.len();
    let mut out = BytesMut::with_capacity(size);
    out.put_u16(size as u16);
    out.put_u16(self.type_tag());
    out.put_slice(self.sender().as_bytes());
    out.extend_from_slice(&body);
    out
  }

  pub fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
    let total = buf.remaining();
    if total < HEADER_LEN {
      return Err(DecodeError::TooShort {
        need: HEADER_LEN,
        have: total,
      });
    }

    let size = buf.get_u16() as usize;
    let type_tag = buf.get_u16();
    let mut sender_bytes = [0u8; 32];
    buf.copy_to_slice(&mut sender_bytes);
    let sender = PeerId::new(sender_bytes);

    if size != total {
      return Err(DecodeError::SizeMismatch {
        declared: size,
        actual: total,
      });
    }

    match type_tag {
      TYPE_BEACON => Ok(Message::Beacon { sender }),
      TYPE_LEARN => {
        if buf.remaining() < 12 {
          return Err(DecodeError::TooShort {
            need: 12,
            have: buf.remaining(),
          });
        }
        let salt = buf.get_u32();
        let num_bits = buf.get_u32();
        let num_hashes = buf.get_u32();
        let num_bytes = (num_bits as usize + 7) / 8;
        if buf.remaining() < num_bytes {
          return Err(DecodeError::TruncatedFilter {
            declared: num_bytes,
            actual: buf.remaining(),
          });
        }
        let mut bits = vec![0u8; num_bytes];
        buf.copy_to_slice(&mut bits);
        Ok(Message::Learn {
          sender,
          filter: BloomFilter::from_parts(salt, num_bits, num_hashes, bits),
        })
      }
      TYPE_TEACH => {
        let remaining = buf.remaining();
        if remaining % FORWARD_LEN != 0 {
          return Err(DecodeError::MisalignedTeachPayload(remaining));
        }
        let count = remaining / FORWARD_LEN;
        let mut announce = Vec::with_capacity(count);
        for _ in 0..count {
          announce.push(Forward::decode(buf)?);
        }
        Ok(Message::Teach { sender, announce })
      }
      other => Err(DecodeError::UnknownType(other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn peer(b: u8) -> PeerId {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    PeerId::new(bytes)
  }

  #[test]
  fn beacon_round_trips() {
    let msg = Message::Beacon { sender: peer(1) };
    let mut encoded = msg.encode();
    assert_eq!(encoded.len(), 36);
    let decoded = Message::decode(&mut encoded).unwrap();
    assert_eq!(decoded, msg);
  }

  #[test]
  fn learn_round_trips_filter_bits() {
    let mut filter = BloomFilter::new(99, 5, 0.1);
    filter.insert(peer(3).as_bytes());
    let msg = Message::Learn {
      sender: peer(2),
      filter: filter.clone(),
    };
    let mut encoded = msg.encode();
    let decoded = Message::decode(&mut encoded).unwrap();
    match decoded {
      Message::Learn {
        sender,
        filter: decoded_filter,
      } => {
        assert_eq!(sender, peer(2));
        assert_eq!(decoded_filter, filter);
      }
      _ => panic!("expected Learn"),
    }
  }

  #[test]
  fn teach_round_trips_announcement_vector() {
    let announce = vec![
      Forward {
        peer: peer(5),
        hops: 2,
        next_tag: 0xdead_beef,
        age: 123_456,
      },
      Forward {
        peer: peer(6),
        hops: -1,
        next_tag: 0,
        age: -1,
      },
    ];
    let msg = Message::Teach {
      sender: peer(4),
      announce: announce.clone(),
    };
    let mut encoded = msg.encode();
    let decoded = Message::decode(&mut encoded).unwrap();
    match decoded {
      Message::Teach {
        sender,
        announce: decoded_announce,
      } => {
        assert_eq!(sender, peer(4));
        assert_eq!(decoded_announce, announce);
      }
      _ => panic!("expected Teach"),
    }
  }

  #[test]
  fn empty_teach_is_valid() {
    let msg = Message::Teach {
      sender: peer(1),
      announce: vec![],
    };
    let mut encoded = msg.encode();
    assert_eq!(encoded.len(), HEADER_LEN);
    assert_eq!(Message::decode(&mut encoded).unwrap(), msg);
  }

  #[test]
  fn rejects_unknown_type() {
    let mut msg = Message::Beacon { sender: peer(1) }.encode();
    // overwrite the type field (bytes 2..4) with an unknown tag
    msg[2] = 0xff;
    msg[3] = 0xff;
    assert_eq!(
      Message::decode(&mut msg),
      Err(DecodeError::UnknownType(0xffff))
    );
  }

  #[test]
  fn rejects_misaligned_teach_payload() {
    let mut bytes = BytesMut::new();
    bytes.put_u16((HEADER_LEN + 3) as u16);
    bytes.put_u16(TYPE_TEACH);
    bytes.put_slice(peer(1).as_bytes());
    bytes.put_slice(&[0u8; 3]);
    assert_eq!(
      Message::decode(&mut bytes),
      Err(DecodeError::MisalignedTeachPayload(3))
    );
  }

  #[test]
  fn rejects_short_buffer() {
    let mut bytes = BytesMut::new();
    bytes.put_u16(10);
    assert_eq!(
      Message::decode(&mut bytes),
      Err(DecodeError::TooShort {
        need: HEADER_LEN,
        have: 2
      })
    );
  }
}
