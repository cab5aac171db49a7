// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packet framing and CBOR helpers.
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR [`OpEnvelope`]
//! * CHECKSUM = blake3-256 over HEADER || PAYLOAD

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{Message, OpEnvelope};

/// Protocol magic, "PONG".
pub const MAGIC: [u8; 4] = *b"PONG";
/// Wire version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags, zero in v1.
pub const FLAGS: u16 = 0x0000;
/// Header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Checksum length in bytes.
pub const CHECKSUM_LEN: usize = 32;
/// Largest payload a peer will accept.
pub const MAX_PAYLOAD: usize = 1 << 20;

/// Framing or codec failure.
#[derive(Debug, Error)]
pub enum WireError {
    /// Fewer bytes than the frame needs; read more and retry.
    #[error("incomplete packet: need {needed} bytes, have {have}")]
    Incomplete {
        /// Total bytes the frame needs.
        needed: usize,
        /// Bytes available.
        have: usize,
    },
    /// Leading bytes are not [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// Version field is not [`VERSION`].
    #[error("unsupported version {0:#06x}")]
    UnsupportedVersion(u16),
    /// Declared payload length exceeds [`MAX_PAYLOAD`].
    #[error("payload too large: {0} bytes")]
    TooLarge(usize),
    /// Checksum does not match header and payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Envelope op is not a known message.
    #[error("unknown op {0}")]
    UnknownOp(String),
    /// CBOR encoding failed.
    #[error("cbor encode: {0}")]
    Encode(String),
    /// CBOR decoding failed.
    #[error("cbor decode: {0}")]
    Decode(String),
}

impl WireError {
    /// True when more bytes may complete the frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

/// Encode `value` to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode CBOR bytes into `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// Header, payload and checksum of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw header.
    pub header: [u8; HEADER_LEN],
    /// CBOR payload bytes.
    pub payload: Vec<u8>,
    /// blake3 over header || payload.
    pub checksum: [u8; CHECKSUM_LEN],
}

fn checksum(header: &[u8], payload: &[u8]) -> blake3::Hash {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

impl Packet {
    /// Frame a CBOR payload.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, WireError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::TooLarge(payload.len()));
        }
        let len = u32::try_from(payload.len()).map_err(|_| WireError::TooLarge(payload.len()))?;
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
        header[8..12].copy_from_slice(&len.to_be_bytes());
        let checksum = *checksum(&header, &payload).as_bytes();
        Ok(Self { header, payload, checksum })
    }

    /// Concatenated frame bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum);
        out
    }

    /// Total frame length announced by a header, validating magic, version and size.
    pub fn frame_len(header: &[u8]) -> Result<usize, WireError> {
        if header.len() < HEADER_LEN {
            return Err(WireError::Incomplete { needed: HEADER_LEN, have: header.len() });
        }
        if header[0..4] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
        if len > MAX_PAYLOAD {
            return Err(WireError::TooLarge(len));
        }
        Ok(HEADER_LEN + len + CHECKSUM_LEN)
    }

    /// Encode an envelope into frame bytes.
    pub fn encode_envelope<P: Serialize>(env: &OpEnvelope<P>) -> Result<Vec<u8>, WireError> {
        Ok(Self::from_payload(to_cbor(env)?)?.to_bytes())
    }

    /// Decode one frame from the front of `bytes`; returns the envelope and bytes consumed.
    pub fn decode_envelope<P: DeserializeOwned>(bytes: &[u8]) -> Result<(OpEnvelope<P>, usize), WireError> {
        let total = Self::frame_len(bytes)?;
        if bytes.len() < total {
            return Err(WireError::Incomplete { needed: total, have: bytes.len() });
        }
        let header = &bytes[..HEADER_LEN];
        let payload = &bytes[HEADER_LEN..total - CHECKSUM_LEN];
        if checksum(header, payload).as_bytes() != &bytes[total - CHECKSUM_LEN..total] {
            return Err(WireError::ChecksumMismatch);
        }
        Ok((from_cbor(payload)?, total))
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, WireError> {
    Value::serialized(value).map_err(|e| WireError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value.deserialized().map_err(|e| WireError::Decode(e.to_string()))
}

/// Encode a message with logical timestamp `ts`.
pub fn encode_message(msg: &Message, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::InjectBall(p) | Message::DumpStats(p) => to_value(p)?,
        Message::ListParticipants => Value::Null,
        Message::Injected(p) => to_value(p)?,
        Message::Ignored(p) => to_value(p)?,
        Message::Stats(p) => to_value(p)?,
        Message::Participants(list) => to_value(list)?,
        Message::Error(p) => to_value(p)?,
    };
    let env = OpEnvelope { op: msg.op_name().to_owned(), ts, payload };
    Packet::encode_envelope(&env)
}

/// Decode one frame into `(message, ts, bytes_consumed)`.
pub fn decode_message(bytes: &[u8]) -> Result<(Message, u64, usize), WireError> {
    let (env, used) = Packet::decode_envelope::<Value>(bytes)?;
    let p = &env.payload;
    let msg = match env.op.as_str() {
        "inject_ball" => Message::InjectBall(from_value(p)?),
        "dump_stats" => Message::DumpStats(from_value(p)?),
        "list_participants" => Message::ListParticipants,
        "injected" => Message::Injected(from_value(p)?),
        "ignored" => Message::Ignored(from_value(p)?),
        "stats" => Message::Stats(from_value(p)?),
        "participants" => Message::Participants(from_value(p)?),
        "error" => Message::Error(from_value(p)?),
        other => return Err(WireError::UnknownOp(other.to_owned())),
    };
    Ok((msg, env.ts, used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorPayload, StatsPayload, TargetPayload};
    use rand::{Rng, SeedableRng};

    #[test]
    fn header_layout_is_fixed() {
        let bytes = encode_message(&Message::ListParticipants, 9).unwrap();
        assert_eq!(hex::encode(&bytes[0..8]), "504f4e4700010000");
        let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        assert_eq!(bytes.len(), HEADER_LEN + len + CHECKSUM_LEN);
    }

    #[test]
    fn stats_reply_survives_framing() {
        let msg = Message::Stats(StatsPayload {
            participant: 2,
            role: "middle".into(),
            state: "done".into(),
            round: 2,
            sent: 4,
            received: 4,
        });
        let bytes = encode_message(&msg, 3).unwrap();
        let (decoded, ts, used) = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(ts, 3);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut buf = encode_message(&Message::InjectBall(TargetPayload { participant: 1 }), 1).unwrap();
        buf.extend(encode_message(&Message::Error(ErrorPayload::new(404, "E", "m")), 2).unwrap());
        let (first, _, used) = decode_message(&buf).unwrap();
        assert!(first.is_request());
        let (second, ts, _) = decode_message(&buf[used..]).unwrap();
        assert_eq!(second.op_name(), "error");
        assert_eq!(ts, 2);
    }

    #[test]
    fn truncated_frame_is_incomplete() {
        let bytes = encode_message(&Message::DumpStats(TargetPayload { participant: 4 }), 0).unwrap();
        for cut in [0, 5, HEADER_LEN, bytes.len() - 1] {
            let err = decode_message(&bytes[..cut]).unwrap_err();
            assert!(err.is_incomplete(), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let clean = encode_message(&Message::DumpStats(TargetPayload { participant: 4 }), 0).unwrap();
        for _ in 0..16 {
            let mut bytes = clean.clone();
            let idx = rng.gen_range(HEADER_LEN..bytes.len());
            bytes[idx] ^= 0x5a;
            assert!(matches!(decode_message(&bytes), Err(WireError::ChecksumMismatch)));
        }
    }

    #[test]
    fn rejects_foreign_magic_and_version() {
        let mut bytes = encode_message(&Message::ListParticipants, 0).unwrap();
        bytes[0] = b'J';
        assert!(matches!(decode_message(&bytes), Err(WireError::BadMagic)));
        let mut bytes = encode_message(&Message::ListParticipants, 0).unwrap();
        bytes[5] = 9;
        assert!(matches!(decode_message(&bytes), Err(WireError::UnsupportedVersion(9))));
    }

    #[test]
    fn unknown_op_is_reported() {
        let env = OpEnvelope { op: "serve".to_owned(), ts: 0, payload: Value::Null };
        let bytes = Packet::encode_envelope(&env).unwrap();
        assert!(matches!(decode_message(&bytes), Err(WireError::UnknownOp(op)) if op == "serve"));
    }
}
