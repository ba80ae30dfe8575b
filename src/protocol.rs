// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire codec for sensor sources.
//!
//! # Wire Protocol
//!
//! ```text
//! client -> server   handshake token ("isu_pt")
//! server -> client   acknowledgement ("granted")
//! client -> server   poll request ("get")            } repeated,
//! server -> client   one measurement frame           } one per sample
//!
//! ┌────────────────────┬──────────────────────────┬──────────┐
//! │ Timestamp (8 bytes)│ Payload (per source kind)│ Checksum │
//! │ Big-endian i64, µs │ Big-endian fields        │ 1 byte   │
//! └────────────────────┴──────────────────────────┴──────────┘
//! ```
//!
//! The checksum is the sum of every timestamp and payload byte modulo 256.
//! It only catches accidental corruption and carries no security meaning.
//!
//! Everything in this module is pure and may be called from any number of
//! links at once.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default handshake token sent right after connecting.
pub const HANDSHAKE_TOKEN: &[u8] = b"isu_pt";

/// Default acknowledgement expected in reply to the handshake.
pub const ACK_TOKEN: &[u8] = b"granted";

/// Default poll request preceding every frame.
pub const POLL_REQUEST: &[u8] = b"get";

/// Size of the timestamp header in every frame.
pub const TIMESTAMP_LEN: usize = 8;

/// Size of the trailing checksum.
pub const CHECKSUM_LEN: usize = 1;

/// Payload layout of a sensor source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Kind A: f32 temperature followed by i16 pressure
    #[serde(alias = "a")]
    TemperaturePressure,
    /// Kind B: three i32 axes
    #[serde(alias = "b")]
    Triaxial,
}

impl SourceKind {
    pub const fn payload_len(self) -> usize {
        match self {
            SourceKind::TemperaturePressure => 4 + 2,
            SourceKind::Triaxial => 4 * 3,
        }
    }

    /// Total bytes on the wire for one frame of this kind.
    pub const fn frame_len(self) -> usize {
        TIMESTAMP_LEN + self.payload_len() + CHECKSUM_LEN
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::TemperaturePressure => "temperature_pressure",
            SourceKind::Triaxial => "triaxial",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f32),
    Int(i64),
}

/// Decoded payload of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    TemperaturePressure { temperature: f32, pressure: i16 },
    Triaxial { x: i32, y: i32, z: i32 },
}

impl Measurement {
    pub fn kind(&self) -> SourceKind {
        match self {
            Measurement::TemperaturePressure { .. } => SourceKind::TemperaturePressure,
            Measurement::Triaxial { .. } => SourceKind::Triaxial,
        }
    }

    /// Named fields in wire order.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        match *self {
            Measurement::TemperaturePressure {
                temperature,
                pressure,
            } => vec![
                ("temperature", FieldValue::Float(temperature)),
                ("pressure", FieldValue::Int(pressure.into())),
            ],
            Measurement::Triaxial { x, y, z } => vec![
                ("x", FieldValue::Int(x.into())),
                ("y", FieldValue::Int(y.into())),
                ("z", FieldValue::Int(z.into())),
            ],
        }
    }
}

/// A validated measurement, handed straight to the log writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Microseconds since the Unix epoch
    pub timestamp_us: i64,
    pub measurement: Measurement,
}

impl Record {
    pub fn new(timestamp_us: i64, measurement: Measurement) -> Self {
        Self {
            timestamp_us,
            measurement,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.measurement.kind()
    }
}

/// Single-frame decode failures. None of them end the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Frame oversized: expected {expected} bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },

    #[error("Checksum mismatch: frame carries {expected:#04x}, computed {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Handshake token pair spoken by a sensor source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    token: Bytes,
    ack: Bytes,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            token: Bytes::from_static(HANDSHAKE_TOKEN),
            ack: Bytes::from_static(ACK_TOKEN),
        }
    }
}

impl Handshake {
    pub fn new(token: impl Into<Bytes>, ack: impl Into<Bytes>) -> Self {
        Self {
            token: token.into(),
            ack: ack.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        self.token.clone()
    }

    pub fn ack(&self) -> &[u8] {
        &self.ack
    }

    /// Length of the acknowledgement the link has to read back.
    pub fn ack_len(&self) -> usize {
        self.ack.len()
    }

    pub fn decode_ack(&self, bytes: &[u8]) -> bool {
        bytes == self.ack.as_ref()
    }

    pub fn accepts_token(&self, bytes: &[u8]) -> bool {
        !self.token.is_empty()
            && bytes
                .windows(self.token.len())
                .any(|window| window == self.token.as_ref())
    }
}

/// Produce the default handshake token.
pub fn encode_handshake() -> Bytes {
    Handshake::default().encode()
}

/// True iff `bytes` equal the default acknowledgement.
pub fn decode_ack(bytes: &[u8]) -> bool {
    Handshake::default().decode_ack(bytes)
}

/// Sum of all bytes modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Decode exactly one frame of the given kind.
pub fn decode_frame(bytes: &[u8], kind: SourceKind) -> Result<Record, FrameError> {
    let expected = kind.frame_len();
    if bytes.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(FrameError::Oversized {
            expected,
            actual: bytes.len(),
        });
    }

    let (body, trailer) = bytes.split_at(expected - CHECKSUM_LEN);
    let carried = trailer[0];
    let computed = checksum(body);
    if carried != computed {
        return Err(FrameError::ChecksumMismatch {
            expected: carried,
            actual: computed,
        });
    }

    let mut buf = body;
    let timestamp_us = buf.get_i64();
    let measurement = match kind {
        SourceKind::TemperaturePressure => Measurement::TemperaturePressure {
            temperature: buf.get_f32(),
            pressure: buf.get_i16(),
        },
        SourceKind::Triaxial => Measurement::Triaxial {
            x: buf.get_i32(),
            y: buf.get_i32(),
            z: buf.get_i32(),
        },
    };

    Ok(Record::new(timestamp_us, measurement))
}

/// Encode a record exactly as a sensor source puts it on the wire.
pub fn encode_frame(record: &Record) -> Bytes {
    let kind = record.kind();
    let mut buf = BytesMut::with_capacity(kind.frame_len());
    buf.put_i64(record.timestamp_us);
    match record.measurement {
        Measurement::TemperaturePressure {
            temperature,
            pressure,
        } => {
            buf.put_f32(temperature);
            buf.put_i16(pressure);
        }
        Measurement::Triaxial { x, y, z } => {
            buf.put_i32(x);
            buf.put_i32(y);
            buf.put_i32(z);
        }
    }
    let sum = checksum(&buf);
    buf.put_u8(sum);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_a() -> Record {
        Record::new(
            1_609_459_200_000_000,
            Measurement::TemperaturePressure {
                temperature: 25.5,
                pressure: 760,
            },
        )
    }

    fn kind_b() -> Record {
        Record::new(
            1000,
            Measurement::Triaxial {
                x: 10,
                y: -20,
                z: 30,
            },
        )
    }

    #[test]
    fn test_frame_lengths() {
        assert_eq!(SourceKind::TemperaturePressure.frame_len(), 15);
        assert_eq!(SourceKind::Triaxial.frame_len(), 21);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[1, 2]), 3);
        assert_eq!(checksum(&[200, 100]), 44);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_handshake_defaults() {
        assert_eq!(encode_handshake().as_ref(), b"isu_pt");
        assert!(decode_ack(b"granted"));
        assert!(!decode_ack(b"denied!"));
        assert!(!decode_ack(b"grante"));
    }

    #[test]
    fn test_custom_handshake() {
        let handshake = Handshake::new(&b"hello"[..], &b"ok"[..]);
        assert_eq!(handshake.encode().as_ref(), b"hello");
        assert_eq!(handshake.ack_len(), 2);
        assert!(handshake.decode_ack(b"ok"));
        assert!(handshake.accepts_token(b"xxhelloyy"));
        assert!(!handshake.accepts_token(b"hell"));
    }

    #[test]
    fn test_decode_kind_a() {
        let bytes = encode_frame(&kind_a());
        let record = decode_frame(&bytes, SourceKind::TemperaturePressure).unwrap();
        assert_eq!(record, kind_a());
    }

    #[test]
    fn test_decode_kind_b_negative_values() {
        let bytes = encode_frame(&kind_b());
        let record = decode_frame(&bytes, SourceKind::Triaxial).unwrap();
        assert_eq!(record, kind_b());
    }

    #[test]
    fn test_decode_known_bytes() {
        // ts = 1000, temperature = 25.5 (0x41CC0000), pressure = 100
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0x03, 0xE8, 0x41, 0xCC, 0x00, 0x00, 0x00, 0x64];
        bytes.push(checksum(&bytes));
        let record = decode_frame(&bytes, SourceKind::TemperaturePressure).unwrap();
        assert_eq!(record.timestamp_us, 1000);
        assert_eq!(
            record.measurement,
            Measurement::TemperaturePressure {
                temperature: 25.5,
                pressure: 100
            }
        );
    }

    #[test]
    fn test_single_byte_mutation_is_rejected() {
        let bytes = encode_frame(&kind_b());
        for i in 0..bytes.len() - 1 {
            let mut corrupted = bytes.to_vec();
            corrupted[i] ^= 0x01;
            let err = decode_frame(&corrupted, SourceKind::Triaxial).unwrap_err();
            assert!(
                matches!(err, FrameError::ChecksumMismatch { .. }),
                "byte {} mutation not detected",
                i
            );
        }
    }

    #[test]
    fn test_all_zero_frame_with_bad_checksum() {
        let mut bytes = vec![0u8; 15];
        bytes[14] = 55;
        assert_eq!(
            decode_frame(&bytes, SourceKind::TemperaturePressure),
            Err(FrameError::ChecksumMismatch {
                expected: 55,
                actual: 0
            })
        );
    }

    #[test]
    fn test_length_errors() {
        let bytes = encode_frame(&kind_a());
        assert_eq!(
            decode_frame(&bytes[..10], SourceKind::TemperaturePressure),
            Err(FrameError::Truncated {
                expected: 15,
                actual: 10
            })
        );
        assert_eq!(
            decode_frame(&bytes, SourceKind::Triaxial),
            Err(FrameError::Truncated {
                expected: 21,
                actual: 15
            })
        );

        let mut longer = bytes.to_vec();
        longer.push(0);
        assert!(matches!(
            decode_frame(&longer, SourceKind::TemperaturePressure),
            Err(FrameError::Oversized { .. })
        ));
    }

    #[test]
    fn test_fields_in_wire_order() {
        let names: Vec<_> = kind_b().measurement.fields().iter().map(|f| f.0).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert_eq!(kind_a().kind(), SourceKind::TemperaturePressure);
    }

    #[test]
    fn test_source_kind_serde() {
        let kind: SourceKind = serde_yaml::from_str("a").unwrap();
        assert_eq!(kind, SourceKind::TemperaturePressure);
        let kind: SourceKind = serde_yaml::from_str("triaxial").unwrap();
        assert_eq!(kind, SourceKind::Triaxial);
        assert_eq!(serde_json::to_string(&SourceKind::Triaxial).unwrap(), "\"triaxial\"");
    }
}
