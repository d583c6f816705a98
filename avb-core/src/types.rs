//! Small fixed-shape value types carried by AVB records

use std::fmt;
use uuid::Uuid;

/// 4-byte type code identifying a chunk's concrete class (`ABIN`, `CMPO`, ...).
///
/// Held in reading order; the codec reverses it on disk for little-endian sessions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// The code as it is stored for the given byte order.
    pub fn to_disk(self, order: crate::ByteOrder) -> [u8; 4] {
        let mut bytes = self.0;
        if order == crate::ByteOrder::Little {
            bytes.reverse();
        }
        bytes
    }

    /// Inverse of [`FourCC::to_disk`].
    pub fn from_disk(mut bytes: [u8; 4], order: crate::ByteOrder) -> Self {
        if order == crate::ByteOrder::Little {
            bytes.reverse();
        }
        Self(bytes)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{self}\")")
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(code: &[u8; 4]) -> Self {
        Self(*code)
    }
}

/// QuickDraw-style rectangle (stored with a version word of 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

impl Rect {
    pub const fn new(top: i16, left: i16, bottom: i16, right: i16) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }
}

/// 16-bit-per-channel RGB color (stored with a version word of 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RgbColor {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl RgbColor {
    pub const fn new(red: u16, green: u16, blue: u16) -> Self {
        Self { red, green, blue }
    }
}

/// Signed 32-bit rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

/// Standard SMPTE UMID universal label used for newly generated ids.
pub const UMID_LABEL: [u8; 12] = [
    0x06, 0x0a, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x0f, 0x00,
];

/// Material identifier used to cross-reference mobs.
///
/// A SMPTE UMID: 12-byte label, length byte, three instance bytes and a
/// material number carried as a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MobId {
    pub label: [u8; 12],
    pub length: u8,
    pub instance_high: u8,
    pub instance_mid: u8,
    pub instance_low: u8,
    pub material: Uuid,
}

impl MobId {
    /// Generates a fresh id with a random material number.
    pub fn new() -> Self {
        Self {
            label: UMID_LABEL,
            length: 0x13,
            instance_high: 0,
            instance_mid: 0,
            instance_low: 0,
            material: Uuid::new_v4(),
        }
    }
}

impl Default for MobId {
    fn default() -> Self {
        Self {
            label: [0; 12],
            length: 0,
            instance_high: 0,
            instance_mid: 0,
            instance_low: 0,
            material: Uuid::nil(),
        }
    }
}

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:smpte:umid:")?;
        let mut head = Vec::with_capacity(16);
        head.extend_from_slice(&self.label);
        head.extend_from_slice(&[
            self.length,
            self.instance_high,
            self.instance_mid,
            self.instance_low,
        ]);
        let groups = head
            .chunks(4)
            .map(hex::encode)
            .chain(
                self.material
                    .as_bytes()
                    .chunks(4)
                    .map(hex::encode),
            )
            .collect::<Vec<_>>();
        write!(f, "{}", groups.join("."))
    }
}
