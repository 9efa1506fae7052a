//! Value types shared across the staging core: transaction identifiers,
//! SCNs, LOB identifiers, and the XID-to-container map key.
//!
//! Grounded on `examples/original_source/src/common/typeXid.h`,
//! `typeLobId.cpp`, and `types.h`.

use std::fmt;

use crate::error::Error;

pub type Usn = i16;
pub type Slt = u16;
pub type Sqn = u32;

/// A transaction identifier: `usn:slt:sqn` packed into one `u64` as
/// `usn << 48 | slt << 32 | sqn`, matching `typeXid`'s internal layout.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Xid(u64);

impl Xid {
    pub const FORMAT_TEXT_HEX: u8 = 0;
    pub const FORMAT_TEXT_DEC: u8 = 1;
    pub const FORMAT_NUMERIC: u8 = 2;
    pub const FORMAT_TEXT_ONLY_HEX: u8 = 3;

    pub fn new(usn: Usn, slt: Slt, sqn: Sqn) -> Self {
        Xid(((usn as u16 as u64) << 48) | ((slt as u64) << 32) | sqn as u64)
    }

    pub fn from_raw(data: u64) -> Self {
        Xid(data)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn usn(self) -> Usn {
        (self.0 >> 48) as u16 as i16
    }

    pub fn slt(self) -> Slt {
        ((self.0 >> 32) & 0xFFFF) as u16
    }

    pub fn sqn(self) -> Sqn {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parses the four textual forms `typeXid(const char*)` accepts, all
    /// hex: `UUUUSSSSQQQQQQQQ` (16, no separators), `UUUU.SSS.QQQQQQQQ`
    /// (17, 3-hex-digit SLT), `UUUU.SSSS.QQQQQQQQ` (18, 4-hex-digit SLT),
    /// and each of those three with a `0x` prefix (18/19/20). Any other
    /// length or a non-hex digit at a hex position is rejected.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let bytes = s.as_bytes();
        match bytes.len() {
            // "0x" + 4 hex usn + "." + 4 hex slt + "." + 8 hex sqn = 20
            20 if &s[0..2] == "0x" && s.as_bytes()[6] == b'.' && s.as_bytes()[11] == b'.' => {
                let usn = u16::from_str_radix(&s[2..6], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let slt = u16::from_str_radix(&s[7..11], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let sqn = u32::from_str_radix(&s[12..20], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                Ok(Xid::new(usn as i16, slt, sqn))
            }
            // 4 hex usn + "." + 4 hex slt + "." + 8 hex sqn = 18
            18 if s.as_bytes()[4] == b'.' && s.as_bytes()[9] == b'.' => {
                let usn = u16::from_str_radix(&s[0..4], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let slt = u16::from_str_radix(&s[5..9], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let sqn = u32::from_str_radix(&s[10..18], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                Ok(Xid::new(usn as i16, slt, sqn))
            }
            // plain 16-hex-digit numeric form (no separators)
            16 => {
                let raw =
                    u64::from_str_radix(s, 16).map_err(|_| Error::BadXid(s.to_string()))?;
                Ok(Xid(raw))
            }
            // "0x" + 16 hex digits = 18, handled above by the dotted form
            // check failing; fall through to bare 0x-prefixed numeric.
            18 => {
                if &s[0..2] == "0x" {
                    let raw = u64::from_str_radix(&s[2..], 16)
                        .map_err(|_| Error::BadXid(s.to_string()))?;
                    Ok(Xid(raw))
                } else {
                    Err(Error::BadXid(s.to_string()))
                }
            }
            // "UUUU.SSS.QQQQQQQQ": 4 hex usn + "." + 3 hex slt + "." + 8 hex
            // sqn = 17, dots at fixed indices 4 and 8.
            17 if s.as_bytes()[4] == b'.' && s.as_bytes()[8] == b'.' => {
                let usn = u16::from_str_radix(&s[0..4], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let slt = u16::from_str_radix(&s[5..8], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let sqn = u32::from_str_radix(&s[9..17], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                Ok(Xid::new(usn as i16, slt, sqn))
            }
            // "0x" + 4 hex usn + "." + 3 hex slt + "." + 8 hex sqn = 19,
            // dots at fixed indices 6 and 10.
            19 if &s[0..2] == "0x" && s.as_bytes()[6] == b'.' && s.as_bytes()[10] == b'.' => {
                let usn = u16::from_str_radix(&s[2..6], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let slt = u16::from_str_radix(&s[7..10], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                let sqn = u32::from_str_radix(&s[11..19], 16)
                    .map_err(|_| Error::BadXid(s.to_string()))?;
                Ok(Xid::new(usn as i16, slt, sqn))
            }
            _ => Err(Error::BadXid(s.to_string())),
        }
    }

    /// Formats in one of the four original output modes.
    pub fn format(self, mode: u8) -> String {
        match mode {
            Xid::FORMAT_TEXT_DEC => format!("{}.{}.{}", self.usn(), self.slt(), self.sqn()),
            Xid::FORMAT_NUMERIC => format!("{}", self.0),
            Xid::FORMAT_TEXT_ONLY_HEX => {
                let usn_sw = (self.usn() as u16).swap_bytes();
                let slt_sw = self.slt().swap_bytes();
                let sqn_sw = self.sqn().swap_bytes();
                format!("{:04x}{:04x}{:08x}", usn_sw, slt_sw, sqn_sw)
            }
            // FORMAT_TEXT_HEX and any unrecognized mode fall back to the
            // default dotted-hex rendering.
            _ => format!("{:04x}.{:04x}.{:08x}", self.usn() as u16, self.slt(), self.sqn()),
        }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(Xid::FORMAT_TEXT_HEX))
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid({})", self.format(Xid::FORMAT_TEXT_HEX))
    }
}

/// An SCN (system change number): a monotonically increasing log position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScnValue(pub u64);

impl ScnValue {
    /// `PRINTSCN48`-equivalent: high 16 bits and low 32 bits in hex,
    /// separated by a dot, followed by the decimal value.
    pub fn scn48(self) -> String {
        format!(
            "{:04x}.{:08x} ({})",
            (self.0 >> 32) & 0xFFFF,
            self.0 & 0xFFFF_FFFF,
            self.0
        )
    }

    /// `PRINTSCN64`-equivalent: full 64-bit value in hex plus decimal.
    pub fn scn64(self) -> String {
        format!("{:016x} ({})", self.0, self.0)
    }

    /// `PRINTSCN64D`-equivalent: high/mid/low split in hex plus decimal.
    pub fn scn64d(self) -> String {
        format!(
            "{:04x}.{:04x}.{:08x} ({})",
            (self.0 >> 48) & 0xFFFF,
            (self.0 >> 32) & 0xFFFF,
            self.0 & 0xFFFF_FFFF,
            self.0
        )
    }
}

impl fmt::Display for ScnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ScnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scn({})", self.scn64())
    }
}

pub const LOB_ID_LEN: usize = 10;

/// A 10-byte LOB identifier, compared and hashed byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LobId(pub [u8; LOB_ID_LEN]);

impl LobId {
    pub fn from_bytes(bytes: [u8; LOB_ID_LEN]) -> Self {
        LobId(bytes)
    }

    pub fn set(&mut self, bytes: &[u8]) {
        self.0.copy_from_slice(&bytes[..LOB_ID_LEN]);
    }

    /// Lowercase, zero-padded hex of all ten bytes.
    pub fn lower(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Uppercase, zero-padded hex of all ten bytes.
    pub fn upper(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Uppercase hex with no zero-padding per byte, matching `narrow()`'s
    /// terser (and non-fixed-width) rendering.
    pub fn narrow(&self) -> String {
        self.0.iter().map(|b| format!("{:X}", b)).collect()
    }
}

impl std::hash::Hash for LobId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Reproduces typeLobId's std::hash specialization exactly: XOR of
        // each byte shifted left by {0,6,12,18,24,30,36,42,50,56}, byte[9]
        // first. The jump from 42 to 50 (not 48) is load-bearing for
        // hash-stability parity and must not be "fixed".
        const SHIFTS: [u32; LOB_ID_LEN] = [56, 50, 42, 36, 30, 24, 18, 12, 6, 0];
        let mut acc: u64 = 0;
        for (i, shift) in SHIFTS.iter().enumerate() {
            acc ^= (self.0[i] as u64) << shift;
        }
        state.write_u64(acc);
    }
}

impl fmt::Debug for LobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LobId({})", self.upper())
    }
}

impl fmt::Display for LobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.upper())
    }
}

/// The key used to look up a transaction's container in `XidMap`:
/// `(conId << 32) | (xid.data >> 32)`, discarding the SQN and keeping
/// USN+SLT. `conId` is signed and sign-extends through the cast, so the
/// "no container" sentinel (`-1`) sets the upper 32 bits entirely rather
/// than only the low 16.
pub type XidMapKey = u64;

pub fn xid_map_key(xid: Xid, con_id: i16) -> XidMapKey {
    let con_part = (con_id as i64 as u64) << 32;
    con_part | (xid.as_u64() >> 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fields() {
        let x = Xid::new(5, 10, 123456);
        assert_eq!(x.usn(), 5);
        assert_eq!(x.slt(), 10);
        assert_eq!(x.sqn(), 123456);
    }

    #[test]
    fn parses_dotted_hex() {
        let x = Xid::new(0x12, 0x34, 0x5678);
        let s = x.format(Xid::FORMAT_TEXT_HEX);
        let parsed = Xid::parse(&s).unwrap();
        assert_eq!(parsed, x);
    }

    /// L1: every one of the four accepted textual forms round-trips back
    /// to the same `Xid`, modulo canonicalization to a single output form.
    #[test]
    fn all_four_textual_forms_round_trip() {
        let x = Xid::new(0x12, 0x34, 0x5678);

        let dotted_hex = format!("{:04x}.{:04x}.{:08x}", x.usn() as u16, x.slt(), x.sqn());
        assert_eq!(Xid::parse(&dotted_hex).unwrap(), x);

        let prefixed_hex = format!("0x{:04x}.{:04x}.{:08x}", x.usn() as u16, x.slt(), x.sqn());
        assert_eq!(Xid::parse(&prefixed_hex).unwrap(), x);

        let numeric_hex = format!("{:016x}", x.as_u64());
        assert_eq!(Xid::parse(&numeric_hex).unwrap(), x);

        let prefixed_numeric = format!("0x{:016x}", x.as_u64());
        assert_eq!(Xid::parse(&prefixed_numeric).unwrap(), x);

        // "UUUU.SSS.QQQQQQQQ": hex with a 3-hex-digit SLT, the slt value
        // itself must fit in 3 hex digits (< 0x1000) for this form.
        let narrow = Xid::new(0x00a0, 0x0b0, 0x0000_00c0);
        let dotted_hex_narrow_slt = format!(
            "{:04x}.{:03x}.{:08x}",
            narrow.usn() as u16,
            narrow.slt(),
            narrow.sqn()
        );
        assert_eq!(dotted_hex_narrow_slt, "00a0.0b0.000000c0");
        assert_eq!(Xid::parse(&dotted_hex_narrow_slt).unwrap(), narrow);

        let prefixed_hex_narrow_slt = format!("0x{dotted_hex_narrow_slt}");
        assert_eq!(Xid::parse(&prefixed_hex_narrow_slt).unwrap(), narrow);
    }

    #[test]
    fn malformed_xid_strings_are_rejected() {
        assert!(Xid::parse("not-an-xid").is_err());
        assert!(Xid::parse("1.2").is_err());
        assert!(Xid::parse("").is_err());
        assert!(Xid::parse("zzzz.zzzz.zzzzzzzz").is_err());
    }

    #[test]
    fn format_only_hex_byte_swaps_each_field() {
        let x = Xid::new(0x0102, 0x0304, 0x0506_0708);
        let s = x.format(Xid::FORMAT_TEXT_ONLY_HEX);
        assert_eq!(s, "0201040308070605");
    }

    #[test]
    fn map_key_sign_extends_negative_con_id() {
        let x = Xid::new(1, 2, 3);
        let key = xid_map_key(x, -1);
        assert_eq!(key >> 32, 0xFFFF_FFFF);
    }

    #[test]
    fn lob_id_hash_shift_sequence_is_stable() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let a = LobId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let b = LobId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }
}
