// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `serde` helpers.
//!
//! Flash addresses and layout constants are far easier to read in hex, so
//! configuration accepts them as `"0x..."` strings as well as plain integers.

#![allow(clippy::from_str_radix_10)]

use core::fmt;
use core::fmt::LowerHex;
use core::fmt::Write as _;
use core::marker::PhantomData;
use core::num::ParseIntError;

use serde::de;
use serde::Deserializer;
use serde::Serializer;

/// No-std helper for using as a `write!()` target.
struct ArrayBuf<const N: usize>([u8; N], usize);

impl<const N: usize> AsRef<str> for ArrayBuf<N> {
    fn as_ref(&self) -> &str {
        // Only ever written to through `write_str()`.
        core::str::from_utf8(&self.0[..self.1]).unwrap_or("")
    }
}

impl<const N: usize> Default for ArrayBuf<N> {
    fn default() -> Self {
        Self([0; N], 0)
    }
}

impl<const N: usize> fmt::Write for ArrayBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let space_left = N - self.1;
        if space_left < bytes.len() {
            return Err(fmt::Error);
        }

        self.0[self.1..self.1 + bytes.len()].copy_from_slice(bytes);
        self.1 += bytes.len();
        Ok(())
    }
}

/// Splits a `0b`, `0o` or `0x` prefix off of `s`, returning the remaining
/// digits and their radix.
fn split_radix(s: &str) -> (&str, u32) {
    match s.get(..2) {
        Some("0b") | Some("0B") => (&s[2..], 2),
        Some("0o") | Some("0O") => (&s[2..], 8),
        Some("0x") | Some("0X") => (&s[2..], 16),
        _ => (s, 10),
    }
}

/// Parses an integer the same way [`de_radix()`] parses strings.
pub fn parse_int(s: &str) -> Result<u32, ParseIntError> {
    let (digits, radix) = split_radix(s);
    u32::from_str_radix(digits, radix)
}

/// Helper for `de_radix`.
pub struct Radix<T>(PhantomData<T>);

macro_rules! impl_radix {
    ($($ty:ident)*) => {$(
        impl<'de> de::Visitor<'de> for Radix<$ty> {
            type Value = $ty;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "integer between 0 and {}", $ty::MAX)
            }

            fn visit_str<E>(self, s: &str) -> Result<$ty, E>
                where E: de::Error,
            {
                let (digits, radix) = split_radix(s);
                $ty::from_str_radix(digits, radix).map_err(E::custom)
            }

            fn visit_u64<E>(self, n: u64) -> Result<$ty, E>
                where E: de::Error,
            {
                if n <= $ty::MAX as u64 {
                    Ok(n as $ty)
                } else {
                    let msg = concat!("integer between 0 and ", stringify!($ty), "::MAX");
                    Err(E::invalid_value(de::Unexpected::Unsigned(n), &msg))
                }
            }
        }
    )*}
}
impl_radix! {
    u32
}

/// Deserializes an integer from either a string (which supports hex encoding)
/// or a normal integer.
///
/// Unfortunately, the way this is implemented breaks non-self-describing
/// formats, but Serde support isn't really intended for that anways.
pub fn de_radix<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    Radix<T>: de::Visitor<'de, Value = T>,
{
    d.deserialize_any(Radix::<T>(PhantomData))
}

/// Serializes an integer as hex.
pub fn se_hex<S, X>(x: X, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    X: LowerHex,
{
    let mut buf = ArrayBuf::<18>::default();
    let _ = write!(buf, "0x{:x}", x);
    s.serialize_str(buf.as_ref())
}

#[cfg(test)]
mod test {
    use super::*;

    use serde::Deserialize;
    use serde::Serialize;

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    struct Addr {
        #[serde(deserialize_with = "de_radix", serialize_with = "se_hex")]
        addr: u32,
    }

    #[test]
    fn radix_round_trip() {
        for (json, addr) in &[
            (r#"{"addr": 4096}"#, 0x1000),
            (r#"{"addr": "0x04000000"}"#, 0x0400_0000),
            (r#"{"addr": "0b101"}"#, 5),
            (r#"{"addr": "0o17"}"#, 15),
            (r#"{"addr": "17"}"#, 17),
        ] {
            let parsed: Addr = serde_json::from_str(json).unwrap();
            assert_eq!(parsed.addr, *addr);
        }

        let json = serde_json::to_string(&Addr { addr: 0x80000 }).unwrap();
        assert_eq!(json, r#"{"addr":"0x80000"}"#);
        assert!(serde_json::from_str::<Addr>(r#"{"addr": "0xzz"}"#).is_err());
        assert!(serde_json::from_str::<Addr>(r#"{"addr": 4294967296}"#).is_err());
    }

    #[test]
    fn parse_int_prefixes() {
        assert_eq!(parse_int("0x1000"), Ok(0x1000));
        assert_eq!(parse_int("0B11"), Ok(3));
        assert_eq!(parse_int("0o17"), Ok(15));
        assert_eq!(parse_int("65536"), Ok(0x10000));
        assert!(parse_int("0x").is_err());
        assert!(parse_int("x10").is_err());
        assert!(parse_int("0x1_0000").is_err());
    }
}
