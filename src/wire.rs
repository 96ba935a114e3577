// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Wire-format enums.
//!
//! Capsules are full of closed sets of magic numbers: content types, curve
//! identifiers, descriptor tags. This module provides [`WireEnum`], which
//! represents such a set as a C-like Rust enum, and the `wire_enum!` macro
//! that generates one.

use core::fmt;

use crate::io;
use crate::io::endian::LeInt;
use crate::io::Read;
use crate::Result;

/// Represents a C-like enum that can be converted to and from a wire
/// representation as well as to and from a string representation.
///
/// An implementation of this trait can be thought of as an unsigned
/// integer with a limited range: every enum variant can be converted
/// to the wire format and back, though not every value of the wire
/// representation can be converted into an enum variant.
///
/// In particular the following identity must hold for all types T:
/// ```
/// # use pfr_update::wire::WireEnum;
/// # fn test<T: WireEnum + Copy + PartialEq + std::fmt::Debug>(x: T) {
/// assert_eq!(T::from_wire_value(T::to_wire_value(x)), Some(x));
/// # }
/// ```
///
/// Also, the following identity must hold for all types T:
/// ```
/// # use pfr_update::wire::WireEnum;
/// # fn test<T: WireEnum + Copy + PartialEq + std::fmt::Debug>(x: T) {
/// assert_eq!(T::from_name(T::name(x)), Some(x));
/// # }
/// ```
pub trait WireEnum: Sized + Copy {
    /// The unrelying "wire type". This is almost always some kind of
    /// unsigned integer.
    type Wire;

    /// Converts `self` into its underlying wire representation.
    fn to_wire_value(self) -> Self::Wire;

    /// Attempts to parse a value of `Self` from the underlying wire
    /// representation.
    fn from_wire_value(wire: Self::Wire) -> Option<Self>;

    /// Converts `self` into a string representation.
    fn name(self) -> &'static str;

    /// Attempts to convert a value of `Self` from a string representation.
    fn from_name(str: &str) -> Option<Self>;

    /// Reads the wire value out of `r`, returning it raw alongside the
    /// variant it names, if any.
    ///
    /// The raw value is kept so that callers can report what they actually
    /// found when it is not a known variant.
    fn read_from<'a, R: Read<'a>>(
        mut r: R,
    ) -> Result<(Self::Wire, Option<Self>), io::Error>
    where
        Self::Wire: LeInt,
    {
        let wire = r.read_le::<Self::Wire>()?;
        Ok((wire, Self::from_wire_value(wire)))
    }
}

/// A deserialization-from-string error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WireEnumFromStrError;

impl fmt::Display for WireEnumFromStrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown variant")
    }
}

/// A conveinence macro for generating `WireEnum`-implementing enums.
///
/// Syntax is as follows:
/// ```text
/// wire_enum! {
///     /// This is my enum.
///     pub enum MyEnum : u8 {
///         /// Variant `A`.
///         A = 0x00,
///         /// Variant `B`.
///         B = 0x01,
///     }
/// }
/// ```
/// This macro will generate an implementation of `WireEnum<Wire=u8>` for
/// the above enum.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident : $wire:ident {
        $($(#[$meta_variant:meta])* $variant:ident = $value:tt,)*
    }) => {
        $(#[$meta])*
        #[repr($wire)]
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        $vis enum $name {
           $(
               $(#[$meta_variant])*
               $variant = $value,
           )*
        }

        impl $crate::wire::WireEnum for $name {
            type Wire = $wire;
            fn to_wire_value(self) -> Self::Wire {
                match self {
                    $(
                        Self::$variant => $value,
                    )*
                }
            }
            fn from_wire_value(wire: Self::Wire) -> Option<Self> {
                match wire {
                    $(
                        $value => Some(Self::$variant),
                    )*
                    _ => None,
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(
                        Self::$variant => stringify!($variant),
                    )*
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(
                        stringify!($variant) => Some(Self::$variant),
                    )*
                    _ => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                use $crate::wire::WireEnum;

                write!(f, "{}", self.name())
            }
        }

        impl core::str::FromStr for $name {
            type Err = $crate::wire::WireEnumFromStrError;

            fn from_str(
                s: &str
            ) -> core::result::Result<
                Self,
                $crate::wire::WireEnumFromStrError
            > {
                use $crate::wire::WireEnum;

                match $name::from_name(s) {
                    Some(val) => Ok(val),
                    None => Err($crate::wire::WireEnumFromStrError),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::wire::*;

    wire_enum! {
        /// An enum for testing.
        pub enum DemoEnum: u16 {
            /// First enum value
            First = 0x0001,

            /// Second enum value
            Second = 0x0200,
        }
    }

    #[test]
    fn names() {
        assert_eq!(DemoEnum::from_name("Second"), Some(DemoEnum::Second));
        assert_eq!(DemoEnum::from_name("does not exist"), None);
        assert_eq!(DemoEnum::First.name(), "First");
        assert_eq!("First".parse::<DemoEnum>(), Ok(DemoEnum::First));
        assert_eq!(DemoEnum::Second.to_string(), "Second");
    }

    #[test]
    fn read() {
        let mut bytes: &[u8] = &[0x00, 0x02, 0x05, 0x00];
        assert_eq!(
            DemoEnum::read_from(&mut bytes).unwrap(),
            (0x200, Some(DemoEnum::Second))
        );
        assert_eq!(DemoEnum::read_from(&mut bytes).unwrap(), (5, None));
        assert!(DemoEnum::read_from(&mut bytes).is_err());
    }
}
