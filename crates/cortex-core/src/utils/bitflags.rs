// Copyright 2025 eraflo
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

//! A macro to declare typed flag sets such as resource states and usages.

/// Declares a `Copy` flag-set newtype over an unsigned integer.
///
/// The generated type offers set algebra (`union`, `intersection`,
/// `difference`), containment queries, the bitwise operators, and a `Debug`
/// implementation that prints flag names. Multi-bit constants are printed
/// before the single bits they cover when declared first.
#[macro_export]
#[doc(hidden)]
macro_rules! cortex_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// The empty set.
            pub const EMPTY: Self = Self { bits: 0 };

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            const NAMED: &'static [(&'static str, $ty)] = &[
                $((stringify!($flag_name), $flag_value),)*
            ];

            /// Wraps raw bits, keeping bits that name no flag.
            #[inline]
            pub const fn from_bits_retain(bits: $ty) -> Self {
                Self { bits }
            }

            /// The raw bit pattern.
            #[inline]
            pub const fn bits(self) -> $ty {
                self.bits
            }

            /// `true` when no bit is set.
            #[inline]
            pub const fn is_empty(self) -> bool {
                self.bits == 0
            }

            /// `true` when every bit of `other` is also set in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.bits & other.bits == other.bits
            }

            /// `true` when `self` and `other` share at least one bit.
            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.bits & other.bits != 0
            }

            /// Bits set in either operand.
            #[inline]
            #[must_use]
            pub const fn union(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }

            /// Bits set in both operands.
            #[inline]
            #[must_use]
            pub const fn intersection(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }

            /// Bits of `self` that are not set in `other`.
            #[inline]
            #[must_use]
            pub const fn difference(self, other: Self) -> Self {
                Self { bits: self.bits & !other.bits }
            }

            /// Sets the bits of `other`.
            #[inline]
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Clears the bits of `other`.
            #[inline]
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Number of bits set.
            #[inline]
            pub const fn count(self) -> u32 {
                self.bits.count_ones()
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl core::ops::BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.insert(rhs);
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                self.intersection(rhs)
            }
        }

        impl core::ops::BitAndAssign for $name {
            #[inline]
            fn bitand_assign(&mut self, rhs: Self) {
                self.bits &= rhs.bits;
            }
        }

        impl core::ops::Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self.difference(rhs)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                if self.bits == 0 {
                    return write!(f, "{}(EMPTY)", stringify!($name));
                }
                write!(f, "{}(", stringify!($name))?;
                let mut rest = self.bits;
                let mut sep = "";
                for &(label, value) in Self::NAMED {
                    if value != 0 && rest & value == value {
                        write!(f, "{sep}{label}")?;
                        rest &= !value;
                        sep = " | ";
                    }
                }
                if rest != 0 {
                    write!(f, "{sep}{rest:#x}")?;
                }
                write!(f, ")")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::cortex_bitflags! {
        /// Flags used to exercise the macro.
        pub struct Access: u32 {
            const READ_ANY = (1 << 0) | (1 << 1);
            const VERTEX = 1 << 0;
            const PIXEL = 1 << 1;
            const WRITE = 1 << 4;
        }
    }

    #[test]
    fn test_empty_set() {
        assert!(Access::EMPTY.is_empty());
        assert_eq!(Access::default(), Access::EMPTY);
        assert_eq!(format!("{:?}", Access::EMPTY), "Access(EMPTY)");
    }

    #[test]
    fn test_composite_flag_prints_first() {
        assert_eq!(format!("{:?}", Access::VERTEX | Access::PIXEL), "Access(READ_ANY)");
        assert_eq!(
            format!("{:?}", Access::PIXEL | Access::WRITE),
            "Access(PIXEL | WRITE)"
        );
    }

    #[test]
    fn test_unknown_bits_are_kept() {
        let raw = Access::from_bits_retain(0x100 | 1);
        assert_eq!(raw.bits(), 0x101);
        assert_eq!(format!("{raw:?}"), "Access(VERTEX | 0x100)");
    }

    #[test]
    fn test_set_algebra() {
        let mut a = Access::VERTEX;
        a |= Access::WRITE;
        assert!(a.contains(Access::WRITE));
        assert!(a.intersects(Access::READ_ANY));
        assert!(!a.contains(Access::READ_ANY));
        assert_eq!(a - Access::WRITE, Access::VERTEX);
        assert_eq!(a & Access::READ_ANY, Access::VERTEX);
        a.remove(Access::VERTEX);
        assert_eq!(a, Access::WRITE);
        assert_eq!((Access::READ_ANY | Access::WRITE).count(), 3);
    }
}
