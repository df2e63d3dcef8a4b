//! The value carried through every pipeline buffer

use std::fmt;

/// One unit of pipeline data: an input byte or the end-of-stream sentinel
///
/// `End` lives outside the byte domain, so no input can be mistaken for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// A byte read from the source
    Byte(u8),
    /// No further input follows
    End,
}

impl Unit {
    /// Returns `true` for the end-of-stream sentinel
    #[must_use]
    pub fn is_end(self) -> bool {
        matches!(self, Unit::End)
    }

    /// The byte carried by this unit, if any
    #[must_use]
    pub fn byte(self) -> Option<u8> {
        match self {
            Unit::Byte(b) => Some(b),
            Unit::End => None,
        }
    }
}

impl From<u8> for Unit {
    fn from(byte: u8) -> Self {
        Unit::Byte(byte)
    }
}

impl From<Option<u8>> for Unit {
    fn from(byte: Option<u8>) -> Self {
        byte.map_or(Unit::End, Unit::Byte)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Byte(b) => write!(f, "{:?}", char::from(*b)),
            Unit::End => f.write_str("<end>"),
        }
    }
}
