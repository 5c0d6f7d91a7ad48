//! Message kind packing: one 16-bit field carrying a (group, action) pair.
//!
//! The high byte selects the subsystem (`Group`), the low byte the operation
//! within it.  For the Custom group the action byte is not an enum at all –
//! it carries the numeric callback id directly, so the id space doubles as
//! the dispatch key.

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Protocol subsystems carried in the high byte of a [`Kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Group {
    /// Session management: init, close, echo.
    Comm = 0x01,
    /// Key lifecycle: cache, evict, commit, export, erase.
    Key = 0x02,
    /// Custom callback negotiation; the action byte is the callback id.
    Custom = 0x03,
}

impl TryFrom<u8> for Group {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Group::Comm),
            0x02 => Ok(Group::Key),
            0x03 => Ok(Group::Custom),
            _ => Err(()),
        }
    }
}

/// Actions within the Comm group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommAction {
    Init = 0x01,
    Close = 0x02,
    Echo = 0x03,
}

/// Actions within the Key group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyAction {
    Cache = 0x01,
    Evict = 0x02,
    Commit = 0x03,
    Export = 0x04,
    Erase = 0x05,
}

/// Packed (group, action) pair identifying a message's subsystem and
/// operation.  Compared for exact equality when correlating a response with
/// its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind(u16);

impl Kind {
    /// Packs a group and an action byte.
    pub fn new(group: Group, action: u8) -> Self {
        Kind(((group as u16) << 8) | action as u16)
    }

    /// Reconstructs a kind from its raw wire value.  No validation is done
    /// here; [`Kind::group`] reports an unknown group byte on splitting.
    pub fn from_raw(raw: u16) -> Self {
        Kind(raw)
    }

    /// The raw 16-bit wire value.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Splits out the subsystem, failing on an unrecognized group byte.
    pub fn group(self) -> Result<Group, WireError> {
        let byte = (self.0 >> 8) as u8;
        Group::try_from(byte).map_err(|_| WireError::UnknownGroup(byte))
    }

    /// The operation byte within the subsystem.
    pub fn action(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }
}
