use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;
use crate::types::committee::CommitteeId;

/// Membership state of a validator within a committee.
///
/// `Add` never describes a live record; it only flags the promoted
/// validator inside a [`SwitchInfos`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValidatorState {
    Unused = 0,
    Used = 1,
    Switching = 2,
    Removed = 3,
    Add = 4,
}

impl ValidatorState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ValidatorState::Unused),
            1 => Some(ValidatorState::Used),
            2 => Some(ValidatorState::Switching),
            3 => Some(ValidatorState::Removed),
            4 => Some(ValidatorState::Add),
            _ => None,
        }
    }
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorState::Unused => "unused",
            ValidatorState::Used => "used",
            ValidatorState::Switching => "switching",
            ValidatorState::Removed => "removed",
            ValidatorState::Add => "add",
        };
        f.write_str(name)
    }
}

/// One validator's target flag in a membership snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEntry {
    pub public_key: PublicKey,
    pub flag: ValidatorState,
}

impl SwitchEntry {
    pub fn new(public_key: PublicKey, flag: ValidatorState) -> Self {
        SwitchEntry { public_key, flag }
    }
}

impl fmt::Display for SwitchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pk:{},flag:{}", self.public_key, self.flag)
    }
}

/// Full committee membership resulting from a substitution.
///
/// Entry order is significant: the `Add` entry (if any) comes first, then
/// the `Removed` entry, then the untouched `Used` members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchInfos {
    pub cid: CommitteeId,
    pub vals: Vec<SwitchEntry>,
}

impl SwitchInfos {
    /// The (remove, add) pair at the head of the snapshot, if it has that shape
    pub fn remove_add_pair(&self) -> Option<(&SwitchEntry, Option<&SwitchEntry>)> {
        match self.vals.as_slice() {
            [first, second, ..]
                if first.flag == ValidatorState::Add && second.flag == ValidatorState::Removed =>
            {
                Some((second, Some(first)))
            }
            [first, ..] if first.flag == ValidatorState::Removed => Some((first, None)),
            _ => None,
        }
    }
}
