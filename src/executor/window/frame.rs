// Copyright 2025 Relcore Contributors
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

//! Window frame options
//!
//! A frame clause packs into one bit set: the unit (ROWS, RANGE, GROUPS),
//! one start bound, one end bound and at most one exclusion. The bit values
//! are part of the serialized operator spec and must not change.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Frame option bit set
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameOptions(u32);

impl FrameOptions {
    /// Any option other than the default was given
    pub const NONDEFAULT: FrameOptions = FrameOptions(0x00001);
    pub const RANGE: FrameOptions = FrameOptions(0x00002);
    pub const ROWS: FrameOptions = FrameOptions(0x00004);
    pub const GROUPS: FrameOptions = FrameOptions(0x00008);
    /// BETWEEN given; END is meaningful
    pub const BETWEEN: FrameOptions = FrameOptions(0x00010);
    pub const START_UNBOUNDED_PRECEDING: FrameOptions = FrameOptions(0x00020);
    /// Disallowed
    pub const END_UNBOUNDED_PRECEDING: FrameOptions = FrameOptions(0x00040);
    /// Disallowed
    pub const START_UNBOUNDED_FOLLOWING: FrameOptions = FrameOptions(0x00080);
    pub const END_UNBOUNDED_FOLLOWING: FrameOptions = FrameOptions(0x00100);
    pub const START_CURRENT_ROW: FrameOptions = FrameOptions(0x00200);
    pub const END_CURRENT_ROW: FrameOptions = FrameOptions(0x00400);
    pub const START_OFFSET_PRECEDING: FrameOptions = FrameOptions(0x00800);
    pub const END_OFFSET_PRECEDING: FrameOptions = FrameOptions(0x01000);
    pub const START_OFFSET_FOLLOWING: FrameOptions = FrameOptions(0x02000);
    pub const END_OFFSET_FOLLOWING: FrameOptions = FrameOptions(0x04000);
    pub const EXCLUDE_CURRENT_ROW: FrameOptions = FrameOptions(0x08000);
    pub const EXCLUDE_GROUP: FrameOptions = FrameOptions(0x10000);
    pub const EXCLUDE_TIES: FrameOptions = FrameOptions(0x20000);

    pub const START_OFFSET: FrameOptions =
        FrameOptions(Self::START_OFFSET_PRECEDING.0 | Self::START_OFFSET_FOLLOWING.0);
    pub const END_OFFSET: FrameOptions =
        FrameOptions(Self::END_OFFSET_PRECEDING.0 | Self::END_OFFSET_FOLLOWING.0);
    pub const EXCLUSION: FrameOptions = FrameOptions(
        Self::EXCLUDE_CURRENT_ROW.0 | Self::EXCLUDE_GROUP.0 | Self::EXCLUDE_TIES.0,
    );

    /// RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
    pub const DEFAULTS: FrameOptions = FrameOptions(
        Self::RANGE.0 | Self::START_UNBOUNDED_PRECEDING.0 | Self::END_CURRENT_ROW.0,
    );

    const ALL: u32 = 0x3ffff;

    pub const fn empty() -> Self {
        FrameOptions(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits, rejecting unknown bits
    pub fn from_bits(bits: u32) -> Option<Self> {
        (bits & !Self::ALL == 0).then_some(FrameOptions(bits))
    }

    /// All bits of `other` are set
    pub const fn contains(&self, other: FrameOptions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any bit of `other` is set
    pub const fn intersects(&self, other: FrameOptions) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_rows(&self) -> bool {
        self.contains(Self::ROWS)
    }

    /// RANGE or GROUPS
    pub fn is_range_or_groups(&self) -> bool {
        self.intersects(FrameOptions(Self::RANGE.0 | Self::GROUPS.0))
    }

    pub fn has_exclusion(&self) -> bool {
        self.intersects(Self::EXCLUSION)
    }

    /// Exclusion bits only
    pub fn exclusion(&self) -> FrameOptions {
        *self & Self::EXCLUSION
    }

    /// The frame head may move as the current row advances
    pub fn head_can_move(&self) -> bool {
        !self.contains(Self::START_UNBOUNDED_PRECEDING)
    }

    /// Check the combination is one the executor can run
    pub fn validate(&self) -> Result<()> {
        let units = [Self::ROWS, Self::RANGE, Self::GROUPS]
            .iter()
            .filter(|u| self.contains(**u))
            .count();
        if units != 1 {
            return Err(Error::invalid_argument(format!(
                "frame options {} must name exactly one of ROWS, RANGE, GROUPS",
                self
            )));
        }
        let starts = [
            Self::START_UNBOUNDED_PRECEDING,
            Self::START_CURRENT_ROW,
            Self::START_OFFSET_PRECEDING,
            Self::START_OFFSET_FOLLOWING,
        ]
        .iter()
        .filter(|s| self.contains(**s))
        .count();
        let ends = [
            Self::END_UNBOUNDED_FOLLOWING,
            Self::END_CURRENT_ROW,
            Self::END_OFFSET_PRECEDING,
            Self::END_OFFSET_FOLLOWING,
        ]
        .iter()
        .filter(|e| self.contains(**e))
        .count();
        if starts != 1 || ends != 1 {
            return Err(Error::invalid_argument(format!(
                "frame options {} must have one start and one end bound",
                self
            )));
        }
        if self.intersects(FrameOptions(
            Self::END_UNBOUNDED_PRECEDING.0 | Self::START_UNBOUNDED_FOLLOWING.0,
        )) {
            return Err(Error::invalid_argument(
                "frame cannot start at UNBOUNDED FOLLOWING or end at UNBOUNDED PRECEDING",
            ));
        }
        if (self.exclusion().0).count_ones() > 1 {
            return Err(Error::invalid_argument(
                "frame may have at most one EXCLUDE option",
            ));
        }
        Ok(())
    }
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self::DEFAULTS
    }
}

impl BitOr for FrameOptions {
    type Output = FrameOptions;

    fn bitor(self, rhs: FrameOptions) -> FrameOptions {
        FrameOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for FrameOptions {
    fn bitor_assign(&mut self, rhs: FrameOptions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FrameOptions {
    type Output = FrameOptions;

    fn bitand(self, rhs: FrameOptions) -> FrameOptions {
        FrameOptions(self.0 & rhs.0)
    }
}

const NAMES: [(FrameOptions, &str); 18] = [
    (FrameOptions::NONDEFAULT, "NONDEFAULT"),
    (FrameOptions::RANGE, "RANGE"),
    (FrameOptions::ROWS, "ROWS"),
    (FrameOptions::GROUPS, "GROUPS"),
    (FrameOptions::BETWEEN, "BETWEEN"),
    (FrameOptions::START_UNBOUNDED_PRECEDING, "START_UNBOUNDED_PRECEDING"),
    (FrameOptions::END_UNBOUNDED_PRECEDING, "END_UNBOUNDED_PRECEDING"),
    (FrameOptions::START_UNBOUNDED_FOLLOWING, "START_UNBOUNDED_FOLLOWING"),
    (FrameOptions::END_UNBOUNDED_FOLLOWING, "END_UNBOUNDED_FOLLOWING"),
    (FrameOptions::START_CURRENT_ROW, "START_CURRENT_ROW"),
    (FrameOptions::END_CURRENT_ROW, "END_CURRENT_ROW"),
    (FrameOptions::START_OFFSET_PRECEDING, "START_OFFSET_PRECEDING"),
    (FrameOptions::END_OFFSET_PRECEDING, "END_OFFSET_PRECEDING"),
    (FrameOptions::START_OFFSET_FOLLOWING, "START_OFFSET_FOLLOWING"),
    (FrameOptions::END_OFFSET_FOLLOWING, "END_OFFSET_FOLLOWING"),
    (FrameOptions::EXCLUDE_CURRENT_ROW, "EXCLUDE_CURRENT_ROW"),
    (FrameOptions::EXCLUDE_GROUP, "EXCLUDE_GROUP"),
    (FrameOptions::EXCLUDE_TIES, "EXCLUDE_TIES"),
];

impl fmt::Display for FrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in NAMES.iter() {
            if self.contains(*flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(empty)")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameOptions({:#x}: {})", self.0, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame() {
        let f = FrameOptions::default();
        assert!(f.contains(FrameOptions::RANGE));
        assert!(!f.head_can_move());
        assert!(f.validate().is_ok());
        assert_eq!(f.bits(), 0x422);
    }

    #[test]
    fn test_serde_is_transparent() {
        let f = FrameOptions::NONDEFAULT
            | FrameOptions::ROWS
            | FrameOptions::BETWEEN
            | FrameOptions::START_OFFSET_PRECEDING
            | FrameOptions::END_OFFSET_FOLLOWING;
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, f.bits().to_string());
        let back: FrameOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let two_units = FrameOptions::ROWS
            | FrameOptions::RANGE
            | FrameOptions::START_CURRENT_ROW
            | FrameOptions::END_CURRENT_ROW;
        assert!(two_units.validate().is_err());
        let no_end = FrameOptions::ROWS | FrameOptions::START_CURRENT_ROW;
        assert!(no_end.validate().is_err());
        let two_excl = FrameOptions::ROWS
            | FrameOptions::START_CURRENT_ROW
            | FrameOptions::END_CURRENT_ROW
            | FrameOptions::EXCLUDE_GROUP
            | FrameOptions::EXCLUDE_TIES;
        assert!(two_excl.validate().is_err());
    }

    #[test]
    fn test_from_bits_rejects_unknown() {
        assert!(FrameOptions::from_bits(0x422).is_some());
        assert!(FrameOptions::from_bits(0x4_0000).is_none());
    }
}
