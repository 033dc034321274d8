// Copyright 2024 PRAGMA
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

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, RangeInclusive},
};

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Level & Cycle
// ----------------------------------------------------------------------------

/// The height of a block in the chain. The genesis block sits at level 0, and the first block
/// subject to rights sits at the first level of the first era.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Level(u32);

impl Level {
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// Number of levels from `earlier` (inclusive) up to `self` (exclusive).
    pub fn elapsed_since(self, earlier: Level) -> Option<u32> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<u32> for Level {
    fn from(level: u32) -> Self {
        Self(level)
    }
}

impl From<Level> for u32 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl Add<u32> for Level {
    type Output = Level;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-length window of levels over which rights, stakes and rewards are accounted.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cycle(u32);

impl Cycle {
    pub const fn new(cycle: u32) -> Self {
        Self(cycle)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl From<u32> for Cycle {
    fn from(cycle: u32) -> Self {
        Self(cycle)
    }
}

impl From<Cycle> for u32 {
    fn from(cycle: Cycle) -> Self {
        cycle.0
    }
}

impl Add<u32> for Cycle {
    type Output = Cycle;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Eras
// ----------------------------------------------------------------------------

/// A contiguous range of cycles sharing the same length. Eras change whenever a protocol
/// upgrade alters the number of blocks per cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEra {
    pub first_level: Level,
    pub first_cycle: Cycle,
    pub blocks_per_cycle: u32,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LevelArithmeticError {
    #[error("level {0} precedes the first era")]
    LevelBeforeFirstEra(Level),
    #[error("cycle {0} precedes the first era")]
    CycleBeforeFirstEra(Cycle),
    #[error("invalid cycle eras: {0}")]
    InvalidEras(String),
}

/// The first and last levels (both inclusive) of a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBounds {
    pub first: Level,
    pub last: Level,
}

impl CycleBounds {
    pub fn contains(&self, level: Level) -> bool {
        self.first <= level && level <= self.last
    }

    pub fn len(&self) -> u32 {
        self.last.0 - self.first.0 + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Raw level numbers, convenient for splitting work across threads.
    pub fn levels(&self) -> RangeInclusive<u32> {
        self.first.0..=self.last.0
    }
}

/// An ordered, gap-free history of cycle eras. The last era is open-ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CycleEra>", into = "Vec<CycleEra>")]
pub struct CycleEras {
    eras: Vec<CycleEra>,
}

impl TryFrom<Vec<CycleEra>> for CycleEras {
    type Error = LevelArithmeticError;

    fn try_from(eras: Vec<CycleEra>) -> Result<Self, Self::Error> {
        Self::new(eras)
    }
}

impl From<CycleEras> for Vec<CycleEra> {
    fn from(eras: CycleEras) -> Self {
        eras.eras
    }
}

impl CycleEras {
    pub fn new(eras: Vec<CycleEra>) -> Result<Self, LevelArithmeticError> {
        if eras.is_empty() {
            return Err(LevelArithmeticError::InvalidEras(
                "at least one era is required".to_string(),
            ));
        }

        if let Some(era) = eras.iter().find(|era| era.blocks_per_cycle == 0) {
            return Err(LevelArithmeticError::InvalidEras(format!(
                "era starting at cycle {} has no blocks",
                era.first_cycle
            )));
        }

        for pair in eras.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);

            if next.first_cycle <= previous.first_cycle {
                return Err(LevelArithmeticError::InvalidEras(format!(
                    "era starting at cycle {} does not follow cycle {}",
                    next.first_cycle, previous.first_cycle
                )));
            }

            let cycles = next.first_cycle.0 - previous.first_cycle.0;
            let expected = previous.first_level + cycles * previous.blocks_per_cycle;
            if next.first_level != expected {
                return Err(LevelArithmeticError::InvalidEras(format!(
                    "era starting at cycle {} should start at level {expected}, not {}",
                    next.first_cycle, next.first_level
                )));
            }
        }

        Ok(Self { eras })
    }

    /// A single, open-ended era starting at level 1 with cycle 0.
    pub fn single(blocks_per_cycle: u32) -> Result<Self, LevelArithmeticError> {
        Self::new(vec![CycleEra {
            first_level: Level(1),
            first_cycle: Cycle(0),
            blocks_per_cycle,
        }])
    }

    pub fn eras(&self) -> &[CycleEra] {
        &self.eras
    }

    fn era_for_level(&self, level: Level) -> Result<&CycleEra, LevelArithmeticError> {
        self.eras
            .iter()
            .rev()
            .find(|era| era.first_level <= level)
            .ok_or(LevelArithmeticError::LevelBeforeFirstEra(level))
    }

    fn era_for_cycle(&self, cycle: Cycle) -> Result<&CycleEra, LevelArithmeticError> {
        self.eras
            .iter()
            .rev()
            .find(|era| era.first_cycle <= cycle)
            .ok_or(LevelArithmeticError::CycleBeforeFirstEra(cycle))
    }

    pub fn level_to_cycle(&self, level: Level) -> Result<Cycle, LevelArithmeticError> {
        let era = self.era_for_level(level)?;
        let levels_elapsed = level.0 - era.first_level.0;
        Ok(era.first_cycle + levels_elapsed / era.blocks_per_cycle)
    }

    /// Zero-based position of a level within its cycle.
    pub fn level_position(&self, level: Level) -> Result<u32, LevelArithmeticError> {
        let era = self.era_for_level(level)?;
        Ok((level.0 - era.first_level.0) % era.blocks_per_cycle)
    }

    pub fn cycle_bounds(&self, cycle: Cycle) -> Result<CycleBounds, LevelArithmeticError> {
        let era = self.era_for_cycle(cycle)?;
        let first = era.first_level + (cycle.0 - era.first_cycle.0) * era.blocks_per_cycle;
        Ok(CycleBounds {
            first,
            last: first + (era.blocks_per_cycle - 1),
        })
    }

    pub fn blocks_per_cycle(&self, cycle: Cycle) -> Result<u32, LevelArithmeticError> {
        Ok(self.era_for_cycle(cycle)?.blocks_per_cycle)
    }

    pub fn is_cycle_start(&self, level: Level) -> Result<bool, LevelArithmeticError> {
        Ok(self.level_position(level)? == 0)
    }

    pub fn is_cycle_end(&self, level: Level) -> Result<bool, LevelArithmeticError> {
        let era = self.era_for_level(level)?;
        Ok(self.level_position(level)? == era.blocks_per_cycle - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{any_cycle_eras, two_eras};
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(1 => Cycle(0))]
    #[test_case(4 => Cycle(0))]
    #[test_case(5 => Cycle(1))]
    #[test_case(12 => Cycle(2))]
    #[test_case(13 => Cycle(3))]
    #[test_case(20 => Cycle(3))]
    #[test_case(21 => Cycle(4))]
    fn level_to_cycle_across_eras(level: u32) -> Cycle {
        two_eras().level_to_cycle(Level(level)).unwrap()
    }

    #[test_case(0 => (1, 4))]
    #[test_case(2 => (9, 12))]
    #[test_case(3 => (13, 20))]
    #[test_case(5 => (29, 36))]
    fn cycle_bounds_across_eras(cycle: u32) -> (u32, u32) {
        let bounds = two_eras().cycle_bounds(Cycle(cycle)).unwrap();
        (bounds.first.as_u32(), bounds.last.as_u32())
    }

    #[test]
    fn level_before_first_era() {
        assert_eq!(
            two_eras().level_to_cycle(Level(0)),
            Err(LevelArithmeticError::LevelBeforeFirstEra(Level(0)))
        );
    }

    #[test]
    fn start_and_end_of_cycles() {
        let eras = two_eras();
        assert!(eras.is_cycle_start(Level(13)).unwrap());
        assert!(!eras.is_cycle_end(Level(13)).unwrap());
        assert!(eras.is_cycle_end(Level(12)).unwrap());
        assert!(eras.is_cycle_end(Level(20)).unwrap());
        assert_eq!(eras.level_position(Level(15)), Ok(2));
    }

    #[test]
    fn reject_discontinuous_eras() {
        let eras = vec![
            CycleEra {
                first_level: Level(1),
                first_cycle: Cycle(0),
                blocks_per_cycle: 4,
            },
            CycleEra {
                first_level: Level(12),
                first_cycle: Cycle(3),
                blocks_per_cycle: 8,
            },
        ];
        assert!(matches!(
            CycleEras::new(eras),
            Err(LevelArithmeticError::InvalidEras(..))
        ));
    }

    #[test]
    fn reject_empty_cycles() {
        assert!(CycleEras::single(0).is_err());
    }

    #[test]
    fn deserialize_validates_eras() {
        let json = r#"[{"first_level":1,"first_cycle":0,"blocks_per_cycle":4},{"first_level":12,"first_cycle":3,"blocks_per_cycle":8}]"#;
        assert!(serde_json::from_str::<CycleEras>(json).is_err());

        let json = r#"[{"first_level":1,"first_cycle":0,"blocks_per_cycle":4},{"first_level":13,"first_cycle":3,"blocks_per_cycle":8}]"#;
        assert_eq!(serde_json::from_str::<CycleEras>(json).ok(), Some(two_eras()));
    }

    proptest! {
        #[test]
        fn level_belongs_to_its_cycle_bounds(eras in any_cycle_eras(), offset in 0u32..100_000) {
            let level = Level(1 + offset);
            let cycle = eras.level_to_cycle(level).unwrap();
            let bounds = eras.cycle_bounds(cycle).unwrap();
            prop_assert!(bounds.contains(level));
            prop_assert_eq!(
                eras.level_position(level).unwrap(),
                level.as_u32() - bounds.first.as_u32()
            );
            prop_assert_eq!(bounds.len(), eras.blocks_per_cycle(cycle).unwrap());
        }

        #[test]
        fn consecutive_cycles_are_adjacent(eras in any_cycle_eras(), cycle in 0u32..1_000) {
            let bounds = eras.cycle_bounds(Cycle(cycle)).unwrap();
            let next = eras.cycle_bounds(Cycle(cycle + 1)).unwrap();
            prop_assert_eq!(bounds.last.next(), next.first);
        }
    }
}
