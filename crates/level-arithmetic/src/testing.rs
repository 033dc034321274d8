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

use crate::{Cycle, CycleEra, CycleEras, Level};
use proptest::{prelude::*, prop_compose};

/// Three cycles of 4 levels, followed by an open-ended era of 8-level cycles.
#[allow(clippy::unwrap_used)]
pub fn two_eras() -> CycleEras {
    CycleEras::new(vec![
        CycleEra {
            first_level: Level::new(1),
            first_cycle: Cycle::new(0),
            blocks_per_cycle: 4,
        },
        CycleEra {
            first_level: Level::new(13),
            first_cycle: Cycle::new(3),
            blocks_per_cycle: 8,
        },
    ])
    .unwrap()
}

prop_compose! {
    pub fn any_cycle_eras()(
        shapes in prop::collection::vec((1u32..20, 1u32..64), 1..5)
    ) -> CycleEras {
        let mut eras: Vec<CycleEra> = Vec::with_capacity(shapes.len());
        let mut first_level = Level::new(1);
        let mut first_cycle = Cycle::new(0);
        for (cycles, blocks_per_cycle) in shapes {
            eras.push(CycleEra { first_level, first_cycle, blocks_per_cycle });
            first_level = first_level + cycles * blocks_per_cycle;
            first_cycle = first_cycle + cycles;
        }
        #[allow(clippy::unwrap_used)]
        let eras = CycleEras::new(eras).unwrap();
        eras
    }
}
