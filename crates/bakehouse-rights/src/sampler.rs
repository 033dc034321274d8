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

use bakehouse_kernel::{AccountId, Hasher};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SamplerError {
    #[error("cannot sample from an empty set of bakers")]
    Empty,
    #[error("cannot sample when every weight is zero")]
    ZeroTotalWeight,
    #[error("total weight does not fit in 64 bits")]
    Overflow,
}

/// Weighted random selection in constant time, using Vose's alias method.
///
/// The table is built with exact integer arithmetic so that every platform derives the very same
/// thresholds from the same weights. Each entry `i` owns the interval `[0, threshold[i])` of a
/// draw in `[0, total)`; the rest of the interval belongs to `alias[i]`.
///
/// Entries left over once one of the two stacks is exhausted always carry a residual weight
/// of exactly `total`, since the sum of residuals stays equal to `remaining * total` throughout the
/// pairing. Those keep the whole interval and have no alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampler {
    bakers: Vec<AccountId>,
    thresholds: Vec<u64>,
    aliases: Vec<Option<usize>>,
    total: u64,
}

impl Sampler {
    pub fn new(weights: &[(AccountId, u64)]) -> Result<Self, SamplerError> {
        if weights.is_empty() {
            return Err(SamplerError::Empty);
        }

        let total = weights
            .iter()
            .try_fold(0u64, |total, (_, weight)| total.checked_add(*weight))
            .ok_or(SamplerError::Overflow)?;

        if total == 0 {
            return Err(SamplerError::ZeroTotalWeight);
        }

        let n = weights.len() as u128;
        let total_scaled = u128::from(total);

        let mut scaled: Vec<u128> = weights
            .iter()
            .map(|(_, weight)| u128::from(*weight) * n)
            .collect();

        let mut light: Vec<usize> = Vec::new();
        let mut heavy: Vec<usize> = Vec::new();
        for (ix, q) in scaled.iter().enumerate() {
            if *q < total_scaled {
                light.push(ix);
            } else {
                heavy.push(ix);
            }
        }

        let mut thresholds = vec![total; weights.len()];
        let mut aliases = vec![None; weights.len()];

        while let (Some(l), Some(g)) = (light.pop(), heavy.pop()) {
            thresholds[l] = u64::try_from(scaled[l])
                .unwrap_or_else(|_| unreachable!("light entries are below the total weight"));
            aliases[l] = Some(g);

            scaled[g] = scaled[g] + scaled[l] - total_scaled;
            if scaled[g] < total_scaled {
                light.push(g);
            } else {
                heavy.push(g);
            }
        }

        Ok(Self {
            bakers: weights.iter().map(|(baker, _)| *baker).collect(),
            thresholds,
            aliases,
            total,
        })
    }

    /// Pick one baker from arbitrary seed bytes.
    pub fn sample(&self, seed: &[u8]) -> AccountId {
        let mut stream = SeedStream::new(seed);
        let ix = stream.take_below(self.bakers.len() as u64) as usize;
        let elt = stream.take_below(self.total);
        match self.aliases[ix] {
            Some(alias) if elt >= self.thresholds[ix] => self.bakers[alias],
            Some(_) | None => self.bakers[ix],
        }
    }

    pub fn bakers(&self) -> &[AccountId] {
        &self.bakers
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    pub fn aliases(&self) -> &[Option<usize>] {
        &self.aliases
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// An endless stream of 64-bit words derived from a seed: the seed is hashed once, each digest
/// yields four big-endian words, and an exhausted digest is hashed again.
pub struct SeedStream {
    digest: [u8; 32],
    offset: usize,
}

impl SeedStream {
    const WORD: usize = 8;

    pub fn new(seed: &[u8]) -> Self {
        Self {
            digest: *Hasher::<256>::hash(seed),
            offset: 0,
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        if self.offset + Self::WORD > self.digest.len() {
            self.digest = *Hasher::<256>::hash(&self.digest);
            self.offset = 0;
        }
        let mut word = [0u8; Self::WORD];
        word.copy_from_slice(&self.digest[self.offset..self.offset + Self::WORD]);
        self.offset += Self::WORD;
        u64::from_be_bytes(word)
    }

    /// Uniform draw in `[0, bound)`. Words falling in the incomplete last band of the 64-bit
    /// range are rejected, so the modulo introduces no bias.
    ///
    /// `bound` must be strictly positive.
    pub fn take_below(&mut self, bound: u64) -> u64 {
        let limit = (u64::MAX / bound) * bound;
        loop {
            let word = self.next_u64();
            if word < limit {
                return word % bound;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn bakers(weights: &[u64]) -> Vec<(AccountId, u64)> {
        weights
            .iter()
            .enumerate()
            .map(|(ix, weight)| (AccountId::new(ix as u32), *weight))
            .collect()
    }

    #[test_case(&[] => Err(SamplerError::Empty); "empty")]
    #[test_case(&[0, 0, 0] => Err(SamplerError::ZeroTotalWeight); "all zeros")]
    #[test_case(&[u64::MAX, 1] => Err(SamplerError::Overflow); "overflow")]
    fn degenerate_weights(weights: &[u64]) -> Result<(), SamplerError> {
        Sampler::new(&bakers(weights)).map(|_| ())
    }

    #[test]
    fn alias_table_example() {
        let sampler = Sampler::new(&bakers(&[10, 20, 30])).unwrap();
        assert_eq!(sampler.total(), 60);
        assert_eq!(sampler.thresholds(), &[30, 60, 60]);
        assert_eq!(sampler.aliases(), &[Some(2), None, None]);
    }

    #[test]
    fn zero_weight_is_never_selected_on_its_own() {
        let sampler = Sampler::new(&bakers(&[0, 5])).unwrap();
        assert_eq!(sampler.thresholds()[0], 0);
        assert_eq!(sampler.aliases()[0], Some(1));
        for i in 0u32..1_000 {
            assert_eq!(sampler.sample(&i.to_be_bytes()), AccountId::new(1));
        }
    }

    #[test]
    fn sampling_is_deterministic() {
        let sampler = Sampler::new(&bakers(&[3, 1, 4, 1, 5, 9, 2, 6])).unwrap();
        let seed = b"deterministic";
        let first = sampler.sample(seed);
        for _ in 0..10_000 {
            assert_eq!(sampler.sample(seed), first);
        }
    }

    #[test]
    fn sampling_follows_weights() {
        let sampler = Sampler::new(&bakers(&[10, 20, 30])).unwrap();
        let draws = 100_000u32;

        let mut counts: BTreeMap<AccountId, u32> = BTreeMap::new();
        for i in 0..draws {
            *counts.entry(sampler.sample(&i.to_be_bytes())).or_default() += 1;
        }

        for (ix, expected) in [10.0 / 60.0, 20.0 / 60.0, 30.0 / 60.0].iter().enumerate() {
            let observed = f64::from(counts[&AccountId::new(ix as u32)]) / f64::from(draws);
            assert!(
                (observed - expected).abs() < 0.01,
                "baker {ix}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn stream_rehashes_once_exhausted() {
        let mut stream = SeedStream::new(b"seed");
        let digest = *Hasher::<256>::hash(b"seed");
        let words: Vec<u64> = (0..5).map(|_| stream.next_u64()).collect();
        assert_eq!(words[0], u64::from_be_bytes(digest[0..8].try_into().unwrap()));
        assert_eq!(words[3], u64::from_be_bytes(digest[24..32].try_into().unwrap()));
        let next = *Hasher::<256>::hash(&digest);
        assert_eq!(words[4], u64::from_be_bytes(next[0..8].try_into().unwrap()));
    }

    prop_compose! {
        fn any_weights()(
            weights in prop::collection::vec(prop_oneof![Just(0u64), 1u64..1_000_000_000_000], 1..64)
        ) -> Vec<u64> {
            weights
        }
    }

    proptest! {
        #[test]
        fn alias_table_conserves_mass(weights in any_weights()) {
            prop_assume!(weights.iter().any(|w| *w > 0));
            let sampler = Sampler::new(&bakers(&weights)).unwrap();
            let n = weights.len() as u128;
            let total = u128::from(sampler.total());

            let mut mass: Vec<u128> = sampler.thresholds().iter().map(|p| u128::from(*p)).collect();
            for (ix, alias) in sampler.aliases().iter().enumerate() {
                prop_assert!(sampler.thresholds()[ix] <= sampler.total());
                match alias {
                    Some(target) => mass[*target] += total - u128::from(sampler.thresholds()[ix]),
                    None => prop_assert_eq!(sampler.thresholds()[ix], sampler.total()),
                }
            }

            for (ix, weight) in weights.iter().enumerate() {
                prop_assert_eq!(mass[ix], u128::from(*weight) * n);
            }
        }

        #[test]
        fn draws_stay_below_bound(seed in any::<[u8; 16]>(), bound in 1u64..u64::MAX) {
            let mut stream = SeedStream::new(&seed);
            for _ in 0..8 {
                prop_assert!(stream.take_below(bound) < bound);
            }
        }
    }
}
