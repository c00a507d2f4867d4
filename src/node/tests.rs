//-------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;
    use std::collections::BTreeSet;
    use std::env;
    use std::ops::Bound::{Excluded, Unbounded};

    use crate::bitset::{Bitset, ELEM_MAX};
    use crate::node::SetOp;
    use crate::pack;

    // Reproducible runs: FUZZ_SEED picks the seed, FUZZ_ITER the length.
    fn seed() -> u64 {
        env::var("FUZZ_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(42)
    }

    fn iterations() -> usize {
        env::var("FUZZ_ITER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(400)
    }

    // The bitset driven in lockstep with a reference model.
    struct Fixture {
        bits: Bitset,
        model: BTreeSet<u64>,
        rng: ChaCha20Rng,
    }

    impl Fixture {
        fn new(salt: u64) -> Self {
            Fixture {
                bits: Bitset::new(),
                model: BTreeSet::new(),
                rng: ChaCha20Rng::seed_from_u64(seed() ^ salt),
            }
        }

        fn insert(&mut self, x: u64) {
            assert_eq!(self.bits.insert(x), self.model.insert(x), "insert {}", x);
        }

        fn remove(&mut self, x: u64) {
            assert_eq!(self.bits.remove(x), self.model.remove(&x), "remove {}", x);
        }

        fn verify_aggregates(&self) {
            assert_eq!(self.bits.count(), self.model.len() as u64);
            assert_eq!(self.bits.min(), self.model.iter().next().copied());
            assert_eq!(self.bits.max(), self.model.iter().next_back().copied());
            self.bits.check().unwrap();
        }

        fn verify_queries(&mut self, max_val: u64) {
            for _ in 0..20 {
                let x = self.rng.gen_range(0..=max_val);
                assert_eq!(self.bits.contains(x), self.model.contains(&x), "contains {}", x);

                let succ = self.model.range((Excluded(x), Unbounded)).next().copied();
                assert_eq!(self.bits.successor(x), succ, "successor {}", x);

                let pred = self.model.range(..x).next_back().copied();
                assert_eq!(self.bits.predecessor(x), pred, "predecessor {}", x);

                let a = self.rng.gen_range(0..=max_val);
                let b = self.rng.gen_range(0..=max_val);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let expected = self.model.range(lo..=hi).count() as u64;
                assert_eq!(self.bits.count_range(lo, hi), expected, "count {}..={}", lo, hi);
            }
        }

        fn verify_enumeration(&self) {
            let expected: Vec<u64> = self.model.iter().copied().collect();
            assert_eq!(self.bits.to_vec(), expected);
        }
    }

    fn drive(fix: &mut Fixture, max_val: u64, iters: usize) {
        for i in 0..iters {
            match fix.rng.gen_range(0..10) {
                0..=4 => {
                    let x = fix.rng.gen_range(0..=max_val);
                    fix.insert(x);
                }
                5..=7 => {
                    let x = fix.rng.gen_range(0..=max_val);
                    fix.remove(x);
                }
                8 => fix.verify_aggregates(),
                _ => fix.verify_queries(max_val),
            }

            if i % 64 == 0 {
                fix.verify_aggregates();
            }
        }
        fix.verify_aggregates();
        fix.verify_enumeration();
    }

    #[test]
    fn fuzz_small_universe() {
        let mut fix = Fixture::new(1);
        drive(&mut fix, 2000, iterations());
    }

    #[test]
    fn fuzz_dense_leaf() {
        // heavy collisions inside a single leaf
        let mut fix = Fixture::new(2);
        drive(&mut fix, 255, iterations());
    }

    #[test]
    fn fuzz_node32_universe() {
        let mut fix = Fixture::new(3);
        drive(&mut fix, 1 << 24, iterations());
    }

    #[test]
    fn fuzz_full_width() {
        // stresses promotion and the 64-bit tier
        let mut fix = Fixture::new(4);
        let max_val = ELEM_MAX;
        for _ in 0..iterations() {
            match fix.rng.gen_range(0..6) {
                0..=2 => {
                    let x = fix.rng.gen_range(0..=max_val);
                    fix.insert(x);
                }
                3 => {
                    // revisit an element we already hold, if any
                    let held = fix.model.iter().next().copied();
                    if let Some(x) = held {
                        fix.remove(x);
                    }
                }
                4 => {
                    let x = fix.rng.gen_range(0..=max_val);
                    fix.remove(x);
                }
                _ => fix.verify_queries(max_val),
            }
        }
        fix.verify_aggregates();
        fix.verify_enumeration();
    }

    #[test]
    fn fuzz_clustered_runs() {
        // contiguous runs force clusters to fill, compact and decompact
        let mut fix = Fixture::new(5);
        for _ in 0..iterations() / 4 {
            let base = fix.rng.gen_range(0..64u64) * 256;
            let len = fix.rng.gen_range(1..=256u64);
            if fix.rng.gen_bool(0.7) {
                for x in base..base + len {
                    fix.insert(x);
                }
            } else {
                for x in base..base + len {
                    fix.remove(x);
                }
            }
            fix.verify_aggregates();
        }
        fix.verify_queries(64 * 256);
        fix.verify_enumeration();
    }

    #[test]
    fn fuzz_set_algebra() {
        let mut rng = ChaCha20Rng::seed_from_u64(seed() ^ 6);
        let nr_sets = 5;
        let max_val = 500u64;

        let mut models: Vec<BTreeSet<u64>> = Vec::new();
        let mut sets: Vec<Bitset> = Vec::new();
        for _ in 0..nr_sets {
            let mut model = BTreeSet::new();
            let mut bits = Bitset::new();
            for _ in 0..rng.gen_range(10..50) {
                let x = rng.gen_range(0..max_val);
                model.insert(x);
                bits.insert(x);
            }
            models.push(model);
            sets.push(bits);
        }

        for _ in 0..iterations() / 2 {
            let op = match rng.gen_range(0..3) {
                0 => SetOp::Or,
                1 => SetOp::And,
                _ => SetOp::Xor,
            };

            let nr_srcs = rng.gen_range(1..=nr_sets);
            let mut picks: Vec<usize> = (0..nr_sets).collect();
            picks.shuffle(&mut rng);
            picks.truncate(nr_srcs);

            let srcs: Vec<&Bitset> = picks.iter().map(|&i| &sets[i]).collect();
            let result = Bitset::combine(op, &srcs);

            let mut expected = models[picks[0]].clone();
            for &i in &picks[1..] {
                expected = match op {
                    SetOp::Or => expected.union(&models[i]).copied().collect(),
                    SetOp::And => expected.intersection(&models[i]).copied().collect(),
                    SetOp::Xor => expected.symmetric_difference(&models[i]).copied().collect(),
                };
            }

            let expected_vec: Vec<u64> = expected.iter().copied().collect();
            assert_eq!(result.to_vec(), expected_vec);
            assert_eq!(result.count(), expected.len() as u64);
            result.check().unwrap();
        }
    }

    #[test]
    fn fuzz_serialization_roundtrip() {
        let mut fix = Fixture::new(7);
        for _ in 0..iterations() {
            let x = fix.rng.gen_range(0..1 << 20);
            fix.insert(x);
        }

        let mut buf = Vec::new();
        pack::pack(&fix.bits, &mut buf).unwrap();
        let reloaded = pack::unpack(&mut std::io::Cursor::new(buf)).unwrap();

        assert_eq!(reloaded.to_vec(), fix.bits.to_vec());
        assert_eq!(reloaded.count(), fix.bits.count());
        assert_eq!(reloaded.resident_clusters(), fix.bits.resident_clusters());
        reloaded.check().unwrap();
    }

    #[test]
    fn insert_then_remove_restores_state() {
        let mut fix = Fixture::new(8);
        for _ in 0..200 {
            let x = fix.rng.gen_range(0..100_000u64);
            fix.insert(x);
        }
        let before = fix.bits.to_vec();
        let before_clusters = fix.bits.resident_clusters();

        let probe = 40_000;
        let was_present = fix.bits.contains(probe);
        if !was_present {
            fix.insert(probe);
            fix.remove(probe);
            assert_eq!(fix.bits.to_vec(), before);
            assert_eq!(fix.bits.resident_clusters(), before_clusters);
        }
        fix.verify_aggregates();
    }
}

//-------------------------------------------------------------------------
