// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

/// Stateful `xoroshiro128+` generator shared (by seed) across a cluster.
///
/// * Not cryptographically secure.
/// * The master broadcasts one 32-bit seed at startup; every node seeds its
///   own instance from it, so redundant application code draws identical
///   sequences as long as each node consumes numbers in the same order.
#[derive(Debug, Clone, Copy)]
pub struct Prng {
    state: [u64; 2],
}

impl Prng {
    /// Constructs a PRNG from two 64-bit seeds.
    pub fn from_seed(seed0: u64, seed1: u64) -> Self {
        let mut state = [seed0, seed1];
        if state[0] == 0 && state[1] == 0 {
            state[0] = 0x9e37_79b9_7f4a_7c15;
        }
        Self { state }
    }

    /// Constructs a PRNG from a single 64-bit seed via SplitMix64 expansion.
    pub fn from_seed_u64(seed: u64) -> Self {
        fn splitmix64(state: &mut u64) -> u64 {
            *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = *state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        }

        let mut sm_state = seed;
        let a = splitmix64(&mut sm_state);
        let b = splitmix64(&mut sm_state);
        Self::from_seed(a, b)
    }

    /// Constructs a PRNG from the cluster's replicated 32-bit seed.
    pub fn from_cluster_seed(seed: u32) -> Self {
        Self::from_seed_u64(u64::from(seed))
    }

    /// Returns the next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(55) ^ s1 ^ (s1 << 14);
        self.state[1] = s1.rotate_left(36);

        result
    }

    /// Returns the next float in `[0, 1)` using the high 52 bits as mantissa.
    pub fn next_f64(&mut self) -> f64 {
        let bits = (self.next_u64() >> 12) | 0x3ff0_0000_0000_0000;
        f64::from_bits(bits) - 1.0
    }

    /// Returns the next integer in the inclusive range `[min, max]`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    // span <= 2^32 and value < span, so the casts are lossless.
    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation
    )]
    pub fn next_int(&mut self, min: i32, max: i32) -> i32 {
        assert!(min <= max, "invalid range: {min}..={max}");
        let span = (i64::from(max) - i64::from(min)) as u64 + 1;
        if span == 1 {
            return min;
        }

        let value = if span.is_power_of_two() {
            self.next_u64() & (span - 1)
        } else {
            let bound = u64::MAX - u64::MAX % span;
            loop {
                let candidate = self.next_u64();
                if candidate < bound {
                    break candidate % span;
                }
            }
        };

        let offset = value as i64 + i64::from(min);
        offset as i32
    }
}
