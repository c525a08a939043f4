//! Spawn Point Randomness
//!
//! Seeded Xorshift128+ PRNG used for spawn and respawn positions.
//! Seeded per room so spawn sequences are reproducible in tests.

use crate::core::vec2::Vec2;

/// Small PRNG using the Xorshift128+ algorithm.
///
/// Given the same seed, produces the same sequence on all platforms.
#[derive(Clone, Debug)]
pub struct SpawnRng {
    state: [u64; 2],
}

impl Default for SpawnRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SpawnRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random f32 in `[0, 1)`.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // Upper 24 bits give full f32 mantissa precision
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a random f32 in `[min, max)`.
    #[inline]
    pub fn next_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        min + self.next_f32() * (max - min)
    }

    /// Generate a random point inside `[0, width) x [0, height)` with a margin
    /// kept from every edge.
    pub fn spawn_point(&mut self, width: f32, height: f32, margin: f32) -> Vec2 {
        let margin = margin.min(width / 2.0).min(height / 2.0);
        Vec2::new(
            self.next_range(margin, width - margin),
            self.next_range(margin, height - margin),
        )
    }
}

/// SplitMix64 step, used for seeding.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
