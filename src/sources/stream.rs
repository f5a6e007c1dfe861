//! Deterministic pseudo-random stream.
//!
//! Park–Miller minimal standard generator: multiplicative LCG with modulus
//! 2^31 − 1 and multiplier 16807. The same seed and the same sequence of
//! calls always produce the same outputs, which is what makes persisted data
//! sources replay identically after a save/load.

use std::f64::consts::PI;

const MODULUS: u64 = 2_147_483_647;
const MULTIPLIER: u64 = 16_807;

/// Smallest `u1` fed into the Box–Muller logarithm
const MIN_BOX_MULLER_U1: f64 = f64::EPSILON;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoRandomStream {
    state: u64,
}

impl PseudoRandomStream {
    /// Create a stream from any integer seed; the seed is normalized into
    /// `[1, 2^31 − 2]`.
    pub fn new(seed: i64) -> Self {
        Self {
            state: Self::normalize_seed(seed),
        }
    }

    /// Map an arbitrary seed into the generator's valid state range
    pub fn normalize_seed(seed: i64) -> u64 {
        match seed.rem_euclid(MODULUS as i64) {
            0 => MODULUS - 1,
            s => s as u64,
        }
    }

    /// Current internal state
    pub fn state(&self) -> u64 {
        self.state
    }

    fn next_state(&mut self) -> u64 {
        self.state = self.state * MULTIPLIER % MODULUS;
        self.state
    }

    /// Uniform value in `[0, 1)`
    pub fn random(&mut self) -> f64 {
        (self.next_state() - 1) as f64 / (MODULUS - 1) as f64
    }

    /// Uniform integer in `[min, max)`: `floor(random() * (max - min)) + min`
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        (self.random() * (max - min) as f64).floor() as i64 + min
    }

    /// Normal deviate via Box–Muller from two independent draws.
    /// `u1` is clamped away from zero so the logarithm stays finite.
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.random().max(MIN_BOX_MULLER_U1);
        let u2 = self.random();
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        z0 * std_dev + mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seed_normalization() {
        assert_eq!(PseudoRandomStream::normalize_seed(1), 1);
        assert_eq!(PseudoRandomStream::normalize_seed(0), MODULUS - 1);
        assert_eq!(PseudoRandomStream::normalize_seed(MODULUS as i64), MODULUS - 1);
        assert_eq!(PseudoRandomStream::normalize_seed(MODULUS as i64 + 5), 5);
        assert_eq!(PseudoRandomStream::normalize_seed(-1), MODULUS - 1);
        assert_eq!(PseudoRandomStream::normalize_seed(-2), MODULUS - 2);
        assert_eq!(PseudoRandomStream::normalize_seed(i64::MIN), 2_147_483_645);
    }

    #[test]
    fn test_known_sequence() {
        // Park–Miller reference: seed 1 → 16807, 282475249, 1622650073
        let mut stream = PseudoRandomStream::new(1);
        stream.random();
        assert_eq!(stream.state(), 16_807);
        stream.random();
        assert_eq!(stream.state(), 282_475_249);
        stream.random();
        assert_eq!(stream.state(), 1_622_650_073);
    }

    #[test]
    fn test_random_int_bounds() {
        let mut stream = PseudoRandomStream::new(42);
        for _ in 0..1000 {
            let v = stream.random_int(3, 7);
            assert!((3..7).contains(&v));
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut stream = PseudoRandomStream::new(12345);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| stream.gaussian(5.0, 2.0)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 5.0).abs() < 0.1, "mean was {mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std was {}", var.sqrt());
    }

    #[test]
    fn test_gaussian_finite_when_first_draw_is_zero() {
        // 1407677000 is the inverse of 16807 mod m, so the next state is 1
        // and the first uniform draw is exactly 0.
        let mut probe = PseudoRandomStream { state: 1_407_677_000 };
        assert_eq!(probe.random(), 0.0);

        let mut stream = PseudoRandomStream { state: 1_407_677_000 };
        assert!(stream.gaussian(0.0, 1.0).is_finite());
    }

    proptest! {
        #[test]
        fn test_same_seed_same_sequence(seed in any::<i64>(), n in 1usize..200) {
            let mut a = PseudoRandomStream::new(seed);
            let mut b = PseudoRandomStream::new(seed);
            for _ in 0..n {
                prop_assert_eq!(a.random().to_bits(), b.random().to_bits());
                prop_assert_eq!(a.gaussian(0.0, 1.0).to_bits(), b.gaussian(0.0, 1.0).to_bits());
            }
        }

        #[test]
        fn test_random_in_unit_interval(seed in any::<i64>()) {
            let mut s = PseudoRandomStream::new(seed);
            for _ in 0..100 {
                let v = s.random();
                prop_assert!((0.0..1.0).contains(&v));
            }
        }
    }
}
