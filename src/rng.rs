//! # Randomness service: per-worker streams off one master seed.
//!
//! Every worker draws from its own [`RngStream`] so no sampling contends on
//! shared state and a run can be made reproducible by pinning the master
//! seed in the configuration (`RngSeed`). Streams are handed out by the
//! shared [`RngService`], which mixes the master seed with a monotonically
//! increasing stream index.
//!
//! Probabilistic branching and service-time sampling are the entire behavior
//! surface of the stage workers, so the stream API mirrors exactly what they
//! need: Bernoulli gates, clamped normals for inter-arrival times, uniform
//! service times, and weighted choices for order synthesis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Shared stream factory. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct RngService {
    master_seed: u64,
    streams: AtomicU64,
}

impl RngService {
    /// Creates the service with an explicit master seed, or from entropy
    /// when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let master_seed = seed.unwrap_or_else(|| rand::rng().random());
        Self {
            master_seed,
            streams: AtomicU64::new(0),
        }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Hands out the next independent stream.
    pub fn stream(&self) -> RngStream {
        let index = self.streams.fetch_add(1, Ordering::Relaxed);
        RngStream::from_seed(mix(self.master_seed, index))
    }
}

/// An independent random stream owned by exactly one task.
#[derive(Debug)]
pub struct RngStream {
    rng: StdRng,
}

impl RngStream {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// True with probability `p`. `p <= 0` never fires, `p >= 1` always.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.rng.random::<f64>() < p
    }

    /// Normal sample; a zero deviation collapses to the mean.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        }
    }

    /// Normal sample clamped into `[min, max]`.
    pub fn normal_clamped(&mut self, mean: f64, std_dev: f64, min: f64, max: f64) -> f64 {
        self.normal(mean, std_dev).clamp(min, max)
    }

    /// Uniform sample over `[min, max)`; swaps the bounds when reversed.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if hi - lo <= f64::EPSILON {
            return lo;
        }
        self.rng.random_range(lo..hi)
    }

    /// Uniform integer over the inclusive range; swaps reversed bounds.
    pub fn int_range(&mut self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.rng.random_range(lo..=hi)
    }

    /// Uniformly picks one element, `None` on an empty slice.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Picks by relative weight with cumulative-sum selection.
    ///
    /// Non-positive weights are skipped. Float drift at the top of the range
    /// lands on the last weighted entry. Returns `None` when no entry has a
    /// positive weight.
    pub fn weighted_choice<'a, T>(&mut self, entries: &'a [(T, f64)]) -> Option<&'a T> {
        let total: f64 = entries.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        let target = self.uniform(0.0, total);
        let mut cumulative = 0.0;
        let mut last = None;
        for (item, weight) in entries {
            if *weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last = Some(item);
            if target < cumulative {
                return Some(item);
            }
        }
        last
    }

    /// Uniform duration between `min_secs` and `max_secs`.
    pub fn duration_between(&mut self, min_secs: f64, max_secs: f64) -> Duration {
        Duration::from_secs_f64(self.uniform(min_secs, max_secs).max(0.0))
    }
}

/// SplitMix64 finalizer; decorrelates consecutive stream indices.
fn mix(seed: u64, index: u64) -> u64 {
    let mut z = seed ^ index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernoulli_edges_never_and_always_fire() {
        let mut stream = RngStream::from_seed(7);
        for _ in 0..100 {
            assert!(!stream.bernoulli(0.0));
            assert!(!stream.bernoulli(-1.0));
            assert!(stream.bernoulli(1.0));
            assert!(stream.bernoulli(1.5));
        }
    }

    #[test]
    fn zero_deviation_normal_returns_the_mean() {
        let mut stream = RngStream::from_seed(7);
        for _ in 0..10 {
            assert_eq!(stream.normal(4.2, 0.0), 4.2);
        }
    }

    #[test]
    fn clamped_normal_stays_inside_the_bounds() {
        let mut stream = RngStream::from_seed(7);
        for _ in 0..1000 {
            let x = stream.normal_clamped(1.0, 10.0, 0.0, 2.0);
            assert!((0.0..=2.0).contains(&x));
        }
    }

    #[test]
    fn uniform_swaps_reversed_bounds() {
        let mut stream = RngStream::from_seed(7);
        for _ in 0..100 {
            let x = stream.uniform(5.0, 1.0);
            assert!((1.0..5.0).contains(&x));
        }
        assert_eq!(stream.uniform(3.0, 3.0), 3.0);
    }

    #[test]
    fn int_range_is_inclusive() {
        let mut stream = RngStream::from_seed(7);
        let mut seen = [false; 4];
        for _ in 0..500 {
            let x = stream.int_range(0, 3);
            assert!((0..=3).contains(&x));
            seen[x as usize] = true;
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn weighted_choice_over_single_entry_returns_it() {
        let mut stream = RngStream::from_seed(7);
        let entries = [("only", 0.25)];
        for _ in 0..50 {
            assert_eq!(stream.weighted_choice(&entries), Some(&"only"));
        }
    }

    #[test]
    fn weighted_choice_skips_non_positive_weights() {
        let mut stream = RngStream::from_seed(7);
        let entries = [("never", 0.0), ("always", 1.0), ("negative", -3.0)];
        for _ in 0..100 {
            assert_eq!(stream.weighted_choice(&entries), Some(&"always"));
        }
        assert_eq!(stream.weighted_choice::<&str>(&[]), None);
    }

    #[test]
    fn same_seed_yields_the_same_sequence() {
        let service_a = RngService::new(Some(42));
        let service_b = RngService::new(Some(42));
        let mut a = service_a.stream();
        let mut b = service_b.stream();
        for _ in 0..100 {
            assert_eq!(a.int_range(0, 1000), b.int_range(0, 1000));
        }
    }

    #[test]
    fn streams_from_one_service_differ() {
        let service = RngService::new(Some(42));
        let mut first = service.stream();
        let mut second = service.stream();
        let a: Vec<i64> = (0..20).map(|_| first.int_range(0, 1_000_000)).collect();
        let b: Vec<i64> = (0..20).map(|_| second.int_range(0, 1_000_000)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn duration_between_respects_the_window() {
        let mut stream = RngStream::from_seed(7);
        for _ in 0..200 {
            let d = stream.duration_between(0.5, 1.0);
            assert!(d >= Duration::from_secs_f64(0.5));
            assert!(d < Duration::from_secs_f64(1.0));
        }
    }
}
