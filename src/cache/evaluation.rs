//! Two-level memoization of observable evaluations.
//!
//! During a fit the minimizer probes a handful of parameter vectors per
//! iteration, and within one residual call every cycle count of a profile
//! shares the same exchange parameters. Two layers exploit that:
//!
//! - outer: (exchange parameters, chemical shift, ncyc) → unscaled intensity
//! - inner: exchange parameters → propagator bundle (capacity 1)
//!
//! Keys compare exact `f64` bit patterns plus an identity tag for context that
//! is not part of the argument tuple (nucleus, field, temperature, experiment).
//! One cache belongs to one `Profile`; it is not shared across threads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::cache::lru::LruCache;
use crate::error::AppError;
use crate::models::{ExchangeParams, ObservableArgs, ObservableCalculator, PropagatorSet};

pub const OBSERVABLE_CAPACITY: usize = 64;
pub const PROPAGATOR_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ObservableKey {
    tag: u64,
    values: [u64; 7],
    ncyc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExchangeKey {
    tag: u64,
    values: [u64; 7],
}

fn to_bits(values: [f64; 7]) -> [u64; 7] {
    values.map(f64::to_bits)
}

/// Hit/miss counters of both layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub observable_hits: u64,
    pub observable_misses: u64,
    pub propagator_hits: u64,
    pub propagator_misses: u64,
}

#[derive(Debug, Clone)]
pub struct EvaluationCache {
    tag: u64,
    observables: LruCache<ObservableKey, f64>,
    propagators: LruCache<ExchangeKey, Arc<PropagatorSet>>,
    stats: CacheStats,
}

impl EvaluationCache {
    /// New empty cache whose keys carry a hash of `identity`.
    pub fn new(identity: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        Self {
            tag: hasher.finish(),
            observables: LruCache::new(OBSERVABLE_CAPACITY),
            propagators: LruCache::new(PROPAGATOR_CAPACITY),
            stats: CacheStats::default(),
        }
    }

    /// Drop all memoized values and counters.
    pub fn reset(&mut self) {
        self.observables.clear();
        self.propagators.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Unscaled intensity for `args` after `ncyc` cycles, memoized.
    pub fn observable(
        &mut self,
        calculator: &ObservableCalculator,
        args: &ObservableArgs,
        ncyc: u32,
    ) -> Result<f64, AppError> {
        let key = ObservableKey {
            tag: self.tag,
            values: to_bits(args.key_values()),
            ncyc,
        };
        if let Some(&value) = self.observables.get(&key) {
            self.stats.observable_hits += 1;
            return Ok(value);
        }
        self.stats.observable_misses += 1;

        let exchange = calculator.exchange_params(args);
        let propagators = self.propagators(calculator, &exchange)?;
        let value = calculator.observable(&propagators, exchange.pb, ncyc)?;
        self.observables.put(key, value);
        Ok(value)
    }

    fn propagators(
        &mut self,
        calculator: &ObservableCalculator,
        exchange: &ExchangeParams,
    ) -> Result<Arc<PropagatorSet>, AppError> {
        let key = ExchangeKey {
            tag: self.tag,
            values: to_bits(exchange.key_values()),
        };
        if let Some(set) = self.propagators.get(&key) {
            self.stats.propagator_hits += 1;
            return Ok(Arc::clone(set));
        }
        self.stats.propagator_misses += 1;

        let set = Arc::new(PropagatorSet::build(calculator.geometry(), exchange)?);
        self.propagators.put(key, Arc::clone(&set));
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CpmgVariant;
    use crate::models::Geometry;

    fn calculator() -> ObservableCalculator {
        ObservableCalculator::new(Geometry {
            variant: CpmgVariant::NCwY,
            pw: 35e-6,
            time_t2: 0.04,
            time_equil: 0.0,
            carrier: 118.0,
            ppm_to_rads: 2.0 * std::f64::consts::PI * 600.0 * 0.101_329_118,
            ncyc_max: 10,
        })
    }

    fn args() -> ObservableArgs {
        ObservableArgs {
            pb: 0.05,
            kex: 500.0,
            dw: 2.0,
            cs: 118.0,
            r_nxy: 5.0,
            dr_nxy: 0.0,
            r_nz: 1.5,
        }
    }

    #[test]
    fn identical_inputs_hit_the_outer_layer() {
        let calc = calculator();
        let mut cache = EvaluationCache::new("g23n/600/25");
        let a = cache.observable(&calc, &args(), 4).unwrap();
        let b = cache.observable(&calc, &args(), 4).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
        let stats = cache.stats();
        assert_eq!(stats.observable_hits, 1);
        assert_eq!(stats.propagator_misses, 1);
    }

    #[test]
    fn cycle_counts_share_propagators() {
        let calc = calculator();
        let mut cache = EvaluationCache::new("g23n");
        for ncyc in [0, 1, 2, 4, 8] {
            cache.observable(&calc, &args(), ncyc).unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.propagator_misses, 1);
        assert_eq!(stats.propagator_hits, 4);
    }

    #[test]
    fn changing_exchange_parameters_rebuilds_propagators() {
        let calc = calculator();
        let mut cache = EvaluationCache::new("g23n");
        cache.observable(&calc, &args(), 2).unwrap();
        let mut changed = args();
        changed.kex = 501.0;
        cache.observable(&calc, &changed, 2).unwrap();
        // Capacity 1: going back to the first vector recomputes as well.
        cache.observable(&calc, &args(), 3).unwrap();
        assert_eq!(cache.stats().propagator_misses, 3);

        cache.reset();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
