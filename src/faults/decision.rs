//! Failure decisions.
//!
//! Every decision is a uniform percentage test: draw a roll in `[0, 100)`
//! and fail when the roll is below the configured rate. Rates of 0 and 100
//! never consult the random source.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FaultConfig;
use crate::faults::PrefixFailureTable;

/// Source of uniform rolls in `[0, 100)`.
pub trait RollSource: Send + Sync + std::fmt::Debug {
    fn roll(&self) -> u8;
}

/// Rolls from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl RollSource for ThreadRngSource {
    fn roll(&self) -> u8 {
        rand::thread_rng().gen_range(0..100)
    }
}

/// Reproducible rolls from a seeded generator.
#[derive(Debug)]
pub struct SeededSource {
    rng: Mutex<StdRng>,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RollSource for SeededSource {
    fn roll(&self) -> u8 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..100)
    }
}

/// Replays a fixed sequence of rolls, then keeps returning 99.
#[derive(Debug)]
pub struct ScriptedSource {
    rolls: Mutex<VecDeque<u8>>,
}

impl ScriptedSource {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        Self {
            rolls: Mutex::new(rolls.into_iter().collect()),
        }
    }
}

impl RollSource for ScriptedSource {
    fn roll(&self) -> u8 {
        self.rolls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(99)
    }
}

/// Decide a percentage test for the given roll.
pub fn should_fail(rate: u8, roll: impl FnOnce() -> u8) -> bool {
    match rate {
        0 => false,
        100.. => true,
        _ => roll() < rate,
    }
}

/// Failure decisions for one proxy instance.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    failure_rate: u8,
    transfer_failure_rate: u8,
    prefixes: PrefixFailureTable,
    source: Arc<dyn RollSource>,
}

impl FaultInjector {
    /// Create an injector drawing from the thread-local generator.
    pub fn new(config: &FaultConfig) -> Self {
        Self::with_source(config, Arc::new(ThreadRngSource))
    }

    pub fn with_source(config: &FaultConfig, source: Arc<dyn RollSource>) -> Self {
        Self {
            failure_rate: config.failure_rate,
            transfer_failure_rate: config.transfer_failure_rate,
            prefixes: config.fail_with_prefix.clone(),
            source,
        }
    }

    /// Whether the request should be failed outright with a 500.
    pub fn should_fail(&self) -> bool {
        should_fail(self.failure_rate, || self.source.roll())
    }

    /// Status code to fail with if `path` falls under a failing prefix.
    pub fn should_fail_by_prefix(&self, path: &str) -> Option<u16> {
        self.prefixes.match_path(path)
    }

    /// Whether streaming should stop after the chunk just written.
    pub fn should_abort_transfer(&self) -> bool {
        should_fail(self.transfer_failure_rate, || self.source.roll())
    }
}
