//! Core environment context trait for the treasury engine.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Golden-ratio multiplier used to spread seed extensions across the seed space.
const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Combines a master seed with a per-consumer extension.
///
/// Shared by every context implementation so that the same `(seed, extension)`
/// pair always yields the same stream, whichever runtime is driving.
pub fn mix_seed(seed: u64, seed_extension: u64) -> u64 {
    seed.wrapping_mul(SEED_MIX) ^ seed_extension.rotate_left(17)
}

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the coordinator and the
/// scenario runner can run in both production (tokio) and simulation
/// (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, entropy or a fixed seed
/// - **Simulation**: `SimContext` (in `treasury_sim`) - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// For simulation, all methods that would normally introduce non-determinism
/// (time, randomness) are controlled by the implementation.
#[async_trait]
pub trait EngineContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for response-time measurements.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for decision timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives an independent random stream from a seed extension.
    ///
    /// The coordinator calls this once per registered agent, so each agent
    /// draws from its own stream and adding an agent never perturbs the
    /// draws of the others.
    ///
    /// # Arguments
    /// * `seed_extension` - A value to combine with the global seed
    fn derive_rng(&self, seed_extension: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// Returns 0 when the context is not seeded.
    fn seed(&self) -> u64;

    /// Wall-clock time in milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_seed_is_stable() {
        assert_eq!(mix_seed(42, 1), mix_seed(42, 1));
        assert_ne!(mix_seed(42, 1), mix_seed(42, 2));
        assert_ne!(mix_seed(42, 1), mix_seed(43, 1));
    }
}
