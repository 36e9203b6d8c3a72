//! Per-peer network behaviour profiles
//!
//! A profile governs two hooks consulted on every hop, inbound and outbound
//! independently: an added latency draw and a drop decision. Drops are silent;
//! the other side only ever observes a timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Probability that a failing peer drops a message on any single hop.
const FAILING_DROP_PROBABILITY: f64 = 0.35;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    Reliable,
    Standard,
    Latent,
    Failing,
}

/// A peer's behaviour profile with its own PRNG.
///
/// The PRNG is owned here rather than instantiated per draw; cloning the
/// profile shares it, so one peer makes one stream of draws no matter how
/// many connections are in flight.
#[derive(Clone, Debug)]
pub struct Profile {
    kind: ProfileKind,
    rng: Arc<Mutex<StdRng>>,
}

impl Profile {
    #[must_use]
    pub fn new(kind: ProfileKind) -> Self {
        Self {
            kind,
            rng: Arc::new(Mutex::new(StdRng::from_os_rng())),
        }
    }

    /// Seeded variant for deterministic tests.
    #[must_use]
    pub fn with_seed(kind: ProfileKind, seed: u64) -> Self {
        Self {
            kind,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Parse a profile name, case-insensitive. Unknown names fall back to
    /// standard, matching the CLI contract.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let kind = match name.to_ascii_lowercase().as_str() {
            "reliable" => ProfileKind::Reliable,
            "latent" => ProfileKind::Latent,
            "failing" => ProfileKind::Failing,
            _ => ProfileKind::Standard,
        };
        Self::new(kind)
    }

    #[must_use]
    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.kind {
            ProfileKind::Reliable => "reliable",
            ProfileKind::Standard => "standard",
            ProfileKind::Latent => "latent",
            ProfileKind::Failing => "failing",
        }
    }

    /// Whether to drop the message on this hop. Always false except under the
    /// failing profile.
    #[must_use]
    pub fn should_drop(&self) -> bool {
        match self.kind {
            ProfileKind::Failing => {
                let mut rng = self.rng.lock().unwrap();
                rng.random_bool(FAILING_DROP_PROBABILITY)
            }
            _ => false,
        }
    }

    /// Sleep for this profile's added per-hop latency.
    pub async fn delay(&self) {
        let duration = self.draw_delay();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    // The draw happens under the lock, the sleep after releasing it.
    fn draw_delay(&self) -> Duration {
        let millis = match self.kind {
            ProfileKind::Reliable => 0,
            ProfileKind::Standard => self.rng.lock().unwrap().random_range(20..60),
            ProfileKind::Latent => self.rng.lock().unwrap().random_range(200..600),
            ProfileKind::Failing => 10,
        };
        Duration::from_millis(millis)
    }
}
