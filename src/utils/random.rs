//! Process-wide random naming.
//!
//! Host-side veth names and env var suffixes only need to avoid collisions
//! among live objects on one node. The kernel rejecting a duplicate link name
//! is the collision detector, so no registry of used names is kept.

use crate::utils::constants::{
    ENV_VAR_NAME_PREFIX, ENV_VAR_NAME_SUFFIX_LEN, INTERFACE_NAME_LEN, INTERFACE_NAME_PREFIX,
    NAME_ALPHABET,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Source of bounded-length alphanumeric strings.
pub trait RandomSource: Send {
    /// Returns `len` characters drawn from [`NAME_ALPHABET`].
    fn alphanumeric(&mut self, len: usize) -> String;
}

/// Default source, seeded once from the OS at process start.
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[cfg(test)]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn alphanumeric(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| NAME_ALPHABET[self.rng.random_range(0..NAME_ALPHABET.len())] as char)
            .collect()
    }
}

/// Shared handle so the allocator and the attach worker draw from the same
/// seeded source.
pub type SharedRandom = Arc<Mutex<Box<dyn RandomSource>>>;

pub fn shared(source: impl RandomSource + 'static) -> SharedRandom {
    Arc::new(Mutex::new(Box::new(source)))
}

/// Host-side veth name: fixed prefix plus random suffix, never longer than
/// the kernel allows.
pub fn interface_name(random: &SharedRandom) -> String {
    let suffix_len = INTERFACE_NAME_LEN - INTERFACE_NAME_PREFIX.len();
    format!(
        "{}{}",
        INTERFACE_NAME_PREFIX,
        random.lock().alphanumeric(suffix_len)
    )
}

/// Name of the env var carrying a container's interface descriptor.
pub fn env_var_name(random: &SharedRandom) -> String {
    format!(
        "{}{}",
        ENV_VAR_NAME_PREFIX,
        random
            .lock()
            .alphanumeric(ENV_VAR_NAME_SUFFIX_LEN)
            .to_uppercase()
    )
}
