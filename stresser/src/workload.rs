//! Per-worker workload generation: which operation to issue, which key to target, and what to
//! upload.
//!
//! Every worker owns its own [`SmallRng`] (see [`worker_rng`]), so no random state is shared
//! between workers.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::config::OperationMode;
use crate::executor::Operation;

/// Length of the random suffix of generated keys.
const KEY_SUFFIX_LEN: usize = 8;

/// Creates the private random generator of a worker.
///
/// The seed combines the wall clock with the worker identity, so workers started in the same
/// instant still draw independent streams.
pub fn worker_rng(worker: usize) -> SmallRng {
    SmallRng::seed_from_u64(unix_nanos().wrapping_add(worker as u64))
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

/// Picks the operation for the next iteration.
///
/// In [`OperationMode::Mixed`], every call flips an independent fair coin.
pub fn choose_operation(mode: OperationMode, rng: &mut impl Rng) -> Operation {
    match mode {
        OperationMode::Read => Operation::Get,
        OperationMode::Write => Operation::Put,
        OperationMode::Mixed => {
            if rng.random_bool(0.5) {
                Operation::Get
            } else {
                Operation::Put
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyPolicy {
    /// Walk the keys in order, starting at the worker's offset.
    Sequential { next: usize },
    /// Draw a uniformly distributed key for every request.
    Random,
}

/// Selects manifest keys for the GETs of a single worker.
///
/// In sequential mode worker `i` starts at key `i mod K` and advances by one after each GET.
/// Since every worker uses the same stride, the ranges visited by different workers overlap once
/// they wrap around; the key space is not partitioned between workers.
#[derive(Clone, Debug)]
pub struct KeyPicker {
    keys: Arc<[String]>,
    policy: KeyPolicy,
}

impl KeyPicker {
    /// Creates the picker of worker `worker` over `keys`.
    pub fn new(keys: Arc<[String]>, worker: usize, randomize: bool) -> Self {
        let policy = if randomize {
            KeyPolicy::Random
        } else {
            KeyPolicy::Sequential {
                next: worker.checked_rem(keys.len()).unwrap_or_default(),
            }
        };

        Self { keys, policy }
    }

    /// Returns the key for the next GET, or `None` if there are no keys at all.
    pub fn next_key(&mut self, rng: &mut impl Rng) -> Option<&str> {
        let count = self.keys.len();
        if count == 0 {
            return None;
        }

        let index = match &mut self.policy {
            KeyPolicy::Random => rng.random_range(0..count),
            KeyPolicy::Sequential { next } => {
                let index = *next % count;
                *next = (index + 1) % count;
                index
            }
        };

        Some(&self.keys[index])
    }
}

/// The identity embedded in generated keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOwner {
    /// A long-running worker in continuous mode.
    Worker(usize),
    /// A job from the queue in fixed-count generation mode.
    Job(usize),
}

impl fmt::Display for KeyOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker(id) => write!(f, "worker{id}"),
            Self::Job(id) => write!(f, "job{id}"),
        }
    }
}

/// Generates a fresh object key for an upload.
///
/// Keys look like `stresser/worker3/1718000000000000000-a8Xk2PqZ.dat`. The owner, the timestamp
/// and the random suffix make collisions practically impossible without any coordination.
pub fn generate_key(owner: KeyOwner, rng: &mut impl Rng) -> String {
    let suffix: String = (0..KEY_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();

    format!("stresser/{owner}/{}-{suffix}.dat", unix_nanos())
}

/// Produces pseudorandom upload payloads of a fixed size.
///
/// Every call returns a newly filled buffer so that stores cannot deduplicate uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadGenerator {
    size: usize,
}

impl PayloadGenerator {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// The size of every generated payload in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fills a new payload from `rng`.
    pub fn generate(&self, rng: &mut impl RngCore) -> Bytes {
        let mut payload = vec![0; self.size];
        rng.fill_bytes(&mut payload);
        payload.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(count: usize) -> Arc<[String]> {
        (0..count).map(|i| format!("key{i}")).collect()
    }

    #[test]
    fn sequential_starts_at_worker_offset_and_wraps() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut picker = KeyPicker::new(keys(3), 4, false);

        let picked: Vec<_> = (0..5)
            .map(|_| picker.next_key(&mut rng).unwrap().to_owned())
            .collect();
        assert_eq!(picked, ["key1", "key2", "key0", "key1", "key2"]);
    }

    #[test]
    fn sequential_workers_overlap() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut first = KeyPicker::new(keys(4), 0, false);
        let mut second = KeyPicker::new(keys(4), 1, false);

        first.next_key(&mut rng);
        // After one GET, worker 0 reaches the key worker 1 started on.
        assert_eq!(first.next_key(&mut rng), second.next_key(&mut rng));
    }

    #[test]
    fn random_covers_all_keys() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut picker = KeyPicker::new(keys(5), 0, true);

        let mut seen = [false; 5];
        for _ in 0..500 {
            let key = picker.next_key(&mut rng).unwrap();
            let index: usize = key.trim_start_matches("key").parse().unwrap();
            seen[index] = true;
        }
        assert!(seen.iter().all(|seen| *seen));
    }

    #[test]
    fn empty_keys_yield_nothing() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut picker = KeyPicker::new(keys(0), 3, false);
        assert_eq!(picker.next_key(&mut rng), None);
    }

    #[test]
    fn mixed_mode_is_roughly_even() {
        let mut rng = SmallRng::seed_from_u64(7);
        let gets = (0..10_000)
            .filter(|_| choose_operation(OperationMode::Mixed, &mut rng) == Operation::Get)
            .count();
        assert!((4_500..5_500).contains(&gets), "{gets} gets");

        assert_eq!(
            choose_operation(OperationMode::Read, &mut rng),
            Operation::Get
        );
        assert_eq!(
            choose_operation(OperationMode::Write, &mut rng),
            Operation::Put
        );
    }

    #[test]
    fn generated_keys_are_unique_and_well_formed() {
        let mut rng = SmallRng::seed_from_u64(1);
        let first = generate_key(KeyOwner::Worker(3), &mut rng);
        let second = generate_key(KeyOwner::Worker(3), &mut rng);

        assert_ne!(first, second);
        assert!(first.starts_with("stresser/worker3/"));
        assert!(first.ends_with(".dat"));
        assert!(generate_key(KeyOwner::Job(17), &mut rng).starts_with("stresser/job17/"));
    }

    #[test]
    fn payloads_are_fresh() {
        let mut rng = SmallRng::seed_from_u64(1);
        let generator = PayloadGenerator::new(1024);

        let first = generator.generate(&mut rng);
        let second = generator.generate(&mut rng);
        assert_eq!(first.len(), generator.size());
        assert_eq!(second.len(), 1024);
        assert_ne!(first, second);
    }
}
