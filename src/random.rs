use rand::prelude::*;

/// The single source of randomness for a run.
///
/// Initial shuffling, the choice of the agent to move and the choice of its
/// destination all draw from the same seeded generator, so a configuration
/// and a seed fully determine a trajectory.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn from_seed(seed: u64) -> Self {
        RandomSelector { rng: StdRng::seed_from_u64(seed) }
    }

    /// Picks one element uniformly at random. `None` for an empty slice.
    pub fn uniform_choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Applies a uniform random permutation in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}
