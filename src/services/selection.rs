//! Random reviewer selection.
//!
//! Callers pass candidates in id order so the generator is the only source
//! of variation between runs.

use rand::seq::SliceRandom;
use rand::Rng;

/// Maximum number of reviewers assigned when a pull request is created.
pub const MAX_REVIEWERS: usize = 2;

/// Shuffle `candidates` uniformly (Fisher-Yates) and keep the first `limit`.
pub fn pick_reviewers<R: Rng + ?Sized>(
    mut candidates: Vec<String>,
    limit: usize,
    rng: &mut R,
) -> Vec<String> {
    candidates.shuffle(rng);
    candidates.truncate(limit);
    candidates
}

/// Pick one candidate with equal probability, or `None` if there are none.
pub fn pick_one<'a, R: Rng + ?Sized>(candidates: &'a [String], rng: &mut R) -> Option<&'a String> {
    candidates.choose(rng)
}
