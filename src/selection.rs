//! Span validator selection.
//!
//! The committee for a span is drawn by weighted random sampling over the
//! eligible validators reported by the stake contract. The stream is seeded
//! from the chain itself (leading eight bytes of a past block hash), so every
//! node derives the same committee; ChaCha gives a portable, platform-stable
//! stream for that seed.

use crate::errors::EngineError;
use crate::header::ValidatorInfo;
use alloy_primitives::B256;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Number of blocks behind the span-update block the seed header sits.
pub const SEED_LOOKBACK: u64 = 5;

/// Derive the sampling seed from a seed-block hash.
pub fn derive_seed(seed_hash: B256) -> u64 {
    u64::from_be_bytes(seed_hash[..8].try_into().expect("8 bytes"))
}

/// Sample `span` producers from `eligible`, proportionally to voting power.
///
/// Duplicates are expected and meaningful: a validator holding more power
/// appears more often in the producer sequence. Pure in `(seed, eligible,
/// span)`.
pub fn select_span_validators(
    seed: u64,
    eligible: &[ValidatorInfo],
    span: u64,
) -> Result<Vec<ValidatorInfo>, EngineError> {
    if span == 0 {
        return Err(EngineError::InvalidSpan("zero-length span".into()));
    }
    if eligible.is_empty() {
        return Err(EngineError::InvalidSpan("empty eligible validator set".into()));
    }

    // Cumulative weight ranges: validator i owns (cumulative[i-1], cumulative[i]].
    let mut cumulative = Vec::with_capacity(eligible.len());
    let mut total: u64 = 0;
    for validator in eligible {
        total = total
            .checked_add(validator.power)
            .ok_or_else(|| EngineError::InvalidSpan("total voting power overflows u64".into()))?;
        cumulative.push(total);
    }
    if total == 0 {
        return Err(EngineError::InvalidSpan("eligible set has zero total power".into()));
    }

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut committee = Vec::with_capacity(span as usize);
    for _ in 0..span {
        let draw = uniform_draw(&mut rng, total);
        let index = cumulative.partition_point(|&bound| bound < draw);
        committee.push(eligible[index]);
    }
    Ok(committee)
}

/// Unbiased uniform draw in `[1, range]` by rejection sampling: raw values
/// above `u64::MAX - u64::MAX % range - 1` would skew the modulus and are
/// redrawn.
fn uniform_draw(rng: &mut impl RngCore, range: u64) -> u64 {
    let limit = u64::MAX - u64::MAX % range - 1;
    loop {
        let raw = rng.next_u64();
        if raw <= limit {
            return raw % range + 1;
        }
    }
}
