//! Per-role protocol state.
//!
//! Each role moves through its rounds by consuming one state and returning
//! the next, so rounds cannot be skipped or replayed:
//!
//! ```text
//! alice: AliceState --respond--> AliceFilteredState --check--> AlignmentResult
//! bob:   BobState   --align----> BobAlignedState    --finish-> AlignmentResult
//! ```
//!
//! Secret keys live only in the first state of each role and are zeroized
//! when it is consumed.

use crate::context::{CurveName, ProtocolContext, PsiVariant, Role};
use crate::crypto::{BlindingKey, Curve};
use crate::error::{PsiError, Result};
use crate::filter::BitFilter;
use std::collections::HashMap;
use tracing::info;

/// What alice ships to bob alongside his doubly-blinded points.
pub(crate) enum AlicePayload {
    Filter(BitFilter),
    Truncated(Vec<Vec<u8>>),
}

/// Alice before the exchange: her set is blinded and the filter is built.
pub struct AliceState<C: Curve> {
    pub(crate) ctx: ProtocolContext,
    pub(crate) pool: rayon::ThreadPool,
    pub(crate) key: BlindingKey<C>,
    pub(crate) items: Vec<Vec<u8>>,
    /// Blinded encoding of each item, mapped to its input index.
    pub(crate) lookup: HashMap<Vec<u8>, usize>,
    pub(crate) payload: AlicePayload,
}

/// Alice after answering bob, waiting for his candidates.
#[derive(Debug)]
pub struct AliceFilteredState {
    pub(crate) ctx: ProtocolContext,
    pub(crate) items: Vec<Vec<u8>>,
    pub(crate) lookup: HashMap<Vec<u8>, usize>,
}

/// Bob before the exchange: his set is blinded and ready to send.
pub struct BobState<C: Curve> {
    pub(crate) ctx: ProtocolContext,
    pub(crate) pool: rayon::ThreadPool,
    pub(crate) key: BlindingKey<C>,
    pub(crate) items: Vec<Vec<u8>>,
    pub(crate) blinded: Vec<Vec<u8>>,
}

/// Bob after probing, holding his candidate matches.
#[derive(Debug)]
pub struct BobAlignedState {
    pub(crate) ctx: ProtocolContext,
    pub(crate) items: Vec<Vec<u8>>,
    /// Input indices of candidate matches, ascending.
    pub(crate) candidates: Vec<usize>,
    /// Comparison value of each candidate, parallel to `candidates`.
    pub(crate) candidate_values: Vec<Vec<u8>>,
}

/// Final outcome of a run for one party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentResult {
    /// Raw identifiers in the intersection, in bob's input order.
    pub intersection: Vec<Vec<u8>>,
    /// Candidates removed by the correction round.
    pub false_positive_count: usize,
}

impl AlignmentResult {
    pub fn len(&self) -> usize {
        self.intersection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intersection.is_empty()
    }
}

fn check_session(
    ctx: &ProtocolContext,
    role: Role,
    curve: CurveName,
    items: &[Vec<u8>],
) -> Result<()> {
    if items.is_empty() {
        return Err(PsiError::EmptyInput);
    }
    ctx.validate()?;
    if ctx.role != role {
        return Err(PsiError::ProtocolViolation(format!(
            "context assigns role {}, cannot run as {}",
            ctx.role, role
        )));
    }
    if ctx.curve != curve {
        return Err(PsiError::ProtocolViolation(format!(
            "context selects curve {}, session uses {}",
            ctx.curve, curve
        )));
    }
    if ctx.self_count != items.len() {
        return Err(PsiError::ProtocolViolation(format!(
            "context was negotiated for {} items, got {}",
            ctx.self_count,
            items.len()
        )));
    }
    Ok(())
}

/// Last `compare_len` bytes of an encoding, the part compared in the
/// `ecdh` variant.
pub(crate) fn comparison_suffix(value: &[u8], compare_len: usize) -> &[u8] {
    &value[value.len().saturating_sub(compare_len)..]
}

impl<C: Curve> AliceState<C> {
    /// Blind alice's set and prepare what bob will probe.
    ///
    /// # Errors
    /// - `PsiError::EmptyInput` if `items` is empty
    /// - `PsiError::Config` if the context is invalid
    /// - `PsiError::ProtocolViolation` if the context is not alice's
    pub fn new(ctx: ProtocolContext, items: &[Vec<u8>]) -> Result<Self> {
        check_session(&ctx, Role::Alice, C::NAME, items)?;
        let pool = ctx.thread_pool()?;
        let key = BlindingKey::<C>::generate();

        let (blinded, payload) = pool.install(|| -> Result<_> {
            let blinded = key.blind_items(items, ctx.chunk_size)?;
            let payload = match ctx.psi_variant {
                PsiVariant::FilterEcdh => AlicePayload::Filter(BitFilter::build(
                    &blinded,
                    ctx.security_parameter,
                    ctx.chunk_size,
                )?),
                PsiVariant::Ecdh => AlicePayload::Truncated(
                    blinded
                        .iter()
                        .map(|value| comparison_suffix(value, ctx.compare_len).to_vec())
                        .collect(),
                ),
            };
            Ok((blinded, payload))
        })?;

        let lookup = blinded
            .into_iter()
            .enumerate()
            .map(|(index, value)| (value, index))
            .collect();
        info!(items = items.len(), variant = %ctx.psi_variant, "alice prepared");

        Ok(Self {
            ctx,
            pool,
            key,
            items: items.to_vec(),
            lookup,
            payload,
        })
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }
}

impl<C: Curve> BobState<C> {
    /// Blind bob's set.
    ///
    /// # Errors
    /// Same as [`AliceState::new`], for the bob role.
    pub fn new(ctx: ProtocolContext, items: &[Vec<u8>]) -> Result<Self> {
        check_session(&ctx, Role::Bob, C::NAME, items)?;
        let pool = ctx.thread_pool()?;
        let key = BlindingKey::<C>::generate();
        let blinded = pool.install(|| key.blind_items(items, ctx.chunk_size))?;
        info!(items = items.len(), "bob prepared");

        Ok(Self {
            ctx,
            pool,
            key,
            items: items.to_vec(),
            blinded,
        })
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }
}

impl BobAlignedState {
    /// Candidate matches before correction, in input order.
    pub fn candidates(&self) -> Vec<&[u8]> {
        self.candidates
            .iter()
            .map(|&index| self.items[index].as_slice())
            .collect()
    }
}
