//! Alignment rounds.
//!
//! Alice holds the larger set and owns the filter; bob holds the smaller
//! set and learns candidates by probing it. Bob's blinded points travel
//! to alice and back doubly blinded, bob strips his own key, and the result
//! is comparable with alice's singly-blinded set without either side
//! seeing the other's raw identifiers.

use crate::context::PsiVariant;
use crate::crypto::Curve;
use crate::error::{PsiError, Result};
use crate::filter::BitFilter;
use crate::messages::{AliceCheck, AliceDoublePointsAndFilter, BobAlignResult, BobPoints};
use crate::state::{
    comparison_suffix, AliceFilteredState, AlicePayload, AliceState, AlignmentResult,
    BobAlignedState, BobState,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

impl<C: Curve> AliceState<C> {
    /// Blind bob's points with alice's key and attach the filter (or the
    /// truncated set) over her own blinded values.
    ///
    /// Consumes the state; alice's key is dropped once the reply is built.
    ///
    /// # Errors
    /// - `PsiError::ProtocolViolation` if `points` disagrees with the context
    /// - `PsiError::Crypto` if a point does not decode
    pub fn respond(
        self,
        points: BobPoints,
    ) -> Result<(AliceFilteredState, AliceDoublePointsAndFilter)> {
        points.validate(&self.ctx)?;

        let start = Instant::now();
        let double_points = self
            .pool
            .install(|| self.key.reblind(&points.points, self.ctx.chunk_size))?;
        debug!(
            points = double_points.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "reblinded peer points"
        );

        let (filter, truncated_points) = match self.payload {
            AlicePayload::Filter(filter) => (filter.to_bytes(), Vec::new()),
            AlicePayload::Truncated(truncated) => (Vec::new(), truncated),
        };

        let reply = AliceDoublePointsAndFilter {
            batch_id: self.ctx.batch_id,
            double_points,
            filter,
            truncated_points,
        };
        let next = AliceFilteredState {
            ctx: self.ctx,
            items: self.items,
            lookup: self.lookup,
        };
        Ok((next, reply))
    }
}

impl<C: Curve> BobState<C> {
    /// Bob's singly-blinded points, in input order.
    pub fn points(&self) -> BobPoints {
        BobPoints {
            batch_id: self.ctx.batch_id,
            points: self.blinded.clone(),
        }
    }

    /// Unblind alice's reply and probe it, collecting candidate matches.
    ///
    /// # Errors
    /// - `PsiError::ProtocolViolation` if the reply disagrees with the
    ///   context or the filter has the wrong size
    /// - `PsiError::Crypto` if a point does not decode
    pub fn align(
        self,
        reply: AliceDoublePointsAndFilter,
    ) -> Result<(BobAlignedState, BobAlignResult)> {
        reply.validate(&self.ctx)?;
        let ctx = &self.ctx;

        let start = Instant::now();
        let probed = self.pool.install(|| -> Result<(Vec<Vec<u8>>, Vec<bool>)> {
            let values = self.key.unblind(&reply.double_points, ctx.chunk_size)?;
            let hits = match ctx.psi_variant {
                PsiVariant::FilterEcdh => {
                    let filter =
                        BitFilter::from_bytes(&reply.filter, ctx.peer_count, ctx.security_parameter)?;
                    values
                        .par_iter()
                        .with_min_len(ctx.chunk_size)
                        .map(|value| filter.contains(value))
                        .collect()
                }
                PsiVariant::Ecdh => {
                    let truncated: HashSet<&[u8]> =
                        reply.truncated_points.iter().map(Vec::as_slice).collect();
                    values
                        .par_iter()
                        .with_min_len(ctx.chunk_size)
                        .map(|value| truncated.contains(comparison_suffix(value, ctx.compare_len)))
                        .collect()
                }
            };
            Ok((values, hits))
        });
        let (values, hits) = probed?;

        let (candidates, candidate_values): (Vec<usize>, Vec<Vec<u8>>) = values
            .into_iter()
            .zip(hits)
            .enumerate()
            .filter(|(_, (_, hit))| *hit)
            .map(|(index, (value, _))| (index, value))
            .unzip();
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "probed peer set");
        info!(candidates = candidates.len(), items = self.items.len(), "candidate matches found");

        let message = BobAlignResult {
            batch_id: ctx.batch_id,
            candidates: candidate_values.clone(),
        };
        let next = BobAlignedState {
            ctx: self.ctx,
            items: self.items,
            candidates,
            candidate_values,
        };
        Ok((next, message))
    }
}

impl AliceFilteredState {
    /// Check bob's candidates against alice's blinded set.
    ///
    /// Alice's result holds her identifiers for the true candidates, in the
    /// order bob sent them. The `AliceCheck` listing the wrong candidates is
    /// returned only when the context asks for verified results.
    ///
    /// # Errors
    /// Returns `PsiError::ProtocolViolation` if `result` disagrees with the
    /// context.
    pub fn check(self, result: BobAlignResult) -> Result<(AlignmentResult, Option<AliceCheck>)> {
        result.validate(&self.ctx)?;

        let mut intersection = Vec::with_capacity(result.candidates.len());
        let mut false_positive_ids = Vec::new();
        for candidate in result.candidates {
            match self.lookup.get(&candidate) {
                Some(&index) => intersection.push(self.items[index].clone()),
                None => false_positive_ids.push(candidate),
            }
        }
        info!(
            batch_id = self.ctx.batch_id,
            matched = intersection.len(),
            false_positives = false_positive_ids.len(),
            "candidates checked"
        );

        let false_positive_count = false_positive_ids.len();
        let check = self.ctx.verify_results.then(|| AliceCheck {
            batch_id: self.ctx.batch_id,
            wrong_count: false_positive_count,
            false_positive_ids,
        });
        Ok((
            AlignmentResult {
                intersection,
                false_positive_count,
            },
            check,
        ))
    }
}

impl BobAlignedState {
    /// Drop the candidates alice reported as wrong.
    ///
    /// # Errors
    /// Returns `PsiError::ProtocolViolation` if `check` disagrees with the
    /// context or names a value bob never sent.
    pub fn finish(self, check: AliceCheck) -> Result<AlignmentResult> {
        check.validate(&self.ctx)?;

        let sent: HashSet<&[u8]> = self.candidate_values.iter().map(Vec::as_slice).collect();
        let wrong: HashSet<&[u8]> = check.false_positive_ids.iter().map(Vec::as_slice).collect();
        if let Some(unknown) = wrong.iter().find(|value| !sent.contains(*value)) {
            warn!(value = %hex_prefix(unknown), "wrong list names an unsent candidate");
            return Err(PsiError::ProtocolViolation(
                "AliceCheck lists a value that was never a candidate".to_string(),
            ));
        }

        let intersection: Vec<Vec<u8>> = self
            .candidates
            .iter()
            .zip(&self.candidate_values)
            .filter(|(_, value)| !wrong.contains(value.as_slice()))
            .map(|(&index, _)| self.items[index].clone())
            .collect();
        info!(
            batch_id = self.ctx.batch_id,
            matched = intersection.len(),
            false_positives = check.wrong_count,
            "alignment finished"
        );

        Ok(AlignmentResult {
            intersection,
            false_positive_count: check.wrong_count,
        })
    }

    /// Accept the candidates as the result, for runs without the
    /// correction round.
    pub fn into_result(self) -> AlignmentResult {
        let intersection = self
            .candidates
            .iter()
            .map(|&index| self.items[index].clone())
            .collect();
        AlignmentResult {
            intersection,
            false_positive_count: 0,
        }
    }
}

fn hex_prefix(value: &[u8]) -> String {
    value.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
