//! Negotiated configuration for a single alignment run.

use crate::config::PsiConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Bytes of a compressed Ristretto point.
pub const LENGTH_32: usize = 32;
/// Bytes of a compressed SEC1 point.
pub const LENGTH_33: usize = 33;
/// Smallest accepted comparison length.
pub const LENGTH_12: usize = 12;

/// Default statistical security parameter (`-log2` of the false-positive rate).
pub const STAT_SEC_PARAM: u32 = 40;
/// Largest accepted security parameter.
pub const MAX_SEC_PARAM: u32 = 128;

/// Protocol role.
///
/// `Alice` owns the larger set and builds the filter; `Bob` probes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Alice,
    Bob,
}

impl Role {
    /// The role the other party plays.
    pub fn complement(self) -> Self {
        match self {
            Role::Alice => Role::Bob,
            Role::Bob => Role::Alice,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Alice => "alice",
            Role::Bob => "bob",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alice" => Ok(Role::Alice),
            "bob" => Ok(Role::Bob),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Which intersection variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsiVariant {
    /// Alice ships a [`BitFilter`](crate::BitFilter) over her blinded set.
    #[serde(rename = "filter_ecdh")]
    FilterEcdh,
    /// Alice ships her blinded set truncated to `compare_len` bytes.
    #[serde(rename = "ecdh")]
    Ecdh,
}

impl PsiVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            PsiVariant::FilterEcdh => "filter_ecdh",
            PsiVariant::Ecdh => "ecdh",
        }
    }
}

impl fmt::Display for PsiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PsiVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filter_ecdh" => Ok(PsiVariant::FilterEcdh),
            "ecdh" => Ok(PsiVariant::Ecdh),
            other => Err(ConfigError::UnknownVariant(other.to_string())),
        }
    }
}

/// Elliptic curve used for blinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveName {
    Ristretto255,
    Secp256k1,
}

impl CurveName {
    pub fn as_str(self) -> &'static str {
        match self {
            CurveName::Ristretto255 => "ristretto255",
            CurveName::Secp256k1 => "secp256k1",
        }
    }

    /// Length in bytes of one encoded point on this curve.
    pub fn encoded_len(self) -> usize {
        match self {
            CurveName::Ristretto255 => LENGTH_32,
            CurveName::Secp256k1 => LENGTH_33,
        }
    }
}

impl fmt::Display for CurveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurveName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ristretto255" => Ok(CurveName::Ristretto255),
            "secp256k1" => Ok(CurveName::Secp256k1),
            other => Err(ConfigError::UnknownCurve(other.to_string())),
        }
    }
}

/// Configuration of one PSI run, owned by the caller and passed into every
/// operation of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolContext {
    pub role: Role,
    pub peer_role: Role,
    pub self_count: usize,
    pub peer_count: usize,
    pub curve: CurveName,
    pub psi_variant: PsiVariant,
    pub point_encoding_len: usize,
    pub compare_len: usize,
    pub security_parameter: u32,
    /// Worker threads; `0` lets rayon pick.
    pub thread_count: usize,
    pub batch_id: u64,
    /// Smallest contiguous range of records handed to one worker.
    pub chunk_size: usize,
    pub verify_results: bool,
}

impl ProtocolContext {
    /// Create a context with default parameters for a local set of
    /// `self_count` items. Roles stay provisional until negotiated.
    pub fn new(self_count: usize) -> Self {
        Self {
            role: Role::Alice,
            peer_role: Role::Bob,
            self_count,
            peer_count: 0,
            curve: CurveName::Ristretto255,
            psi_variant: PsiVariant::FilterEcdh,
            point_encoding_len: LENGTH_32,
            compare_len: LENGTH_32,
            security_parameter: STAT_SEC_PARAM,
            thread_count: 0,
            batch_id: 1,
            chunk_size: 1,
            verify_results: true,
        }
    }

    /// Create a context from a loaded [`PsiConfig`].
    pub fn from_config(config: &PsiConfig, self_count: usize, batch_id: u64) -> Self {
        Self {
            curve: config.curve,
            psi_variant: config.psi_variant,
            point_encoding_len: config.point_encoding_len,
            compare_len: config.compare_len,
            security_parameter: config.security_parameter,
            thread_count: config.thread_count,
            chunk_size: config.chunk_size,
            verify_results: config.verify_results,
            batch_id,
            ..Self::new(self_count)
        }
    }

    /// Assign roles from both dataset sizes: the party whose set is not
    /// larger becomes bob.
    pub fn negotiate_role(&mut self, peer_count: usize) -> Result<(), ConfigError> {
        if self.self_count == 0 {
            warn!("Local dataset is empty, cannot negotiate a role");
            return Err(ConfigError::EmptySelfSet);
        }
        if peer_count == 0 {
            warn!("Peer dataset is empty, cannot negotiate a role");
            return Err(ConfigError::EmptyPeerSet);
        }
        self.peer_count = peer_count;
        self.role = if self.self_count <= peer_count {
            Role::Bob
        } else {
            Role::Alice
        };
        self.peer_role = self.role.complement();
        info!(role = %self.role, batch_id = self.batch_id, "role assigned from dataset sizes");
        Ok(())
    }

    /// Assign roles from the peer's declared role.
    pub fn negotiate_role_with(
        &mut self,
        peer_role: &str,
        peer_count: usize,
    ) -> Result<(), ConfigError> {
        let peer_role: Role = peer_role.parse().inspect_err(|e| warn!("{e}"))?;
        self.assign_peer_role(peer_role, peer_count);
        Ok(())
    }

    /// Take the complement of a role the peer has already chosen.
    pub fn assign_peer_role(&mut self, peer_role: Role, peer_count: usize) {
        if peer_count == 0 {
            warn!("Peer dataset size is 0, please check");
        }
        self.peer_count = peer_count;
        self.peer_role = peer_role;
        self.role = peer_role.complement();
        info!(role = %self.role, batch_id = self.batch_id, "role assigned from peer role");
    }

    /// Check the rules that do not depend on the peer.
    pub fn validate_local(&self) -> Result<(), ConfigError> {
        let result = self.check_parameters().and_then(|()| self.check_self_count());
        log_rejection(result)
    }

    /// Check every invariant, returning the first rule that fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self
            .check_parameters()
            .and_then(|()| self.check_roles())
            .and_then(|()| self.check_self_count())
            .and_then(|()| self.check_peer_count());
        log_rejection(result)
    }

    /// Check the run parameters alone, for a batch with no items on one
    /// side.
    pub(crate) fn validate_parameters(&self) -> Result<(), ConfigError> {
        log_rejection(self.check_parameters())
    }

    fn check_parameters(&self) -> Result<(), ConfigError> {
        if self.point_encoding_len != LENGTH_32 && self.point_encoding_len != LENGTH_33 {
            return Err(ConfigError::InvalidEncodingLength(self.point_encoding_len));
        }
        if self.point_encoding_len != self.curve.encoded_len() {
            return Err(ConfigError::EncodingLengthMismatch {
                curve: self.curve,
                expected: self.curve.encoded_len(),
                actual: self.point_encoding_len,
            });
        }
        if !(LENGTH_12..=LENGTH_32).contains(&self.compare_len) {
            return Err(ConfigError::CompareLengthOutOfRange(self.compare_len));
        }
        // Filter probing hashes the whole encoding, so truncation is not allowed.
        if self.psi_variant == PsiVariant::FilterEcdh
            && self.compare_len != self.point_encoding_len
        {
            return Err(ConfigError::CompareLengthMismatch {
                compare_len: self.compare_len,
                point_encoding_len: self.point_encoding_len,
            });
        }
        if !(1..=MAX_SEC_PARAM).contains(&self.security_parameter) {
            return Err(ConfigError::InvalidSecurityParameter(
                self.security_parameter,
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        Ok(())
    }

    fn check_roles(&self) -> Result<(), ConfigError> {
        if self.role == self.peer_role {
            return Err(ConfigError::SameRole(self.role));
        }
        Ok(())
    }

    fn check_self_count(&self) -> Result<(), ConfigError> {
        if self.self_count == 0 {
            return Err(ConfigError::EmptySelfSet);
        }
        Ok(())
    }

    fn check_peer_count(&self) -> Result<(), ConfigError> {
        if self.peer_count == 0 {
            return Err(ConfigError::EmptyPeerSet);
        }
        Ok(())
    }

    /// Build the worker pool this run executes its parallel sections on.
    pub(crate) fn thread_pool(&self) -> crate::Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count)
            .build()
            .map_err(|e| crate::PsiError::ThreadPool(e.to_string()))
    }
}

fn log_rejection(result: Result<(), ConfigError>) -> Result<(), ConfigError> {
    if let Err(e) = &result {
        warn!("Rejected protocol context: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiated(self_count: usize, peer_count: usize) -> ProtocolContext {
        let mut ctx = ProtocolContext::new(self_count);
        ctx.negotiate_role(peer_count).unwrap();
        ctx
    }

    #[test]
    fn test_smaller_party_is_bob() {
        let ctx = negotiated(10, 100);
        assert_eq!(ctx.role, Role::Bob);
        assert_eq!(ctx.peer_role, Role::Alice);

        let ctx = negotiated(100, 10);
        assert_eq!(ctx.role, Role::Alice);
        assert_eq!(ctx.peer_role, Role::Bob);
    }

    #[test]
    fn test_equal_counts_make_caller_bob() {
        let ctx = negotiated(7, 7);
        assert_eq!(ctx.role, Role::Bob);
    }

    #[test]
    fn test_negotiate_role_rejects_zero_counts() {
        let mut ctx = ProtocolContext::new(0);
        assert_eq!(ctx.negotiate_role(5), Err(ConfigError::EmptySelfSet));

        let mut ctx = ProtocolContext::new(5);
        assert_eq!(ctx.negotiate_role(0), Err(ConfigError::EmptyPeerSet));
    }

    #[test]
    fn test_negotiate_role_with_peer_role() {
        let mut ctx = ProtocolContext::new(3);
        ctx.negotiate_role_with("alice", 9).unwrap();
        assert_eq!(ctx.role, Role::Bob);
        assert_eq!(ctx.peer_count, 9);

        let mut ctx = ProtocolContext::new(3);
        ctx.negotiate_role_with("bob", 1).unwrap();
        assert_eq!(ctx.role, Role::Alice);

        let mut ctx = ProtocolContext::new(3);
        assert_eq!(
            ctx.negotiate_role_with("carol", 1),
            Err(ConfigError::UnknownRole("carol".to_string()))
        );
    }

    #[test]
    fn test_validate_default_context() {
        assert_eq!(negotiated(3, 4).validate(), Ok(()));
    }

    #[test]
    fn test_validate_empty_self_set() {
        let mut ctx = negotiated(3, 4);
        ctx.self_count = 0;
        assert_eq!(ctx.validate(), Err(ConfigError::EmptySelfSet));
    }

    #[test]
    fn test_validate_filter_compare_mismatch() {
        let mut ctx = negotiated(3, 4);
        ctx.compare_len = 16;
        ctx.point_encoding_len = 32;
        let err = ctx.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::CompareLengthMismatch {
                compare_len: 16,
                point_encoding_len: 32
            }
        );

        ctx.psi_variant = PsiVariant::Ecdh;
        assert_eq!(ctx.validate(), Ok(()));
    }

    #[test]
    fn test_validate_reports_first_violation() {
        let mut ctx = negotiated(3, 4);
        ctx.point_encoding_len = 40;
        ctx.compare_len = 2;
        ctx.self_count = 0;
        assert_eq!(ctx.validate(), Err(ConfigError::InvalidEncodingLength(40)));
    }

    #[test]
    fn test_validate_role_rule_precedes_counts() {
        let mut ctx = negotiated(3, 4);
        ctx.peer_role = ctx.role;
        ctx.self_count = 0;
        ctx.peer_count = 0;
        assert_eq!(ctx.validate(), Err(ConfigError::SameRole(ctx.role)));

        ctx.peer_role = ctx.role.complement();
        assert_eq!(ctx.validate(), Err(ConfigError::EmptySelfSet));
    }

    #[test]
    fn test_validate_local_ignores_peer_rules() {
        let mut ctx = ProtocolContext::new(3);
        ctx.peer_role = ctx.role;
        assert_eq!(ctx.validate_local(), Ok(()));

        ctx.self_count = 0;
        assert_eq!(ctx.validate_local(), Err(ConfigError::EmptySelfSet));
        assert_eq!(ctx.validate_parameters(), Ok(()));
    }

    #[test]
    fn test_validate_curve_encoding_length() {
        let mut ctx = negotiated(3, 4);
        ctx.curve = CurveName::Secp256k1;
        assert!(matches!(
            ctx.validate(),
            Err(ConfigError::EncodingLengthMismatch { expected: 33, .. })
        ));

        ctx.point_encoding_len = LENGTH_33;
        ctx.psi_variant = PsiVariant::Ecdh;
        ctx.compare_len = 20;
        assert_eq!(ctx.validate(), Ok(()));
    }

    #[test]
    fn test_validate_compare_len_bounds() {
        let mut ctx = negotiated(3, 4);
        ctx.psi_variant = PsiVariant::Ecdh;
        ctx.compare_len = 11;
        assert_eq!(ctx.validate(), Err(ConfigError::CompareLengthOutOfRange(11)));
        ctx.compare_len = 33;
        assert_eq!(ctx.validate(), Err(ConfigError::CompareLengthOutOfRange(33)));
    }

    #[test]
    fn test_validate_same_role_and_peer_count() {
        let mut ctx = negotiated(3, 4);
        ctx.peer_role = ctx.role;
        assert_eq!(ctx.validate(), Err(ConfigError::SameRole(Role::Bob)));

        let mut ctx = ProtocolContext::new(3);
        assert_eq!(ctx.validate_local(), Ok(()));
        ctx.negotiate_role_with("bob", 0).unwrap();
        assert_eq!(ctx.validate(), Err(ConfigError::EmptyPeerSet));
    }

    #[test]
    fn test_validate_security_parameter() {
        let mut ctx = negotiated(3, 4);
        ctx.security_parameter = 0;
        assert_eq!(ctx.validate(), Err(ConfigError::InvalidSecurityParameter(0)));
    }

    #[test]
    fn test_role_and_variant_parsing() {
        assert_eq!("alice".parse::<Role>(), Ok(Role::Alice));
        assert_eq!(Role::Alice.complement(), Role::Bob);
        assert_eq!(Role::Bob.complement().complement(), Role::Bob);
        assert_eq!("filter_ecdh".parse::<PsiVariant>(), Ok(PsiVariant::FilterEcdh));
        assert!("bloom".parse::<PsiVariant>().is_err());
        assert_eq!("secp256k1".parse::<CurveName>(), Ok(CurveName::Secp256k1));
    }
}
