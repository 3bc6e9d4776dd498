//! Cryptographic operations for the blinding exchange.
//!
//! Curve arithmetic sits behind the [`Curve`] trait. Two backends are
//! provided: Ristretto (curve25519-dalek, 32-byte encodings) and secp256k1
//! (k256, 33-byte compressed SEC1 encodings).

use crate::context::CurveName;
use crate::error::{PsiError, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use k256::elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use rand::rngs::OsRng;
use rayon::prelude::*;
use sha2::{Sha256, Sha512};
use zeroize::Zeroize;

/// Domain separation tag for hashing identifiers onto secp256k1.
const SECP256K1_DST: &[u8] = b"psi-align-v1-secp256k1_XMD:SHA-256_SSWU_RO_";

/// Prime-order group used for commutative blinding.
///
/// `blind(blind(p, a), b) == blind(blind(p, b), a)` for all scalars, which
/// is what makes the doubly-blinded values of equal identifiers collide.
pub trait Curve: Send + Sync + 'static {
    type Point: Copy + Send + Sync;
    type Scalar: Copy + Send + Sync + Zeroize;

    const NAME: CurveName;
    /// Length in bytes of [`Curve::encode`] output.
    const ENCODED_LEN: usize;

    fn random_scalar() -> Self::Scalar;

    fn invert(scalar: &Self::Scalar) -> Result<Self::Scalar>;

    /// Deterministically map an identifier onto the curve.
    fn map_to_curve(id: &[u8]) -> Result<Self::Point>;

    fn blind(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point;

    fn encode(point: &Self::Point) -> Vec<u8>;

    /// # Errors
    /// Returns `PsiError::Crypto` if `bytes` is not a valid encoding.
    fn decode(bytes: &[u8]) -> Result<Self::Point>;
}

/// Ristretto group over curve25519.
#[derive(Debug, Clone, Copy)]
pub struct Ristretto255;

impl Curve for Ristretto255 {
    type Point = RistrettoPoint;
    type Scalar = curve25519_dalek::Scalar;

    const NAME: CurveName = CurveName::Ristretto255;
    const ENCODED_LEN: usize = 32;

    fn random_scalar() -> Self::Scalar {
        let mut rng = OsRng;
        curve25519_dalek::Scalar::random(&mut rng)
    }

    fn invert(scalar: &Self::Scalar) -> Result<Self::Scalar> {
        if *scalar == curve25519_dalek::Scalar::ZERO {
            return Err(PsiError::Crypto("Cannot invert the zero scalar".to_string()));
        }
        Ok(scalar.invert())
    }

    fn map_to_curve(id: &[u8]) -> Result<Self::Point> {
        Ok(RistrettoPoint::hash_from_bytes::<Sha512>(id))
    }

    fn blind(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point {
        scalar * point
    }

    fn encode(point: &Self::Point) -> Vec<u8> {
        point.compress().to_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self::Point> {
        CompressedRistretto::from_slice(bytes)
            .map_err(|_| {
                PsiError::Crypto(format!(
                    "Ristretto point must be 32 bytes, got {}",
                    bytes.len()
                ))
            })?
            .decompress()
            .ok_or_else(|| PsiError::Crypto("Failed to decompress Ristretto point".to_string()))
    }
}

/// secp256k1 with SEC1 compressed encodings.
#[derive(Debug, Clone, Copy)]
pub struct Secp256k1;

impl Curve for Secp256k1 {
    type Point = k256::ProjectivePoint;
    type Scalar = k256::Scalar;

    const NAME: CurveName = CurveName::Secp256k1;
    const ENCODED_LEN: usize = 33;

    fn random_scalar() -> Self::Scalar {
        let mut rng = OsRng;
        *k256::NonZeroScalar::random(&mut rng)
    }

    fn invert(scalar: &Self::Scalar) -> Result<Self::Scalar> {
        Option::<k256::Scalar>::from(scalar.invert())
            .ok_or_else(|| PsiError::Crypto("Cannot invert the zero scalar".to_string()))
    }

    fn map_to_curve(id: &[u8]) -> Result<Self::Point> {
        k256::Secp256k1::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[id], &[SECP256K1_DST])
            .map_err(|e| PsiError::Crypto(format!("Failed to hash to secp256k1: {e}")))
    }

    fn blind(point: &Self::Point, scalar: &Self::Scalar) -> Self::Point {
        *point * *scalar
    }

    fn encode(point: &Self::Point) -> Vec<u8> {
        point.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self::Point> {
        let encoded = k256::EncodedPoint::from_bytes(bytes)
            .map_err(|e| PsiError::Crypto(format!("Invalid SEC1 encoding: {e}")))?;
        Option::<k256::AffinePoint>::from(k256::AffinePoint::from_encoded_point(&encoded))
            .map(k256::ProjectivePoint::from)
            .ok_or_else(|| PsiError::Crypto("Failed to decode secp256k1 point".to_string()))
    }
}

/// A party's secret blinding scalar. Zeroized on drop.
pub struct BlindingKey<C: Curve> {
    scalar: C::Scalar,
}

impl<C: Curve> BlindingKey<C> {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self {
            scalar: C::random_scalar(),
        }
    }

    /// Hash every identifier to the curve and blind it with this key,
    /// returning the encodings in input order.
    ///
    /// Work is split into contiguous ranges of at least `chunk_size` items
    /// on the current rayon pool.
    pub fn blind_items(&self, items: &[Vec<u8>], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
        items
            .par_iter()
            .with_min_len(chunk_size)
            .map(|id| -> Result<Vec<u8>> {
                let point = C::map_to_curve(id)?;
                Ok(C::encode(&C::blind(&point, &self.scalar)))
            })
            .collect()
    }

    /// Decode and re-blind encodings produced by the peer.
    ///
    /// # Errors
    /// Returns `PsiError::Crypto` if any encoding does not decode.
    pub fn reblind(&self, encodings: &[Vec<u8>], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
        encodings
            .par_iter()
            .with_min_len(chunk_size)
            .map(|bytes| -> Result<Vec<u8>> {
                let point = C::decode(bytes)?;
                Ok(C::encode(&C::blind(&point, &self.scalar)))
            })
            .collect()
    }

    /// Strip this key from doubly-blinded encodings, leaving the peer's
    /// blinding only.
    pub fn unblind(&self, encodings: &[Vec<u8>], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
        let mut inverse = C::invert(&self.scalar)?;
        let result: Result<Vec<Vec<u8>>> = encodings
            .par_iter()
            .with_min_len(chunk_size)
            .map(|bytes| -> Result<Vec<u8>> {
                let point = C::decode(bytes)?;
                Ok(C::encode(&C::blind(&point, &inverse)))
            })
            .collect();
        inverse.zeroize();
        result
    }
}

impl<C: Curve> Drop for BlindingKey<C> {
    fn drop(&mut self) {
        self.scalar.zeroize();
    }
}
