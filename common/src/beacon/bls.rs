//! Pairing checks and point codecs for the recognized beacon schemes.
//!
//! BLS12-381 points use the ZCash encoding the randomness network publishes:
//! compressed big-endian x with compression/infinity/sign flags in the top
//! three bits of the first byte, Fq2 imaginary limb first. BN254 points use
//! the uncompressed big-endian gnark/kyber marshal. Hash-to-curve follows
//! RFC 9380: SSWU for BLS12-381 (via the isogeny map), Shallue–van de
//! Woestijne for BN254 with expand_msg_xmd over Keccak-256.

use std::cmp::Ordering;
use std::sync::OnceLock;

use ark_bls12_381::{g1, g2, Bls12_381, Fq, Fq2, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_bn254::{Bn254, Fq as BnFq, G1Affine as BnG1Affine, G2Affine as BnG2Affine};
use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::HashToCurve;
use ark_ec::pairing::Pairing;
use ark_ec::short_weierstrass::SWCurveConfig;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::field_hashers::{DefaultFieldHasher, HashToField};
use ark_ff::{BigInteger, Field, One, PrimeField, Zero};
use sha2::Sha256;
use sha3::Keccak256;

use super::BeaconError;

pub(crate) const DST_G2: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";
pub(crate) const DST_G1: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";
const DST_BN254: &[u8] = b"BLS_SIG_BN254G1_XMD:KECCAK-256_SVDW_RO_NUL_";

const FLAG_COMPRESSED: u8 = 0x80;
const FLAG_INFINITY: u8 = 0x40;
const FLAG_Y_LARGEST: u8 = 0x20;

/// G2-signature schemes: public key on G1, signature on G2.
/// Valid iff `e(P, Hm) · e(−G1, S) == 1`.
pub(crate) fn verify_bls12_381_g2(
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
) -> Result<(), BeaconError> {
    let pk = g1_from_compressed(public_key)?;
    let sig = g2_from_compressed(signature)?;
    let hm = hash_to_g2(message, DST_G2)?;

    let product = Bls12_381::multi_pairing([pk, -G1Affine::generator()], [hm, sig]);
    if product.is_zero() {
        Ok(())
    } else {
        Err(BeaconError::SignatureInvalid)
    }
}

/// G1-signature schemes: public key on G2, signature on G1.
/// Valid iff `e(Hm, −P) · e(S, G2) == 1`.
pub(crate) fn verify_bls12_381_g1(
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
    dst: &[u8],
) -> Result<(), BeaconError> {
    let pk = g2_from_compressed(public_key)?;
    let sig = g1_from_compressed(signature)?;
    let hm = hash_to_g1(message, dst)?;

    let product = Bls12_381::multi_pairing([hm, sig], [-pk, G2Affine::generator()]);
    if product.is_zero() {
        Ok(())
    } else {
        Err(BeaconError::SignatureInvalid)
    }
}

/// BN254 short-signature scheme: public key on G2, signature on G1.
pub(crate) fn verify_bn254_g1(
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
) -> Result<(), BeaconError> {
    let pk = bn_g2_from_bytes(public_key)?;
    let sig = bn_g1_from_bytes(signature)?;
    let hm = hash_to_bn254_g1(message)?;

    let product = Bn254::multi_pairing([hm, sig], [-pk, BnG2Affine::generator()]);
    if product.is_zero() {
        Ok(())
    } else {
        Err(BeaconError::SignatureInvalid)
    }
}

// ---------------------------------------------------------------------------
// Hash-to-curve
// ---------------------------------------------------------------------------

pub(crate) fn hash_to_g1(message: &[u8], dst: &[u8]) -> Result<G1Affine, BeaconError> {
    let hasher = MapToCurveBasedHasher::<
        G1Projective,
        DefaultFieldHasher<Sha256, 128>,
        WBMap<g1::Config>,
    >::new(dst)
    .map_err(|e| BeaconError::HashToCurve(format!("{:?}", e)))?;
    hasher
        .hash(message)
        .map_err(|e| BeaconError::HashToCurve(format!("{:?}", e)))
}

pub(crate) fn hash_to_g2(message: &[u8], dst: &[u8]) -> Result<G2Affine, BeaconError> {
    let hasher = MapToCurveBasedHasher::<
        G2Projective,
        DefaultFieldHasher<Sha256, 128>,
        WBMap<g2::Config>,
    >::new(dst)
    .map_err(|e| BeaconError::HashToCurve(format!("{:?}", e)))?;
    hasher
        .hash(message)
        .map_err(|e| BeaconError::HashToCurve(format!("{:?}", e)))
}

/// hash_to_curve for BN254 G1 (cofactor 1, so no clearing step).
pub(crate) fn hash_to_bn254_g1(message: &[u8]) -> Result<BnG1Affine, BeaconError> {
    let hasher = <DefaultFieldHasher<Keccak256, 128> as HashToField<BnFq>>::new(DST_BN254);
    let elements: Vec<BnFq> = hasher.hash_to_field(message, 2);
    let q0 = svdw_map(elements[0])?;
    let q1 = svdw_map(elements[1])?;
    Ok((q0.into_group() + q1).into_affine())
}

/// Shallue–van de Woestijne constants for `y² = x³ + 3` with Z = 1.
struct SvdwConstants {
    z: BnFq,
    c1: BnFq,
    c2: BnFq,
    c3: BnFq,
    c4: BnFq,
}

fn svdw_constants() -> &'static SvdwConstants {
    static CONSTANTS: OnceLock<SvdwConstants> = OnceLock::new();
    CONSTANTS.get_or_init(|| {
        let b = ark_bn254::g1::Config::COEFF_B;
        let z = BnFq::one();
        let g_z = z * z * z + b;
        let three_z_sq = BnFq::from(3u64) * z * z;
        let c1 = g_z;
        let c2 = -(z * BnFq::from(2u64).inverse().expect("2 is invertible"));
        let mut c3 = (-(g_z * three_z_sq))
            .sqrt()
            .expect("-g(Z)(3Z²) is a square for BN254 with Z = 1");
        if sgn0(&c3) {
            c3 = -c3;
        }
        let c4 = -(BnFq::from(4u64) * g_z)
            * three_z_sq.inverse().expect("3Z² is invertible");
        SvdwConstants { z, c1, c2, c3, c4 }
    })
}

/// RFC 9380 Shallue–van de Woestijne map (appendix F.1 straight line).
fn svdw_map(u: BnFq) -> Result<BnG1Affine, BeaconError> {
    let k = svdw_constants();
    let b = ark_bn254::g1::Config::COEFF_B;

    let tv1 = u.square() * k.c1;
    let tv2 = BnFq::one() + tv1;
    let tv1 = BnFq::one() - tv1;
    let tv3 = inv0(tv1 * tv2);
    let tv4 = u * tv1 * tv3 * k.c3;

    let x1 = k.c2 - tv4;
    let gx1 = x1.square() * x1 + b;
    let x2 = k.c2 + tv4;
    let gx2 = x2.square() * x2 + b;
    let x3 = k.z + k.c4 * (tv2.square() * tv3).square();

    let x = if is_square(&gx1) {
        x1
    } else if is_square(&gx2) {
        x2
    } else {
        x3
    };
    let gx = x.square() * x + b;
    let mut y = gx
        .sqrt()
        .ok_or_else(|| BeaconError::HashToCurve("SVDW candidate is not on the curve".into()))?;
    if sgn0(&u) != sgn0(&y) {
        y = -y;
    }
    Ok(BnG1Affine::new_unchecked(x, y))
}

fn inv0(x: BnFq) -> BnFq {
    x.inverse().unwrap_or_else(BnFq::zero)
}

fn is_square(x: &BnFq) -> bool {
    x.sqrt().is_some()
}

fn sgn0(x: &BnFq) -> bool {
    x.into_bigint().is_odd()
}

// ---------------------------------------------------------------------------
// BLS12-381 point codec (ZCash format)
// ---------------------------------------------------------------------------

/// Strict big-endian field decode: rejects non-canonical values.
fn field_from_be<F: PrimeField>(bytes: &[u8]) -> Option<F> {
    let element = F::from_be_bytes_mod_order(bytes);
    if element.into_bigint().to_bytes_be() == bytes {
        Some(element)
    } else {
        None
    }
}

fn fq_lex_largest(y: &Fq) -> bool {
    y.into_bigint() > (-*y).into_bigint()
}

fn fq2_lex_largest(y: &Fq2) -> bool {
    let neg = -*y;
    match y.c1.into_bigint().cmp(&neg.c1.into_bigint()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => y.c0.into_bigint() > neg.c0.into_bigint(),
    }
}

pub(crate) fn g1_from_compressed(bytes: &[u8]) -> Result<G1Affine, BeaconError> {
    if bytes.len() != 48 {
        return Err(BeaconError::InvalidPoint(format!(
            "G1 point must be 48 bytes, got {}",
            bytes.len()
        )));
    }
    let flags = bytes[0];
    if flags & FLAG_COMPRESSED == 0 {
        return Err(BeaconError::InvalidPoint("missing compression flag".into()));
    }
    if flags & FLAG_INFINITY != 0 {
        return Err(BeaconError::InvalidPoint("point at infinity".into()));
    }
    let greatest = flags & FLAG_Y_LARGEST != 0;

    let mut x_bytes = bytes.to_vec();
    x_bytes[0] &= 0x1F;
    let x: Fq = field_from_be(&x_bytes)
        .ok_or_else(|| BeaconError::InvalidPoint("G1 x out of field".into()))?;

    let rhs = x.square() * x + g1::Config::COEFF_B;
    let y = rhs
        .sqrt()
        .ok_or_else(|| BeaconError::InvalidPoint("G1 x not on curve".into()))?;
    let y = if fq_lex_largest(&y) == greatest { y } else { -y };

    let point = G1Affine::new_unchecked(x, y);
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(BeaconError::InvalidPoint("G1 point outside subgroup".into()));
    }
    Ok(point)
}

pub(crate) fn g2_from_compressed(bytes: &[u8]) -> Result<G2Affine, BeaconError> {
    if bytes.len() != 96 {
        return Err(BeaconError::InvalidPoint(format!(
            "G2 point must be 96 bytes, got {}",
            bytes.len()
        )));
    }
    let flags = bytes[0];
    if flags & FLAG_COMPRESSED == 0 {
        return Err(BeaconError::InvalidPoint("missing compression flag".into()));
    }
    if flags & FLAG_INFINITY != 0 {
        return Err(BeaconError::InvalidPoint("point at infinity".into()));
    }
    let greatest = flags & FLAG_Y_LARGEST != 0;

    let mut c1_bytes = bytes[..48].to_vec();
    c1_bytes[0] &= 0x1F;
    let x_c1: Fq = field_from_be(&c1_bytes)
        .ok_or_else(|| BeaconError::InvalidPoint("G2 x.c1 out of field".into()))?;
    let x_c0: Fq = field_from_be(&bytes[48..96])
        .ok_or_else(|| BeaconError::InvalidPoint("G2 x.c0 out of field".into()))?;
    let x = Fq2::new(x_c0, x_c1);

    let rhs = x.square() * x + g2::Config::COEFF_B;
    let y = rhs
        .sqrt()
        .ok_or_else(|| BeaconError::InvalidPoint("G2 x not on curve".into()))?;
    let y = if fq2_lex_largest(&y) == greatest { y } else { -y };

    let point = G2Affine::new_unchecked(x, y);
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(BeaconError::InvalidPoint("G2 point outside subgroup".into()));
    }
    Ok(point)
}

pub(crate) fn g1_to_compressed(point: &G1Affine) -> Vec<u8> {
    let mut out = point.x.into_bigint().to_bytes_be();
    out[0] |= FLAG_COMPRESSED;
    if fq_lex_largest(&point.y) {
        out[0] |= FLAG_Y_LARGEST;
    }
    out
}

pub(crate) fn g2_to_compressed(point: &G2Affine) -> Vec<u8> {
    let mut out = point.x.c1.into_bigint().to_bytes_be();
    out.extend_from_slice(&point.x.c0.into_bigint().to_bytes_be());
    out[0] |= FLAG_COMPRESSED;
    if fq2_lex_largest(&point.y) {
        out[0] |= FLAG_Y_LARGEST;
    }
    out
}

// ---------------------------------------------------------------------------
// BN254 point codec (gnark/kyber uncompressed marshal)
// ---------------------------------------------------------------------------

pub(crate) fn bn_g1_from_bytes(bytes: &[u8]) -> Result<BnG1Affine, BeaconError> {
    if bytes.len() != 64 {
        return Err(BeaconError::InvalidPoint(format!(
            "BN254 G1 point must be 64 bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(BeaconError::InvalidPoint("point at infinity".into()));
    }
    let x: BnFq = field_from_be(&bytes[..32])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G1 x out of field".into()))?;
    let y: BnFq = field_from_be(&bytes[32..])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G1 y out of field".into()))?;

    let point = BnG1Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(BeaconError::InvalidPoint("BN254 G1 point not on curve".into()));
    }
    Ok(point)
}

pub(crate) fn bn_g2_from_bytes(bytes: &[u8]) -> Result<BnG2Affine, BeaconError> {
    if bytes.len() != 128 {
        return Err(BeaconError::InvalidPoint(format!(
            "BN254 G2 point must be 128 bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(BeaconError::InvalidPoint("point at infinity".into()));
    }
    let x_c1: BnFq = field_from_be(&bytes[..32])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G2 x.c1 out of field".into()))?;
    let x_c0: BnFq = field_from_be(&bytes[32..64])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G2 x.c0 out of field".into()))?;
    let y_c1: BnFq = field_from_be(&bytes[64..96])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G2 y.c1 out of field".into()))?;
    let y_c0: BnFq = field_from_be(&bytes[96..])
        .ok_or_else(|| BeaconError::InvalidPoint("BN254 G2 y.c0 out of field".into()))?;

    let point = BnG2Affine::new_unchecked(
        ark_bn254::Fq2::new(x_c0, x_c1),
        ark_bn254::Fq2::new(y_c0, y_c1),
    );
    if !point.is_on_curve() {
        return Err(BeaconError::InvalidPoint("BN254 G2 point not on curve".into()));
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(BeaconError::InvalidPoint(
            "BN254 G2 point outside subgroup".into(),
        ));
    }
    Ok(point)
}

pub(crate) fn bn_g1_to_bytes(point: &BnG1Affine) -> Vec<u8> {
    let mut out = point.x.into_bigint().to_bytes_be();
    out.extend_from_slice(&point.y.into_bigint().to_bytes_be());
    out
}

pub(crate) fn bn_g2_to_bytes(point: &BnG2Affine) -> Vec<u8> {
    let mut out = point.x.c1.into_bigint().to_bytes_be();
    out.extend_from_slice(&point.x.c0.into_bigint().to_bytes_be());
    out.extend_from_slice(&point.y.c1.into_bigint().to_bytes_be());
    out.extend_from_slice(&point.y.c0.into_bigint().to_bytes_be());
    out
}
