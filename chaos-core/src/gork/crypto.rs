//! Digest, signature and certificate shaped corruption.
//!
//! Outputs only look like cryptographic material; none of it is valid.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{GorkCtx, GorkError, Gorked};
use chaos_types::Value;

const BLOCK: usize = 64;

/// Byte offsets that differ between the two blocks of a collision pair.
const DIFFERENTIAL: [usize; 3] = [19, 45, 59];

pub(super) fn hash_collision_shape(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut first = [0u8; BLOCK];
    ctx.rng.fill(&mut first[..]);
    let mut second = first;
    for &i in &DIFFERENTIAL {
        second[i] ^= 0x80;
    }

    let mut bytes = data.to_vec();
    let first_at = bytes.len();
    bytes.extend_from_slice(&first);
    let second_at = bytes.len();
    bytes.extend_from_slice(&second);

    ctx.note("block_a_sha256", hex::encode(Sha256::digest(first)));
    ctx.note("block_b_sha256", hex::encode(Sha256::digest(second)));
    Ok(Gorked::new(
        bytes,
        DIFFERENTIAL
            .iter()
            .map(|i| second_at + i)
            .chain([first_at])
            .collect(),
        "two near-identical blocks shaped like a collision pair",
    ))
}

pub(super) fn corrupted_signature(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut signature = Sha256::digest(data).to_vec();
    let flip = ctx.rng.gen_range(0..signature.len());
    signature[flip] ^= 1 << ctx.rng.gen_range(0..8);

    let mut bytes = data.to_vec();
    bytes.extend_from_slice(b"\n-----BEGIN SIGNATURE-----\n");
    let sig_at = bytes.len();
    bytes.extend_from_slice(STANDARD.encode(&signature).as_bytes());
    bytes.extend_from_slice(b"\n-----END SIGNATURE-----\n");
    ctx.note("flipped_byte", Value::Int(flip as i64));
    Ok(Gorked::new(
        bytes,
        vec![sig_at],
        "detached signature over the payload with one bit flipped",
    ))
}

pub(super) fn corrupted_certificate(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    // SEQUENCE claiming a length far past the end of the buffer.
    let mut der = vec![0x30, 0x82, 0xFF, 0xFF, 0x30, 0x82, 0x01, 0x00, 0xA0, 0x03, 0x02, 0x01, 0x02];
    der.extend_from_slice(data);
    let mut body = STANDARD.encode(&der).into_bytes();
    let at = ctx.rng.gen_range(0..body.len());
    body.insert(at, b'!');

    let mut bytes = b"-----BEGIN CERTIFICATE-----\n".to_vec();
    let body_at = bytes.len();
    bytes.extend_from_slice(&body);
    if ctx.rng.gen_bool(0.5) {
        bytes.extend_from_slice(b"\n-----END CERTIFICATE-----\n");
    }
    Ok(Gorked::new(
        bytes,
        vec![body_at + at],
        "PEM certificate with a bad DER length and a non-base64 character",
    ))
}
