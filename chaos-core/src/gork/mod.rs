//! Garbled payload ("gork") generation.
//!
//! [`GorkGenerator::generate_gork`] turns an input payload into a corrupted
//! one for a single [`GorkCategory`], reporting where the corruption landed
//! and which [`ExpectedFailure`]s a correct target should raise for it.
//!
//! Transforms live in per-family modules and are registered once in a
//! dispatch table keyed by category.

mod binary;
mod compression;
mod crypto;
mod protocol;
mod simulated;
mod text;

use chaos_types::{ExpectedFailure, GorkCategory, GorkFamily, GorkResult, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Default uncompressed size of a compression bomb (8 MiB).
pub const DEFAULT_BOMB_BYTES: usize = 8 * 1024 * 1024;

/// Default corruption rate used by [`GorkGenerator::generate_suite`].
pub const DEFAULT_SUITE_RATE: f64 = 0.1;

/// Upper bound on corruption points per payload.
pub const MAX_CORRUPTION_POINTS: usize = 256;

/// Gork generator errors.
#[derive(Debug, Error)]
pub enum GorkError {
    /// Rate outside `[0.0, 1.0]`.
    #[error("gork rate {0} outside [0, 1]")]
    InvalidRate(f64),
    /// No transform registered for the category.
    #[error("no transform registered for {0}")]
    Unregistered(GorkCategory),
    /// Compression stream could not be produced.
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Output of a single transform before it becomes a [`GorkResult`].
pub(crate) struct Gorked {
    pub(crate) bytes: Vec<u8>,
    pub(crate) points: Vec<usize>,
    pub(crate) description: String,
}

impl Gorked {
    pub(crate) fn new(bytes: Vec<u8>, points: Vec<usize>, description: impl Into<String>) -> Self {
        Self {
            bytes,
            points,
            description: description.into(),
        }
    }
}

pub(crate) struct GorkCtx<'a> {
    pub(crate) rng: &'a mut StdRng,
    pub(crate) rate: f64,
    pub(crate) bomb_bytes: usize,
    pub(crate) metadata: BTreeMap<String, Value>,
}

impl GorkCtx<'_> {
    /// Number of corruption points for a payload of `len` bytes.
    pub(crate) fn hits(&self, len: usize) -> usize {
        ((len as f64 * self.rate).round() as usize).clamp(1, MAX_CORRUPTION_POINTS)
    }

    /// Up to `count` distinct, sorted positions in `0..upper`.
    pub(crate) fn positions(&mut self, upper: usize, count: usize) -> Vec<usize> {
        if upper == 0 {
            return vec![0];
        }
        let mut picked = rand::seq::index::sample(self.rng, upper, count.clamp(1, upper)).into_vec();
        picked.sort_unstable();
        picked
    }

    pub(crate) fn note(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

type GorkFn = fn(&mut GorkCtx<'_>, &[u8]) -> Result<Gorked, GorkError>;

/// Garbled payload generator. One instance per worker.
pub struct GorkGenerator {
    rng: StdRng,
    bomb_bytes: usize,
    handlers: HashMap<GorkCategory, GorkFn>,
}

impl std::fmt::Debug for GorkGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GorkGenerator")
            .field("bomb_bytes", &self.bomb_bytes)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl GorkGenerator {
    /// Create a generator with a deterministic seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            bomb_bytes: DEFAULT_BOMB_BYTES,
            handlers: GorkCategory::ALL
                .iter()
                .map(|category| (*category, handler_for(*category)))
                .collect(),
        }
    }

    /// Set the uncompressed size of compression bombs.
    pub fn with_bomb_bytes(mut self, bytes: usize) -> Self {
        self.bomb_bytes = bytes.max(1024);
        self
    }

    /// Garble `data` for one category (random when `None`).
    ///
    /// `rate` is the corruption density: the fraction of positions that
    /// receive a corruption, with at least one always applied.
    pub fn generate_gork(
        &mut self,
        data: &[u8],
        category: Option<GorkCategory>,
        rate: f64,
    ) -> Result<GorkResult, GorkError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(GorkError::InvalidRate(rate));
        }
        let category = match category {
            Some(category) => category,
            None => GorkCategory::ALL[self.rng.gen_range(0..GorkCategory::ALL.len())],
        };
        let handler = self
            .handlers
            .get(&category)
            .copied()
            .ok_or(GorkError::Unregistered(category))?;

        let mut ctx = GorkCtx {
            rng: &mut self.rng,
            rate,
            bomb_bytes: self.bomb_bytes,
            metadata: BTreeMap::new(),
        };
        let mut gorked = handler(&mut ctx, data)?;
        if gorked.bytes == data {
            // Marker bytes that are neither valid UTF-8 nor a valid frame.
            gorked.points.push(gorked.bytes.len());
            gorked.bytes.extend_from_slice(&[0xFF, 0x00, 0xFE]);
        }
        let metadata = ctx.metadata;

        Ok(GorkResult {
            category,
            original: data.to_vec(),
            gorked: gorked.bytes,
            corruption_points: gorked.points,
            description: gorked.description,
            expected_failures: expected_failures(category).to_vec(),
            severity: category.severity(),
            metadata,
        })
    }

    /// One result per category.
    ///
    /// A category whose transform fails is logged and left out.
    pub fn generate_suite(&mut self, data: &[u8]) -> Vec<GorkResult> {
        self.generate_many(data, GorkCategory::ALL, DEFAULT_SUITE_RATE)
    }

    /// One result per category of a family.
    pub fn generate_family(&mut self, data: &[u8], family: GorkFamily, rate: f64) -> Vec<GorkResult> {
        self.generate_many(data, &GorkCategory::in_family(family), rate)
    }

    fn generate_many(&mut self, data: &[u8], categories: &[GorkCategory], rate: f64) -> Vec<GorkResult> {
        categories
            .iter()
            .filter_map(|category| match self.generate_gork(data, Some(*category), rate) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "gork generation failed");
                    None
                }
            })
            .collect()
    }
}

fn handler_for(category: GorkCategory) -> GorkFn {
    use GorkCategory::*;
    match category {
        RandomBytes => binary::random_bytes,
        NullByteInjection => binary::null_byte_injection,
        HighBitSet => binary::high_bit_set,
        BinaryInText => binary::binary_in_text,
        InvalidUtf8 => binary::invalid_utf8,
        OverlongUtf8 => binary::overlong_utf8,
        MixedEncoding => binary::mixed_encoding,
        UnpairedSurrogate => binary::unpaired_surrogate,
        BomMisuse => binary::bom_misuse,
        MalformedProtobuf => protocol::malformed_protobuf,
        InvalidJson => protocol::invalid_json,
        InvalidXml => protocol::invalid_xml,
        HeaderInjection => protocol::header_injection,
        CorruptedGzip => compression::corrupted_gzip,
        CorruptedDeflate => compression::corrupted_deflate,
        CompressionBomb => compression::compression_bomb,
        PacketFragmentation => simulated::packet_fragmentation,
        TcpSegmentCorruption => simulated::tcp_segment_corruption,
        InodeCorruption => simulated::inode_corruption,
        PathTraversal => simulated::path_traversal,
        HeapOverflowPattern => simulated::heap_overflow_pattern,
        StackSmashPattern => simulated::stack_smash_pattern,
        UseAfterFreePattern => simulated::use_after_free_pattern,
        InvalidBase64 => text::invalid_base64,
        InvalidHex => text::invalid_hex,
        InvalidUrlEncoding => text::invalid_url_encoding,
        DirectionOverride => text::direction_override,
        ZeroWidthInjection => text::zero_width_injection,
        ZalgoText => text::zalgo_text,
        HomoglyphSubstitution => text::homoglyph_substitution,
        EpochOverflow => text::epoch_overflow,
        InvalidTimezone => text::invalid_timezone,
        LeapSecond => text::leap_second,
        HashCollisionShape => crypto::hash_collision_shape,
        CorruptedSignature => crypto::corrupted_signature,
        CorruptedCertificate => crypto::corrupted_certificate,
    }
}

/// Failures a correct target should report for a category.
pub fn expected_failures(category: GorkCategory) -> &'static [ExpectedFailure] {
    use ExpectedFailure as F;
    use GorkCategory::*;
    match category {
        RandomBytes => &[F::Utf8DecodeError, F::SchemaViolation, F::ChecksumMismatch],
        NullByteInjection => &[F::SchemaViolation, F::PathValidationError],
        HighBitSet | BinaryInText | InvalidUtf8 | MixedEncoding => {
            &[F::Utf8DecodeError, F::SchemaViolation]
        }
        OverlongUtf8 => &[F::Utf8DecodeError, F::PathValidationError],
        UnpairedSurrogate | BomMisuse => &[F::Utf8DecodeError, F::JsonParseError],
        MalformedProtobuf => &[F::ProtobufDecodeError],
        InvalidJson => &[F::JsonParseError],
        InvalidXml => &[F::XmlParseError],
        HeaderInjection => &[F::HeaderValidationError],
        CorruptedGzip | CorruptedDeflate => &[F::DecompressionError, F::ChecksumMismatch],
        CompressionBomb => &[F::DecompressionLimitExceeded, F::MemoryLimitExceeded],
        PacketFragmentation => &[F::FramingError],
        TcpSegmentCorruption | InodeCorruption => &[F::FramingError, F::ChecksumMismatch],
        PathTraversal => &[F::PathValidationError],
        HeapOverflowPattern | StackSmashPattern => {
            &[F::MemoryLimitExceeded, F::SchemaViolation]
        }
        UseAfterFreePattern => &[F::SchemaViolation, F::ChecksumMismatch],
        InvalidBase64 => &[F::Base64DecodeError],
        InvalidHex => &[F::HexDecodeError],
        InvalidUrlEncoding => &[F::UrlDecodeError, F::Utf8DecodeError],
        DirectionOverride | ZeroWidthInjection | ZalgoText | HomoglyphSubstitution => {
            &[F::UnicodeSanitizationError]
        }
        EpochOverflow | LeapSecond => &[F::TimestampOutOfRange],
        InvalidTimezone => &[F::InvalidTimezoneOffset],
        HashCollisionShape => &[F::ChecksumMismatch],
        CorruptedSignature => &[F::SignatureVerificationError],
        CorruptedCertificate => &[F::CertificateParseError, F::Base64DecodeError],
    }
}

/// Insert `seq(i)` before each position, returning the new buffer and the
/// offsets of the inserted runs in it.
pub(crate) fn insert_at(
    data: &[u8],
    positions: &[usize],
    mut seq: impl FnMut(usize) -> Vec<u8>,
) -> (Vec<u8>, Vec<usize>) {
    let mut out = Vec::with_capacity(data.len() + positions.len() * 4);
    let mut points = Vec::with_capacity(positions.len());
    let mut last = 0;
    for (i, &pos) in positions.iter().enumerate() {
        let pos = pos.min(data.len()).max(last);
        out.extend_from_slice(&data[last..pos]);
        points.push(out.len());
        out.extend(seq(i));
        last = pos;
    }
    out.extend_from_slice(&data[last..]);
    (out, points)
}

/// Char boundaries of `s`, including its end.
pub(crate) fn char_boundaries(s: &str) -> Vec<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .collect()
}
