//! Garbled-payload ("gork") categories and results.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::Value;

tagged_kind! {
    /// Category of garbled payload.
    pub enum GorkCategory {
        // Binary
        /// Random bytes overwrite part of the payload.
        RandomBytes => "random_bytes",
        /// NUL bytes injected at random offsets.
        NullByteInjection => "null_byte_injection",
        /// High bit set on random bytes.
        HighBitSet => "high_bit_set",
        /// Binary blob spliced into text.
        BinaryInText => "binary_in_text",

        // Encoding
        /// Bytes that are never valid UTF-8.
        InvalidUtf8 => "invalid_utf8",
        /// Overlong UTF-8 encodings of ASCII.
        OverlongUtf8 => "overlong_utf8",
        /// Latin-1 and UTF-16 fragments inside UTF-8.
        MixedEncoding => "mixed_encoding",
        /// CESU-style unpaired surrogate halves.
        UnpairedSurrogate => "unpaired_surrogate",
        /// Byte-order marks in the wrong places.
        BomMisuse => "bom_misuse",

        // Protocol
        /// Protobuf-like bytes with broken varints and wire types.
        MalformedProtobuf => "malformed_protobuf",
        /// JSON with syntax errors.
        InvalidJson => "invalid_json",
        /// XML with syntax errors and entity expansion.
        InvalidXml => "invalid_xml",
        /// CRLF header injection.
        HeaderInjection => "header_injection",

        // Compression
        /// gzip stream with damaged body and CRC.
        CorruptedGzip => "corrupted_gzip",
        /// zlib/deflate stream with damaged body.
        CorruptedDeflate => "corrupted_deflate",
        /// Tiny gzip stream that inflates to megabytes.
        CompressionBomb => "compression_bomb",

        // Network
        /// Payload split into overlapping, reordered fragments.
        PacketFragmentation => "packet_fragmentation",
        /// TCP-segment-shaped header with a bad checksum.
        TcpSegmentCorruption => "tcp_segment_corruption",

        // Filesystem
        /// Inode-table-shaped garbage.
        InodeCorruption => "inode_corruption",
        /// Path traversal sequences.
        PathTraversal => "path_traversal",

        // Memory
        /// Heap-overflow canary pattern.
        HeapOverflowPattern => "heap_overflow_pattern",
        /// Stack-smash return-address pattern.
        StackSmashPattern => "stack_smash_pattern",
        /// Freed-memory poison pattern.
        UseAfterFreePattern => "use_after_free_pattern",

        // Format
        /// Base64 with illegal characters and padding.
        InvalidBase64 => "invalid_base64",
        /// Hex with odd length and non-hex digits.
        InvalidHex => "invalid_hex",
        /// Broken percent-encoding.
        InvalidUrlEncoding => "invalid_url_encoding",

        // Unicode
        /// Bidirectional override characters.
        DirectionOverride => "direction_override",
        /// Zero-width characters between every byte.
        ZeroWidthInjection => "zero_width_injection",
        /// Stacked combining marks.
        ZalgoText => "zalgo_text",
        /// Cyrillic and Greek look-alikes for Latin letters.
        HomoglyphSubstitution => "homoglyph_substitution",

        // Time
        /// Timestamps beyond 64-bit epoch range.
        EpochOverflow => "epoch_overflow",
        /// Timezone offsets outside +/-14:00.
        InvalidTimezone => "invalid_timezone",
        /// Second value 60 or above in an RFC 3339 timestamp.
        LeapSecond => "leap_second",

        // Crypto
        /// Inputs sharing a digest prefix with the original.
        HashCollisionShape => "hash_collision_shape",
        /// Signature block with flipped bits.
        CorruptedSignature => "corrupted_signature",
        /// PEM certificate with broken armor and body.
        CorruptedCertificate => "corrupted_certificate",
    }
}

tagged_kind! {
    /// Grouping of gork categories.
    pub enum GorkFamily {
        /// Byte-level corruption.
        Binary => "binary",
        /// Text encoding corruption.
        Encoding => "encoding",
        /// Wire/serialization syntax corruption.
        Protocol => "protocol",
        /// Compressed stream corruption.
        Compression => "compression",
        /// Simulated network-layer damage.
        Network => "network",
        /// Simulated filesystem damage.
        Filesystem => "filesystem",
        /// Simulated memory-safety damage.
        Memory => "memory",
        /// Textual encoding formats.
        Format => "format",
        /// Unicode hazards.
        Unicode => "unicode",
        /// Time representation.
        Time => "time",
        /// Cryptographic material.
        Crypto => "crypto",
    }
}

tagged_kind! {
    /// How likely a gork is to crash or wedge a naive parser.
    pub enum Severity {
        /// Usually rejected cleanly.
        Low => "low",
        /// Frequently mis-parsed.
        Medium => "medium",
        /// Known to crash, hang or exhaust memory.
        High => "high",
    }
}

tagged_kind! {
    /// Failure a well-behaved target is expected to report for a gork.
    pub enum ExpectedFailure {
        /// Decompression failed or was refused.
        DecompressionError => "decompression_error",
        /// Decompressed size limit hit.
        DecompressionLimitExceeded => "decompression_limit_exceeded",
        /// JSON syntax error.
        JsonParseError => "json_parse_error",
        /// XML syntax error.
        XmlParseError => "xml_parse_error",
        /// Protobuf decode error.
        ProtobufDecodeError => "protobuf_decode_error",
        /// UTF-8 decode error.
        Utf8DecodeError => "utf8_decode_error",
        /// Input rejected by schema validation.
        SchemaViolation => "schema_violation",
        /// Header rejected.
        HeaderValidationError => "header_validation_error",
        /// Base64 decode error.
        Base64DecodeError => "base64_decode_error",
        /// Hex decode error.
        HexDecodeError => "hex_decode_error",
        /// Percent-decoding error.
        UrlDecodeError => "url_decode_error",
        /// Unicode normalization or display-safety rejection.
        UnicodeSanitizationError => "unicode_sanitization_error",
        /// Timestamp outside the representable range.
        TimestampOutOfRange => "timestamp_out_of_range",
        /// Timezone offset rejected.
        InvalidTimezoneOffset => "invalid_timezone_offset",
        /// Signature check failed.
        SignatureVerificationError => "signature_verification_error",
        /// Certificate parse failed.
        CertificateParseError => "certificate_parse_error",
        /// Integrity/checksum mismatch.
        ChecksumMismatch => "checksum_mismatch",
        /// Path escapes its root.
        PathValidationError => "path_validation_error",
        /// Frame or fragment reassembly failed.
        FramingError => "framing_error",
        /// Allocation or memory budget refused.
        MemoryLimitExceeded => "memory_limit_exceeded",
    }
}

impl GorkCategory {
    /// Family this category belongs to.
    pub fn family(&self) -> GorkFamily {
        use GorkCategory::*;
        match self {
            RandomBytes | NullByteInjection | HighBitSet | BinaryInText => GorkFamily::Binary,
            InvalidUtf8 | OverlongUtf8 | MixedEncoding | UnpairedSurrogate | BomMisuse => {
                GorkFamily::Encoding
            }
            MalformedProtobuf | InvalidJson | InvalidXml | HeaderInjection => GorkFamily::Protocol,
            CorruptedGzip | CorruptedDeflate | CompressionBomb => GorkFamily::Compression,
            PacketFragmentation | TcpSegmentCorruption => GorkFamily::Network,
            InodeCorruption | PathTraversal => GorkFamily::Filesystem,
            HeapOverflowPattern | StackSmashPattern | UseAfterFreePattern => GorkFamily::Memory,
            InvalidBase64 | InvalidHex | InvalidUrlEncoding => GorkFamily::Format,
            DirectionOverride | ZeroWidthInjection | ZalgoText | HomoglyphSubstitution => {
                GorkFamily::Unicode
            }
            EpochOverflow | InvalidTimezone | LeapSecond => GorkFamily::Time,
            HashCollisionShape | CorruptedSignature | CorruptedCertificate => GorkFamily::Crypto,
        }
    }

    /// Static severity lookup.
    pub fn severity(&self) -> Severity {
        use GorkCategory::*;
        match self {
            CompressionBomb | HeapOverflowPattern | StackSmashPattern | UseAfterFreePattern
            | InvalidXml | PathTraversal | HeaderInjection | MalformedProtobuf => Severity::High,
            RandomBytes | NullByteInjection | InvalidUtf8 | OverlongUtf8 | UnpairedSurrogate
            | CorruptedGzip | CorruptedDeflate | DirectionOverride | ZalgoText | EpochOverflow
            | CorruptedSignature | CorruptedCertificate | TcpSegmentCorruption
            | PacketFragmentation | InodeCorruption => Severity::Medium,
            HighBitSet | BinaryInText | MixedEncoding | BomMisuse | InvalidJson | InvalidBase64
            | InvalidHex | InvalidUrlEncoding | ZeroWidthInjection | HomoglyphSubstitution
            | InvalidTimezone | LeapSecond | HashCollisionShape => Severity::Low,
        }
    }

    /// Categories in one family.
    pub fn in_family(family: GorkFamily) -> Vec<GorkCategory> {
        Self::ALL
            .iter()
            .copied()
            .filter(|c| c.family() == family)
            .collect()
    }
}

/// Outcome of one gork generation.
#[derive(Debug, Clone, Serialize)]
pub struct GorkResult {
    /// Category generated.
    pub category: GorkCategory,
    /// Input payload.
    pub original: Vec<u8>,
    /// Garbled payload (always differs from `original`).
    pub gorked: Vec<u8>,
    /// Byte offsets in `gorked` where corruption was placed.
    pub corruption_points: Vec<usize>,
    /// Human-readable description.
    pub description: String,
    /// Failures a correct target should report for this payload.
    pub expected_failures: Vec<ExpectedFailure>,
    /// Static severity of the category.
    pub severity: Severity,
    /// Extra details (expanded size of a bomb, fragment count).
    pub metadata: BTreeMap<String, Value>,
}

impl GorkResult {
    /// Whether a reported failure name is in the expected taxonomy.
    pub fn expects(&self, failure: &str) -> bool {
        self.expected_failures.iter().any(|f| f.as_str() == failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_is_populated() {
        for family in GorkFamily::ALL {
            assert!(
                !GorkCategory::in_family(*family).is_empty(),
                "family {family} has no categories"
            );
        }
    }

    #[test]
    fn around_thirty_five_categories() {
        assert!(GorkCategory::ALL.len() >= 35);
    }

    #[test]
    fn severity_is_static() {
        assert_eq!(GorkCategory::CompressionBomb.severity(), Severity::High);
        assert_eq!(GorkCategory::InvalidJson.severity(), Severity::Low);
        assert_eq!(GorkCategory::CorruptedGzip.severity(), Severity::Medium);
    }

    #[test]
    fn severity_orders() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
