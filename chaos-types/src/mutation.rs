//! Generic record mutation kinds and results.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::Value;

tagged_kind! {
    /// Structural corruption applied to an arbitrary record.
    pub enum MutationKind {
        /// Flip a single bit in a scalar.
        BitFlip => "bit_flip",
        /// Overwrite bytes of a string or byte field.
        ByteCorruption => "byte_corruption",
        /// Re-encode text as invalid UTF-8 bytes.
        EncodingCorruption => "encoding_corruption",
        /// Remove a field.
        FieldDeletion => "field_deletion",
        /// Copy a field under a near-identical key.
        FieldDuplication => "field_duplication",
        /// Add an unexpected field.
        FieldInjection => "field_injection",
        /// Replace a value with one of a different type.
        TypeChange => "type_change",
        /// Recurse into a nested map or list and mutate there.
        NestedMutation => "nested_mutation",
        /// Min/max integers, NaN/Inf, empty and huge strings.
        BoundaryValue => "boundary_value",
        /// Replace a value with null.
        NullInjection => "null_injection",
        /// Oversized string or list.
        OverflowInjection => "overflow_injection",
        /// Inject hazardous Unicode into text.
        UnicodeCorruption => "unicode_corruption",
        /// Truncate a string mid-character-sequence.
        StringTruncation => "string_truncation",
        /// Blow up a list with many copies of its elements.
        ArrayExplosion => "array_explosion",
        /// SQL injection payloads.
        SqlInjection => "sql_injection",
        /// Cross-site scripting payloads.
        XssInjection => "xss_injection",
        /// Server-side template injection payloads.
        TemplateInjection => "template_injection",
        /// Log forging payloads (CRLF, ANSI escapes, JNDI lookups).
        LogInjection => "log_injection",
    }
}

impl MutationKind {
    /// Kinds that inject attack strings from the security catalogue.
    pub const SECURITY: &'static [MutationKind] = &[
        MutationKind::SqlInjection,
        MutationKind::XssInjection,
        MutationKind::TemplateInjection,
        MutationKind::LogInjection,
    ];

    /// True for the security-payload kinds.
    pub fn is_security_payload(&self) -> bool {
        Self::SECURITY.contains(self)
    }
}

/// Outcome of a single mutation call.
///
/// When `success` is true and the mutation was not skipped, `mutated`
/// differs from `original`.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResult {
    /// Record as supplied.
    pub original: Value,
    /// Record after mutation (equal to `original` on skip or failure).
    pub mutated: Value,
    /// Kind that was selected.
    pub kind: MutationKind,
    /// Field paths that were changed.
    pub mutation_points: Vec<String>,
    /// Whether the transform completed.
    pub success: bool,
    /// Error message when the transform failed.
    pub error: Option<String>,
    /// Free-form details (payload used, skip flag, depth reached).
    pub metadata: BTreeMap<String, Value>,
}

impl MutationResult {
    /// True when the probabilistic skip path was taken.
    pub fn skipped(&self) -> bool {
        matches!(self.metadata.get("skipped"), Some(Value::Bool(true)))
    }

    /// True when the result carries a real change.
    pub fn changed(&self) -> bool {
        self.success && self.mutated != self.original
    }
}
