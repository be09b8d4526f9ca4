//! Trace-span malformation kinds and results.

use serde::Serialize;

use crate::Value;

tagged_kind! {
    /// Domain-specific corruption of a single trace span.
    pub enum SpanMalformationKind {
        // Identifiers
        /// `trace_id` set to the empty string.
        EmptyTraceId => "empty_trace_id",
        /// `trace_id` far longer than 32 hex characters.
        OversizedTraceId => "oversized_trace_id",
        /// `trace_id` containing non-hex characters.
        NonHexTraceId => "non_hex_trace_id",
        /// `span_id` set to the empty string.
        EmptySpanId => "empty_span_id",
        /// `span_id` far longer than 16 hex characters.
        OversizedSpanId => "oversized_span_id",
        /// `span_id` containing non-hex characters.
        NonHexSpanId => "non_hex_span_id",
        /// `span_id` duplicating another span's identifier.
        DuplicateSpanId => "duplicate_span_id",
        /// `trace_id` and `span_id` removed entirely.
        MissingRequiredIds => "missing_required_ids",

        // Timestamps
        /// Start time decades in the future.
        FutureTimestamp => "future_timestamp",
        /// Negative start time.
        NegativeTimestamp => "negative_timestamp",
        /// Start time at the integer ceiling.
        OverflowTimestamp => "overflow_timestamp",
        /// Start time as text.
        NonNumericTimestamp => "non_numeric_timestamp",

        // Durations
        /// End time before start time.
        NegativeDuration => "negative_duration",
        /// Infinite duration.
        InfiniteDuration => "infinite_duration",
        /// Duration longer than any plausible enclosing trace.
        ExceedsTraceDuration => "exceeds_trace_duration",

        // Hierarchy
        /// Parent points at the span itself.
        CircularParent => "circular_parent",
        /// Parent points at an id no span carries.
        OrphanParent => "orphan_parent",
        /// Synthetic parent chain hundreds of levels deep.
        DeepNesting => "deep_nesting",

        // Attributes
        /// Attribute value of hundreds of kilobytes.
        OversizedAttribute => "oversized_attribute",
        /// Attribute holding an unserializable handle.
        NonSerializableAttribute => "non_serializable_attribute",
        /// Reserved or dangerous attribute keys (`__proto__`, `constructor`).
        ReservedAttributeKey => "reserved_attribute_key",
        /// Raw binary inside a text attribute.
        BinaryInTextAttribute => "binary_in_text_attribute",

        // Events
        /// Event without a timestamp.
        MissingEventTimestamp => "missing_event_timestamp",
        /// Event timestamp of the wrong type.
        InvalidEventTimestamp => "invalid_event_timestamp",
        /// Tens of thousands of events.
        OversizedEventList => "oversized_event_list",
        /// Events that are not maps.
        MalformedEvent => "malformed_event",

        // Resource / service metadata
        /// `service.name` removed from the resource.
        MissingServiceName => "missing_service_name",
        /// Visually identical resource keys with conflicting values.
        ConflictingResourceKeys => "conflicting_resource_keys",

        // Protocol
        /// Span kind outside the protocol enum.
        InvalidSpanKind => "invalid_span_kind",
        /// Status code outside the protocol enum.
        InvalidStatusCode => "invalid_status_code",
        /// Links with missing or mistyped fields.
        MalformedLinks => "malformed_links",

        // Encoding
        /// Span name as invalid UTF-8 bytes.
        InvalidUtf8Name => "invalid_utf8_name",
        /// Span name mixing Latin-1 and UTF-8 encodings.
        MixedEncodingName => "mixed_encoding_name",
        /// Control characters inside the span name.
        ControlCharacters => "control_characters",
    }
}

impl SpanMalformationKind {
    /// Kinds that rewrite the parent reference.
    pub const HIERARCHY: &'static [SpanMalformationKind] = &[
        SpanMalformationKind::CircularParent,
        SpanMalformationKind::OrphanParent,
        SpanMalformationKind::DeepNesting,
    ];

    /// Kinds that allocate large payloads.
    pub const HEAVY: &'static [SpanMalformationKind] = &[
        SpanMalformationKind::OversizedAttribute,
        SpanMalformationKind::OversizedEventList,
        SpanMalformationKind::DeepNesting,
    ];
}

/// One malformation applied to one span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanMalformation {
    /// What was done.
    pub kind: SpanMalformationKind,
    /// Dotted path of the field that changed (`"status.code"`).
    pub field_path: String,
    /// Value before the change (`Null` when the field was absent).
    pub original_value: Value,
    /// Value after the change (`Null` when the field was removed).
    pub malformed_value: Value,
    /// Human-readable description.
    pub description: String,
    /// Identifier of the malformed span, when it still has one.
    pub span_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roughly_thirty_kinds() {
        assert!(SpanMalformationKind::ALL.len() >= 30);
    }

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<_> = SpanMalformationKind::ALL.iter().map(|k| k.as_str()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), SpanMalformationKind::ALL.len());
    }
}
