//! Trace-span malformation.
//!
//! Spans are [`Value::Map`]s in the OTLP-like shape built by
//! [`SpanMutator::base_span`]. Every [`SpanMalformationKind`] maps to one
//! transform in a table built at construction; each transform rewrites one
//! field and reports the before/after values.
//!
//! Self-referencing spans are expressed through identifiers only
//! (`parent_span_id == span_id`), never through a cyclic value graph.

use chaos_types::time::unix_millis_now;
use chaos_types::{SpanMalformation, SpanMalformationKind, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::payloads::{INVALID_UTF8, RESERVED_KEYS};

/// Default size of an oversized attribute value (256 KiB).
pub const DEFAULT_OVERSIZED_ATTRIBUTE: usize = 256 * 1024;

/// Default length of an oversized event list.
pub const DEFAULT_EVENT_LIST_LEN: usize = 10_000;

/// Default depth of a synthetic parent chain.
pub const DEFAULT_NESTING_DEPTH: usize = 256;

/// Most malformations stacked on one span at intensity 1.0.
pub const MAX_MALFORMATIONS_PER_SPAN: usize = 5;

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Span mutator errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpanError {
    /// The span was not a map.
    #[error("span must be a map, found {found}")]
    NotAMap {
        /// Type that was found.
        found: &'static str,
    },
    /// Intensity outside `[0.0, 1.0]`.
    #[error("intensity {0} outside [0, 1]")]
    InvalidIntensity(f64),
    /// No transform registered for the kind.
    #[error("no transform registered for {0}")]
    Unregistered(SpanMalformationKind),
}

/// A span with exactly one malformation applied.
#[derive(Debug, Clone)]
pub struct MalformedSpan {
    /// The malformed span.
    pub span: Value,
    /// What was done to it.
    pub malformation: SpanMalformation,
}

/// A corrupted distributed trace: one clean root plus malformed children.
#[derive(Debug, Clone)]
pub struct MalformedTrace {
    /// Trace identifier the spans were built with.
    pub trace_id: String,
    /// Root first, then children in creation order.
    pub spans: Vec<Value>,
    /// Every malformation applied, in order.
    pub malformations: Vec<SpanMalformation>,
}

impl MalformedTrace {
    /// The root span.
    pub fn root(&self) -> Option<&Value> {
        self.spans.first()
    }

    /// Child spans.
    pub fn children(&self) -> &[Value] {
        self.spans.get(1..).unwrap_or(&[])
    }
}

type Fields = BTreeMap<String, Value>;
type TransformFn = fn(&mut SpanCtx<'_>, &mut Fields) -> Change;

struct SpanCtx<'a> {
    rng: &'a mut StdRng,
    known_ids: &'a [String],
    oversized_bytes: usize,
    event_list_len: usize,
    nesting_depth: usize,
}

struct Change {
    field_path: String,
    original: Value,
    malformed: Value,
    description: String,
}

impl Change {
    fn new(path: impl Into<String>, original: Value, malformed: Value, description: impl Into<String>) -> Self {
        Self {
            field_path: path.into(),
            original,
            malformed,
            description: description.into(),
        }
    }
}

/// Span malformation generator. One instance per worker.
pub struct SpanMutator {
    rng: StdRng,
    oversized_bytes: usize,
    event_list_len: usize,
    nesting_depth: usize,
    transforms: HashMap<SpanMalformationKind, TransformFn>,
}

impl std::fmt::Debug for SpanMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanMutator")
            .field("oversized_bytes", &self.oversized_bytes)
            .field("event_list_len", &self.event_list_len)
            .field("nesting_depth", &self.nesting_depth)
            .finish()
    }
}

impl SpanMutator {
    /// Create a mutator with a deterministic seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            oversized_bytes: DEFAULT_OVERSIZED_ATTRIBUTE,
            event_list_len: DEFAULT_EVENT_LIST_LEN,
            nesting_depth: DEFAULT_NESTING_DEPTH,
            transforms: SpanMalformationKind::ALL
                .iter()
                .map(|kind| (*kind, transform_for(*kind)))
                .collect(),
        }
    }

    /// Size of oversized attribute values.
    pub fn with_oversized_bytes(mut self, bytes: usize) -> Self {
        self.oversized_bytes = bytes.max(1);
        self
    }

    /// Length of oversized event lists.
    pub fn with_event_list_len(mut self, len: usize) -> Self {
        self.event_list_len = len.max(2);
        self
    }

    /// Depth of synthetic parent chains.
    pub fn with_nesting_depth(mut self, depth: usize) -> Self {
        self.nesting_depth = depth.max(2);
        self
    }

    /// A well-formed span with fresh identifiers.
    pub fn base_span(&mut self) -> Value {
        let trace_id = random_hex(&mut self.rng, 16);
        self.span_in_trace(&trace_id, None)
    }

    /// A well-formed span belonging to `trace_id`, optionally under `parent`.
    pub fn span_in_trace(&mut self, trace_id: &str, parent: Option<&str>) -> Value {
        let start = unix_millis_now() as i64 * NANOS_PER_MILLI;
        let end = start + self.rng.gen_range(1..500) * NANOS_PER_MILLI;
        let names = ["replay.process", "http.request", "db.query", "queue.publish"];
        let name = names.choose(&mut self.rng).copied().unwrap_or("replay.process");

        Value::object([
            ("trace_id", Value::from(trace_id)),
            ("span_id", Value::Str(random_hex(&mut self.rng, 8))),
            ("parent_span_id", Value::from(parent.unwrap_or(""))),
            ("name", Value::from(name)),
            // SPAN_KIND_SERVER
            ("kind", Value::Int(2)),
            ("start_time_unix_nano", Value::Int(start)),
            ("end_time_unix_nano", Value::Int(end)),
            (
                "attributes",
                Value::object([
                    ("http.method", Value::from("POST")),
                    ("http.route", Value::from("/v1/traces")),
                    ("http.status_code", Value::Int(200)),
                ]),
            ),
            (
                "events",
                Value::List(vec![Value::object([
                    ("name", Value::from("request.received")),
                    ("time_unix_nano", Value::Int(start + NANOS_PER_MILLI)),
                    ("attributes", Value::Map(BTreeMap::new())),
                ])]),
            ),
            ("links", Value::List(Vec::new())),
            (
                "status",
                Value::object([("code", Value::Int(1)), ("message", Value::from(""))]),
            ),
            (
                "resource",
                Value::object([
                    ("service.name", Value::from("replay-engine")),
                    ("service.version", Value::from("1.0.0")),
                ]),
            ),
        ])
    }

    /// A well-formed trace of one root and `children` child spans.
    pub fn valid_trace(&mut self, children: usize) -> Vec<Value> {
        let trace_id = random_hex(&mut self.rng, 16);
        let root = self.span_in_trace(&trace_id, None);
        let root_id = span_id(&root).unwrap_or_default();
        let mut spans = Vec::with_capacity(children + 1);
        spans.push(root);
        for _ in 0..children {
            spans.push(self.span_in_trace(&trace_id, Some(&root_id)));
        }
        spans
    }

    /// Apply one malformation (random when `kind` is `None`).
    pub fn mutate_span(
        &mut self,
        span: &Value,
        kind: Option<SpanMalformationKind>,
    ) -> Result<MalformedSpan, SpanError> {
        let kind = match kind {
            Some(kind) => kind,
            None => *SpanMalformationKind::ALL
                .choose(&mut self.rng)
                .unwrap_or(&SpanMalformationKind::EmptySpanId),
        };
        let mut malformed = span.clone();
        let malformation = self.apply(&mut malformed, kind, &[])?;
        Ok(MalformedSpan {
            span: malformed,
            malformation,
        })
    }

    /// Stack several malformations on one span.
    ///
    /// Applies `max(1, round(intensity * 5))` distinct kinds drawn from
    /// `kinds` (every kind when `None` or empty) to `base` (a fresh
    /// [`base_span`](Self::base_span) when `None`).
    pub fn create_malformed_span(
        &mut self,
        base: Option<&Value>,
        kinds: Option<&[SpanMalformationKind]>,
        intensity: f64,
    ) -> Result<(Value, Vec<SpanMalformation>), SpanError> {
        self.malform_with_context(base, kinds, intensity, &[])
    }

    /// Build one clean root plus `span_count` children, each independently
    /// malformed at `intensity`.
    pub fn create_malformed_trace(
        &mut self,
        span_count: usize,
        intensity: f64,
    ) -> Result<MalformedTrace, SpanError> {
        check_intensity(intensity)?;
        let trace_id = random_hex(&mut self.rng, 16);
        let root = self.span_in_trace(&trace_id, None);
        let root_id = span_id(&root).unwrap_or_default();

        let mut known_ids = vec![root_id.clone()];
        let mut spans = Vec::with_capacity(span_count + 1);
        let mut malformations = Vec::new();
        spans.push(root);

        for _ in 0..span_count {
            let child = self.span_in_trace(&trace_id, Some(&root_id));
            if let Some(id) = span_id(&child) {
                known_ids.push(id);
            }
            let (child, applied) =
                self.malform_with_context(Some(&child), None, intensity, &known_ids)?;
            malformations.extend(applied);
            spans.push(child);
        }

        tracing::debug!(
            trace_id = %trace_id,
            spans = spans.len(),
            malformations = malformations.len(),
            "built malformed trace"
        );
        Ok(MalformedTrace {
            trace_id,
            spans,
            malformations,
        })
    }

    fn malform_with_context(
        &mut self,
        base: Option<&Value>,
        kinds: Option<&[SpanMalformationKind]>,
        intensity: f64,
        known_ids: &[String],
    ) -> Result<(Value, Vec<SpanMalformation>), SpanError> {
        check_intensity(intensity)?;
        let mut span = match base {
            Some(base) => base.clone(),
            None => self.base_span(),
        };
        let pool = match kinds {
            Some(kinds) if !kinds.is_empty() => kinds,
            _ => SpanMalformationKind::ALL,
        };
        let count = ((intensity * MAX_MALFORMATIONS_PER_SPAN as f64).round() as usize)
            .clamp(1, pool.len());
        let chosen: Vec<SpanMalformationKind> =
            pool.choose_multiple(&mut self.rng, count).copied().collect();

        let mut applied = Vec::with_capacity(chosen.len());
        for kind in chosen {
            applied.push(self.apply(&mut span, kind, known_ids)?);
        }
        Ok((span, applied))
    }

    fn apply(
        &mut self,
        span: &mut Value,
        kind: SpanMalformationKind,
        known_ids: &[String],
    ) -> Result<SpanMalformation, SpanError> {
        let found = span.type_name();
        let fields = span.as_map_mut().ok_or(SpanError::NotAMap { found })?;
        let transform = self
            .transforms
            .get(&kind)
            .copied()
            .ok_or(SpanError::Unregistered(kind))?;

        let before = fields.clone();
        let mut ctx = SpanCtx {
            rng: &mut self.rng,
            known_ids,
            oversized_bytes: self.oversized_bytes,
            event_list_len: self.event_list_len,
            nesting_depth: self.nesting_depth,
        };
        let mut change = transform(&mut ctx, fields);
        if *fields == before {
            // The field already held the malformed value; mark the span instead.
            let key = format!("__chaos_{kind}");
            fields.insert(key.clone(), Value::from(kind.as_str()));
            change = Change::new(key, Value::Null, Value::from(kind.as_str()), change.description);
        }
        let span_ref = fields.get("span_id").and_then(Value::as_str).map(str::to_string);

        Ok(SpanMalformation {
            kind,
            field_path: change.field_path,
            original_value: change.original,
            malformed_value: change.malformed,
            description: change.description,
            span_ref,
        })
    }
}

fn check_intensity(intensity: f64) -> Result<(), SpanError> {
    if (0.0..=1.0).contains(&intensity) {
        Ok(())
    } else {
        Err(SpanError::InvalidIntensity(intensity))
    }
}

fn span_id(span: &Value) -> Option<String> {
    span.get("span_id").and_then(Value::as_str).map(str::to_string)
}

fn random_hex(rng: &mut StdRng, bytes: usize) -> String {
    let raw: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(raw)
}

fn non_hex(rng: &mut StdRng, len: usize) -> String {
    const ALPHABET: &[u8] = b"ghijklmnopqrstuvwxyzGHIJKLMNOPQRSTUVWXYZ!@#-_ ";
    let mut s: Vec<u8> = random_hex(rng, len.div_ceil(2)).into_bytes();
    s.truncate(len);
    let hits = rng.gen_range(1..=len.max(1).min(4));
    for _ in 0..hits {
        let i = rng.gen_range(0..s.len().max(1));
        if let (Some(slot), Some(c)) = (s.get_mut(i), ALPHABET.choose(rng)) {
            *slot = *c;
        }
    }
    String::from_utf8_lossy(&s).into_owned()
}

/// Replace a top-level field, returning the change record.
fn set(fields: &mut Fields, key: &str, value: Value, description: &str) -> Change {
    let original = fields.insert(key.to_string(), value.clone()).unwrap_or(Value::Null);
    Change::new(key, original, value, description)
}

/// Run `f` on a nested map. A missing or non-map field starts out empty.
fn with_section<R>(fields: &mut Fields, key: &str, f: impl FnOnce(&mut Fields) -> R) -> R {
    let mut section = match fields.remove(key) {
        Some(Value::Map(map)) => map,
        _ => BTreeMap::new(),
    };
    let out = f(&mut section);
    fields.insert(key.to_string(), Value::Map(section));
    out
}

/// Run `f` on a list field. A missing or non-list field starts out empty.
fn with_list<R>(fields: &mut Fields, key: &str, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    let mut items = match fields.remove(key) {
        Some(Value::List(items)) => items,
        _ => Vec::new(),
    };
    let out = f(&mut items);
    fields.insert(key.to_string(), Value::List(items));
    out
}

fn start_nanos(fields: &Fields) -> i64 {
    fields
        .get("start_time_unix_nano")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| unix_millis_now() as i64 * NANOS_PER_MILLI)
}

fn transform_for(kind: SpanMalformationKind) -> TransformFn {
    use SpanMalformationKind::*;
    match kind {
        EmptyTraceId => empty_trace_id,
        OversizedTraceId => oversized_trace_id,
        NonHexTraceId => non_hex_trace_id,
        EmptySpanId => empty_span_id,
        OversizedSpanId => oversized_span_id,
        NonHexSpanId => non_hex_span_id,
        DuplicateSpanId => duplicate_span_id,
        MissingRequiredIds => missing_required_ids,
        FutureTimestamp => future_timestamp,
        NegativeTimestamp => negative_timestamp,
        OverflowTimestamp => overflow_timestamp,
        NonNumericTimestamp => non_numeric_timestamp,
        NegativeDuration => negative_duration,
        InfiniteDuration => infinite_duration,
        ExceedsTraceDuration => exceeds_trace_duration,
        CircularParent => circular_parent,
        OrphanParent => orphan_parent,
        DeepNesting => deep_nesting,
        OversizedAttribute => oversized_attribute,
        NonSerializableAttribute => non_serializable_attribute,
        ReservedAttributeKey => reserved_attribute_key,
        BinaryInTextAttribute => binary_in_text_attribute,
        MissingEventTimestamp => missing_event_timestamp,
        InvalidEventTimestamp => invalid_event_timestamp,
        OversizedEventList => oversized_event_list,
        MalformedEvent => malformed_event,
        MissingServiceName => missing_service_name,
        ConflictingResourceKeys => conflicting_resource_keys,
        InvalidSpanKind => invalid_span_kind,
        InvalidStatusCode => invalid_status_code,
        MalformedLinks => malformed_links,
        InvalidUtf8Name => invalid_utf8_name,
        MixedEncodingName => mixed_encoding_name,
        ControlCharacters => control_characters,
    }
}

// =========================================================================
// Identifiers
// =========================================================================

fn empty_trace_id(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    set(fields, "trace_id", Value::from(""), "trace_id emptied")
}

fn oversized_trace_id(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let id = random_hex(ctx.rng, 512);
    set(fields, "trace_id", Value::Str(id), "trace_id of 1024 hex characters")
}

fn non_hex_trace_id(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let id = non_hex(ctx.rng, 32);
    set(fields, "trace_id", Value::Str(id), "trace_id with non-hex characters")
}

fn empty_span_id(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    set(fields, "span_id", Value::from(""), "span_id emptied")
}

fn oversized_span_id(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let id = random_hex(ctx.rng, 256);
    set(fields, "span_id", Value::Str(id), "span_id of 512 hex characters")
}

fn non_hex_span_id(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let id = non_hex(ctx.rng, 16);
    set(fields, "span_id", Value::Str(id), "span_id with non-hex characters")
}

fn duplicate_span_id(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let current = fields.get("span_id").and_then(Value::as_str).unwrap_or("").to_string();
    let parent = fields
        .get("parent_span_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let mut candidates: Vec<String> = ctx
        .known_ids
        .iter()
        .filter(|id| **id != current)
        .cloned()
        .collect();
    if !parent.is_empty() && parent != current {
        candidates.push(parent);
    }
    let duplicate = candidates
        .choose(ctx.rng)
        .cloned()
        .unwrap_or_else(|| {
            if current == "0000000000000001" {
                "0000000000000002".to_string()
            } else {
                "0000000000000001".to_string()
            }
        });
    set(
        fields,
        "span_id",
        Value::Str(duplicate),
        "span_id duplicates another span in the trace",
    )
}

fn missing_required_ids(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let trace = fields.remove("trace_id").unwrap_or(Value::Null);
    let span = fields.remove("span_id").unwrap_or(Value::Null);
    Change::new(
        "trace_id,span_id",
        Value::object([("trace_id", trace), ("span_id", span)]),
        Value::Null,
        "trace_id and span_id removed",
    )
}

// =========================================================================
// Timestamps and durations
// =========================================================================

fn future_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let years = ctx.rng.gen_range(20..80i64);
    let future = unix_millis_now() as i64 * NANOS_PER_MILLI + years * 365 * 86_400 * NANOS_PER_SEC;
    set(
        fields,
        "start_time_unix_nano",
        Value::Int(future),
        "start time decades in the future",
    )
}

fn negative_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let value = -ctx.rng.gen_range(1..=i64::MAX / 2);
    set(
        fields,
        "start_time_unix_nano",
        Value::Int(value),
        "negative start time",
    )
}

fn overflow_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let value = if ctx.rng.gen_bool(0.5) {
        Value::Int(i64::MAX)
    } else {
        Value::Float(u64::MAX as f64 * 4.0)
    };
    set(
        fields,
        "start_time_unix_nano",
        value,
        "start time at the integer ceiling",
    )
}

fn non_numeric_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    const TEXT: &[&str] = &["2024-01-01T00:00:00Z", "yesterday", "NaN", "0x1F", ""];
    let text = TEXT.choose(ctx.rng).copied().unwrap_or("yesterday");
    set(
        fields,
        "start_time_unix_nano",
        Value::from(text),
        "start time as text",
    )
}

fn negative_duration(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let start = start_nanos(fields);
    let end = start.saturating_sub(ctx.rng.gen_range(1..3600) * NANOS_PER_SEC);
    set(
        fields,
        "end_time_unix_nano",
        Value::Int(end),
        "end time before start time",
    )
}

fn infinite_duration(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    set(
        fields,
        "end_time_unix_nano",
        Value::Float(f64::INFINITY),
        "end time is infinite",
    )
}

fn exceeds_trace_duration(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let start = start_nanos(fields);
    let days = ctx.rng.gen_range(30..365i64);
    let end = start.saturating_add(days * 86_400 * NANOS_PER_SEC);
    set(
        fields,
        "end_time_unix_nano",
        Value::Int(end),
        "span lasts longer than any enclosing trace",
    )
}

// =========================================================================
// Hierarchy
// =========================================================================

fn circular_parent(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let own = match fields.get("span_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = random_hex(ctx.rng, 8);
            fields.insert("span_id".into(), Value::Str(id.clone()));
            id
        }
    };
    set(
        fields,
        "parent_span_id",
        Value::Str(own),
        "parent_span_id points at the span itself",
    )
}

fn orphan_parent(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let own = fields.get("span_id").and_then(Value::as_str).unwrap_or("").to_string();
    let current = fields
        .get("parent_span_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let mut orphan = random_hex(ctx.rng, 8);
    while orphan == own || orphan == current || ctx.known_ids.contains(&orphan) {
        orphan = random_hex(ctx.rng, 8);
    }
    set(
        fields,
        "parent_span_id",
        Value::Str(orphan),
        "parent_span_id references a span that does not exist",
    )
}

fn deep_nesting(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let mut chain = Value::Null;
    for _ in 0..ctx.nesting_depth {
        chain = Value::object([
            ("span_id", Value::Str(random_hex(ctx.rng, 8))),
            ("parent", chain),
        ]);
    }
    let original = fields.insert("parent_chain".into(), chain).unwrap_or(Value::Null);
    Change::new(
        "parent_chain",
        original,
        Value::Int(ctx.nesting_depth as i64),
        format!("synthetic parent chain {} levels deep", ctx.nesting_depth),
    )
}

// =========================================================================
// Attributes
// =========================================================================

fn oversized_attribute(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let fill = (b'a' + ctx.rng.gen_range(0..26)) as char;
    let value: String = std::iter::repeat(fill).take(ctx.oversized_bytes).collect();
    let original = with_section(fields, "attributes", |attrs| {
        attrs
            .insert("chaos.oversized".into(), Value::Str(value))
            .unwrap_or(Value::Null)
    });
    Change::new(
        "attributes.chaos.oversized",
        original,
        Value::Int(ctx.oversized_bytes as i64),
        format!("attribute of {} bytes", ctx.oversized_bytes),
    )
}

fn non_serializable_attribute(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    const HANDLES: &[&str] = &["<socket fd=3>", "<function callback>", "<thread 0x7f3a>"];
    let handle = HANDLES.choose(ctx.rng).copied().unwrap_or("<socket fd=3>");
    let value = Value::Opaque(handle.into());
    let original = with_section(fields, "attributes", |attrs| {
        attrs
            .insert("chaos.handle".into(), value.clone())
            .unwrap_or(Value::Null)
    });
    Change::new(
        "attributes.chaos.handle",
        original,
        value,
        "attribute holds a value with no serialized form",
    )
}

fn reserved_attribute_key(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let key = RESERVED_KEYS.choose(ctx.rng).copied().unwrap_or("__proto__");
    let value = Value::object([("polluted", Value::Bool(true))]);
    let original = with_section(fields, "attributes", |attrs| {
        attrs.insert(key.into(), value.clone()).unwrap_or(Value::Null)
    });
    Change::new(
        format!("attributes.{key}"),
        original,
        value,
        format!("reserved attribute key {key:?}"),
    )
}

fn binary_in_text_attribute(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    with_section(fields, "attributes", |attrs| {
        let keys: Vec<String> = attrs
            .iter()
            .filter(|(_, v)| matches!(v, Value::Str(_)))
            .map(|(k, _)| k.clone())
            .collect();
        let key = keys
            .choose(ctx.rng)
            .cloned()
            .unwrap_or_else(|| "http.method".to_string());
        let mut bytes = attrs
            .get(&key)
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .as_bytes()
            .to_vec();
        let at = ctx.rng.gen_range(0..=bytes.len());
        bytes.splice(at..at, [0x00, 0xFF, 0xFE, 0x07, 0x80]);
        let value = Value::Bytes(bytes);
        let original = attrs.insert(key.clone(), value.clone()).unwrap_or(Value::Null);
        Change::new(
            format!("attributes.{key}"),
            original,
            value,
            "raw binary inside a text attribute",
        )
    })
}

// =========================================================================
// Events
// =========================================================================

fn missing_event_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    with_list(fields, "events", |events| {
        let timed: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.get("time_unix_nano").is_some())
            .map(|(i, _)| i)
            .collect();
        if let Some(&i) = timed.choose(ctx.rng) {
            if let Some(event) = events.get_mut(i).and_then(Value::as_map_mut) {
                let original = event.remove("time_unix_nano").unwrap_or(Value::Null);
                return Change::new(
                    format!("events.{i}.time_unix_nano"),
                    original,
                    Value::Null,
                    "event timestamp removed",
                );
            }
        }
        let i = events.len();
        events.push(Value::object([("name", Value::from("exception"))]));
        Change::new(
            format!("events.{i}"),
            Value::Null,
            Value::from("exception"),
            "event appended without a timestamp",
        )
    })
}

fn invalid_event_timestamp(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let bad = match ctx.rng.gen_range(0..4) {
        0 => Value::from("not-a-time"),
        1 => Value::Int(-1),
        2 => Value::Float(f64::NAN),
        _ => Value::List(vec![Value::Int(1)]),
    };
    with_list(fields, "events", |events| {
        if events.is_empty() || !events.iter().any(|e| matches!(e, Value::Map(_))) {
            events.push(Value::object([("name", Value::from("log"))]));
        }
        let maps: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Value::Map(_)))
            .map(|(i, _)| i)
            .collect();
        let i = maps.choose(ctx.rng).copied().unwrap_or(0);
        let original = events
            .get_mut(i)
            .and_then(Value::as_map_mut)
            .and_then(|e| e.insert("time_unix_nano".into(), bad.clone()))
            .unwrap_or(Value::Null);
        Change::new(
            format!("events.{i}.time_unix_nano"),
            original,
            bad,
            "event timestamp of the wrong type",
        )
    })
}

fn oversized_event_list(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let start = start_nanos(fields);
    let len = ctx.event_list_len;
    let events: Vec<Value> = (0..len)
        .map(|i| {
            Value::object([
                ("name", Value::from("log")),
                ("time_unix_nano", Value::Int(start.saturating_add(i as i64))),
            ])
        })
        .collect();
    let original = fields.insert("events".into(), Value::List(events)).unwrap_or(Value::Null);
    let original_len = match &original {
        Value::List(items) => items.len() as i64,
        _ => 0,
    };
    Change::new(
        "events",
        Value::Int(original_len),
        Value::Int(len as i64),
        format!("{len} events on one span"),
    )
}

fn malformed_event(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let bad = match ctx.rng.gen_range(0..4) {
        0 => Value::from("exception"),
        1 => Value::Int(42),
        2 => Value::Null,
        _ => Value::List(vec![Value::from("name"), Value::Int(0)]),
    };
    with_list(fields, "events", |events| {
        let i = events.len();
        events.push(bad.clone());
        Change::new(
            format!("events.{i}"),
            Value::Null,
            bad,
            "event that is not a map",
        )
    })
}

// =========================================================================
// Resource / service metadata
// =========================================================================

fn missing_service_name(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let original = with_section(fields, "resource", |resource| {
        resource.remove("service.name").unwrap_or(Value::Null)
    });
    Change::new(
        "resource.service.name",
        original,
        Value::Null,
        "service.name removed from resource",
    )
}

fn conflicting_resource_keys(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    const IMPOSTORS: &[&str] = &["service.name\u{200B}", "Service.Name", "service\u{2024}name"];
    let key = IMPOSTORS.choose(ctx.rng).copied().unwrap_or("Service.Name");
    let (original, value) = with_section(fields, "resource", |resource| {
        let real = resource
            .get("service.name")
            .and_then(Value::as_str)
            .unwrap_or("replay-engine")
            .to_string();
        let value = Value::Str(format!("{real}-impostor"));
        let original = resource.insert(key.into(), value.clone()).unwrap_or(Value::Null);
        (original, value)
    });
    Change::new(
        format!("resource.{key}"),
        original,
        value,
        "resource key visually identical to service.name with a different value",
    )
}

// =========================================================================
// Protocol
// =========================================================================

fn invalid_span_kind(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let value = match ctx.rng.gen_range(0..3) {
        0 => Value::Int(99),
        1 => Value::Int(-1),
        _ => Value::from("SPAN_KIND_BOGUS"),
    };
    set(fields, "kind", value, "span kind outside the protocol enum")
}

fn invalid_status_code(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let value = match ctx.rng.gen_range(0..3) {
        0 => Value::Int(42),
        1 => Value::Int(-7),
        _ => Value::from("MAYBE"),
    };
    let original = with_section(fields, "status", |status| {
        status.insert("code".into(), value.clone()).unwrap_or(Value::Null)
    });
    Change::new(
        "status.code",
        original,
        value,
        "status code outside the protocol enum",
    )
}

fn malformed_links(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let links = Value::List(vec![
        Value::object([("trace_id", Value::Int(12))]),
        Value::from("link"),
        Value::object([
            ("trace_id", Value::Str(non_hex(ctx.rng, 32))),
            ("span_id", Value::Null),
            ("attributes", Value::from("not-a-map")),
        ]),
    ]);
    set(fields, "links", links, "links with missing or mistyped fields")
}

// =========================================================================
// Encoding
// =========================================================================

fn current_name(fields: &Fields) -> Vec<u8> {
    match fields.get("name") {
        Some(Value::Str(s)) => s.clone().into_bytes(),
        Some(Value::Bytes(b)) => b.clone(),
        _ => b"replay.process".to_vec(),
    }
}

fn invalid_utf8_name(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let mut bytes = current_name(fields);
    let seq = INVALID_UTF8.choose(ctx.rng).copied().unwrap_or(&[0xFF]);
    let at = ctx.rng.gen_range(0..=bytes.len());
    bytes.splice(at..at, seq.iter().copied());
    set(fields, "name", Value::Bytes(bytes), "span name is invalid UTF-8")
}

fn mixed_encoding_name(_: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    let mut bytes = current_name(fields);
    // Latin-1 "café" followed by its UTF-8 spelling.
    bytes.extend_from_slice(b" caf\xE9 / ");
    bytes.extend_from_slice("café".as_bytes());
    set(
        fields,
        "name",
        Value::Bytes(bytes),
        "span name mixes Latin-1 and UTF-8",
    )
}

fn control_characters(ctx: &mut SpanCtx<'_>, fields: &mut Fields) -> Change {
    const CONTROLS: &[&str] = &["\0", "\u{7}", "\u{1b}[31m", "\r\n", "\u{8}\u{8}\u{8}", "\u{7f}"];
    let name = String::from_utf8_lossy(&current_name(fields)).into_owned();
    let control = CONTROLS.choose(ctx.rng).copied().unwrap_or("\0");
    let boundaries: Vec<usize> = name
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(name.len()))
        .collect();
    let at = boundaries.choose(ctx.rng).copied().unwrap_or(0);
    let mut malformed = String::with_capacity(name.len() + control.len());
    malformed.push_str(&name[..at]);
    malformed.push_str(control);
    malformed.push_str(&name[at..]);
    set(
        fields,
        "name",
        Value::Str(malformed),
        "control characters inside the span name",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutator() -> SpanMutator {
        SpanMutator::new(42)
            .with_oversized_bytes(4096)
            .with_event_list_len(64)
            .with_nesting_depth(16)
    }

    #[test]
    fn base_span_is_well_formed() {
        let mut m = mutator();
        let span = m.base_span();
        assert_eq!(span.get("trace_id").and_then(Value::as_str).unwrap().len(), 32);
        assert_eq!(span.get("span_id").and_then(Value::as_str).unwrap().len(), 16);
        assert_eq!(span.get("parent_span_id").and_then(Value::as_str), Some(""));
        assert!(span.get("resource").unwrap().get("service.name").is_some());
        assert!(span.to_json().is_ok());
    }

    #[test]
    fn every_kind_changes_the_span() {
        let mut m = mutator();
        let span = m.base_span();
        for kind in SpanMalformationKind::ALL {
            for _ in 0..10 {
                let out = m.mutate_span(&span, Some(*kind)).unwrap();
                assert_ne!(out.span, span, "{kind} was a no-op");
                assert_eq!(out.malformation.kind, *kind);
                assert!(!out.malformation.description.is_empty());
            }
        }
    }

    #[test]
    fn every_kind_changes_an_empty_span() {
        let mut m = mutator();
        let span = Value::Map(BTreeMap::new());
        for kind in SpanMalformationKind::ALL {
            let out = m.mutate_span(&span, Some(*kind)).unwrap();
            assert_ne!(out.span, span, "{kind} left empty span unchanged");
        }
    }

    #[test]
    fn mistyped_containers_are_replaced() {
        let mut m = mutator();
        let span = Value::object([
            ("attributes", Value::from("flat")),
            ("events", Value::Int(3)),
            ("status", Value::Null),
        ]);

        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::OversizedAttribute))
            .unwrap();
        let attrs = out.span.get("attributes").and_then(Value::as_map).unwrap();
        assert_eq!(attrs.len(), 1);
        assert!(attrs.contains_key("chaos.oversized"));

        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::MalformedEvent))
            .unwrap();
        assert!(matches!(out.span.get("events"), Some(Value::List(items)) if items.len() == 1));
        assert_eq!(out.malformation.field_path, "events.0");

        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::InvalidStatusCode))
            .unwrap();
        assert!(out.span.get("status").unwrap().get("code").is_some());
    }

    #[test]
    fn repeated_malformation_still_changes() {
        let mut m = mutator();
        let span = m.base_span();
        let once = m.mutate_span(&span, Some(SpanMalformationKind::EmptyTraceId)).unwrap();
        let twice = m
            .mutate_span(&once.span, Some(SpanMalformationKind::EmptyTraceId))
            .unwrap();
        assert_ne!(twice.span, once.span);
        assert!(twice.malformation.field_path.starts_with("__chaos_"));
    }

    #[test]
    fn circular_parent_references_itself() {
        let mut m = mutator();
        let span = m.base_span();
        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::CircularParent))
            .unwrap();
        assert_eq!(out.span.get("parent_span_id"), out.span.get("span_id"));
        assert_eq!(out.malformation.field_path, "parent_span_id");
        assert_eq!(
            out.malformation.span_ref.as_deref(),
            out.span.get("span_id").and_then(Value::as_str)
        );
    }

    #[test]
    fn non_serializable_attribute_fails_to_serialize() {
        let mut m = mutator();
        let span = m.base_span();
        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::NonSerializableAttribute))
            .unwrap();
        assert!(out.span.to_json().is_err());
        assert!(serde_json::to_string(&out.span).is_err());
    }

    #[test]
    fn missing_required_ids_removes_both() {
        let mut m = mutator();
        let span = m.base_span();
        let out = m
            .mutate_span(&span, Some(SpanMalformationKind::MissingRequiredIds))
            .unwrap();
        assert!(out.span.get("trace_id").is_none());
        assert!(out.span.get("span_id").is_none());
        assert!(out.malformation.span_ref.is_none());
    }

    #[test]
    fn intensity_controls_malformation_count() {
        let mut m = mutator();
        let (_, low) = m.create_malformed_span(None, None, 0.0).unwrap();
        assert_eq!(low.len(), 1);
        let (_, high) = m.create_malformed_span(None, None, 1.0).unwrap();
        assert_eq!(high.len(), MAX_MALFORMATIONS_PER_SPAN);
        let kinds: std::collections::HashSet<_> = high.iter().map(|m| m.kind).collect();
        assert_eq!(kinds.len(), high.len(), "kinds must be distinct");
    }

    #[test]
    fn restricted_kinds_are_respected() {
        let mut m = mutator();
        let allowed = [SpanMalformationKind::EmptySpanId, SpanMalformationKind::InvalidSpanKind];
        let base = m.base_span();
        let (span, applied) = m.create_malformed_span(Some(&base), Some(&allowed), 1.0).unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|a| allowed.contains(&a.kind)));
        assert_ne!(span, base);
    }

    #[test]
    fn invalid_intensity_is_an_error() {
        let mut m = mutator();
        assert_eq!(
            m.create_malformed_span(None, None, 1.5).unwrap_err(),
            SpanError::InvalidIntensity(1.5)
        );
        assert!(m.create_malformed_trace(3, -0.1).is_err());
    }

    #[test]
    fn non_map_span_is_an_error() {
        let mut m = mutator();
        let err = m.mutate_span(&Value::from("span"), None).unwrap_err();
        assert_eq!(err, SpanError::NotAMap { found: "string" });
    }

    #[test]
    fn malformed_trace_has_clean_root() {
        let mut m = mutator();
        let trace = m.create_malformed_trace(5, 0.4).unwrap();
        assert_eq!(trace.spans.len(), 6);
        assert_eq!(trace.children().len(), 5);

        let root = trace.root().unwrap();
        assert_eq!(root.get("parent_span_id").and_then(Value::as_str), Some(""));
        assert_eq!(
            root.get("trace_id").and_then(Value::as_str),
            Some(trace.trace_id.as_str())
        );
        // 0.4 * 5 = 2 malformations per child.
        assert_eq!(trace.malformations.len(), 10);
    }

    #[test]
    fn orphan_parent_is_unknown_in_trace() {
        let mut m = mutator();
        let spans = m.valid_trace(3);
        let known: Vec<String> = spans.iter().filter_map(span_id).collect();
        let mut child = spans[1].clone();
        let fields = child.as_map_mut().unwrap();
        let mut ctx = SpanCtx {
            rng: &mut m.rng,
            known_ids: &known,
            oversized_bytes: 16,
            event_list_len: 2,
            nesting_depth: 2,
        };
        let change = orphan_parent(&mut ctx, fields);
        let parent = change.malformed.as_str().unwrap();
        assert!(!known.iter().any(|id| id == parent));
    }

    #[test]
    fn valid_trace_shares_trace_id() {
        let mut m = mutator();
        let spans = m.valid_trace(4);
        let root_id = span_id(&spans[0]).unwrap();
        let trace_id = spans[0].get("trace_id").cloned();
        for child in &spans[1..] {
            assert_eq!(child.get("trace_id").cloned(), trace_id);
            assert_eq!(
                child.get("parent_span_id").and_then(Value::as_str),
                Some(root_id.as_str())
            );
        }
    }

    #[test]
    fn same_seed_same_trace_shape() {
        let mut a = SpanMutator::new(5).with_oversized_bytes(64).with_event_list_len(8);
        let mut b = SpanMutator::new(5).with_oversized_bytes(64).with_event_list_len(8);
        let ta = a.create_malformed_trace(4, 0.6).unwrap();
        let tb = b.create_malformed_trace(4, 0.6).unwrap();
        let ka: Vec<_> = ta.malformations.iter().map(|m| m.kind).collect();
        let kb: Vec<_> = tb.malformations.iter().map(|m| m.kind).collect();
        assert_eq!(ka, kb);
        assert_eq!(ta.trace_id, tb.trace_id);
    }
}
