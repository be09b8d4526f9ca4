//! Generic structural mutation of keyed/nested records.
//!
//! The engine picks a [`MutationKind`], probabilistically skips, then runs the
//! kind's transform from a dispatch table built once in [`MutationEngine::new`].
//! Transform failures never escape: they come back as a [`MutationResult`]
//! with `success = false` and the original record as `mutated`.
//!
//! When a transform happens to leave the record unchanged (an empty map, a
//! field that already held the boundary value), a `__chaos_<kind>` marker
//! field is added so a successful result always differs from its input.

use chaos_types::{MutationKind, MutationResult, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::payloads::{security_catalogue, INVALID_UTF8, UNICODE_HAZARDS};

/// Default recursion limit for nested mutations.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Default size of overflow strings (256 KiB).
pub const DEFAULT_OVERFLOW_BYTES: usize = 256 * 1024;

/// Element count produced by array explosion.
pub const EXPLOSION_LEN: usize = 10_000;

/// Probability multiplier for fields named in a targeted mutation.
pub const TARGET_BOOST: f64 = 3.0;

/// Errors raised inside a transform. Reported in results, never propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// The record was not a map.
    #[error("record must be a map, found {found}")]
    NotAMap {
        /// Type that was found.
        found: &'static str,
    },
    /// Nested recursion went deeper than allowed.
    #[error("nested mutation exceeded max depth {max}")]
    DepthExceeded {
        /// Configured limit.
        max: usize,
    },
    /// Rate outside `[0.0, 1.0]`.
    #[error("mutation rate {0} outside [0, 1]")]
    InvalidRate(f64),
    /// No handler registered for the kind.
    #[error("no handler registered for {0}")]
    Unregistered(MutationKind),
}

type Fields = BTreeMap<String, Value>;
type MutateFn =
    fn(&mut MutationCtx<'_>, &mut Fields, MutationKind) -> Result<Vec<String>, MutationError>;

struct MutationCtx<'a> {
    rng: &'a mut StdRng,
    handlers: &'a HashMap<MutationKind, MutateFn>,
    depth: usize,
    max_depth: usize,
    overflow_bytes: usize,
    metadata: BTreeMap<String, Value>,
}

/// Record mutation engine.
///
/// Each instance owns its PRNG; give every concurrent worker its own engine.
pub struct MutationEngine {
    rng: StdRng,
    max_depth: usize,
    overflow_bytes: usize,
    handlers: HashMap<MutationKind, MutateFn>,
}

impl std::fmt::Debug for MutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationEngine")
            .field("max_depth", &self.max_depth)
            .field("overflow_bytes", &self.overflow_bytes)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl MutationEngine {
    /// Create an engine with a deterministic seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_depth: DEFAULT_MAX_DEPTH,
            overflow_bytes: DEFAULT_OVERFLOW_BYTES,
            handlers: MutationKind::ALL
                .iter()
                .map(|kind| (*kind, handler_for(*kind)))
                .collect(),
        }
    }

    /// Create an engine seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Set the nested-mutation recursion limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the size of overflow payloads.
    pub fn with_overflow_bytes(mut self, bytes: usize) -> Self {
        self.overflow_bytes = bytes.max(1);
        self
    }

    /// Mutate a record.
    ///
    /// * `allowed` - candidate kinds; empty means every kind
    /// * `rate` - probability the mutation is applied at all
    pub fn mutate(&mut self, record: &Value, allowed: &[MutationKind], rate: f64) -> MutationResult {
        let kind = self.pick_kind(allowed);
        if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
            return failed(record, kind, MutationError::InvalidRate(rate));
        }
        if !self.rng.gen_bool(rate) {
            return skipped(record, kind);
        }
        self.apply(record, kind)
    }

    /// Apply one specific kind, without the probabilistic skip.
    pub fn mutate_with(&mut self, record: &Value, kind: MutationKind) -> MutationResult {
        self.apply(record, kind)
    }

    /// Mutate every record in a batch.
    pub fn mutate_batch(
        &mut self,
        records: &[Value],
        allowed: &[MutationKind],
        rate: f64,
    ) -> Vec<MutationResult> {
        records
            .iter()
            .map(|r| self.mutate(r, allowed, rate))
            .collect()
    }

    /// Mutate only fields whose key is in `targets` (case-insensitive, any depth).
    ///
    /// Each matching field is mutated with probability `rate * TARGET_BOOST`
    /// (capped at 1.0); at least one is mutated whenever any match. Only
    /// value-level kinds apply here.
    pub fn mutate_targeted(
        &mut self,
        record: &Value,
        targets: &[&str],
        allowed: &[MutationKind],
        rate: f64,
    ) -> MutationResult {
        let candidates: Vec<MutationKind> = VALUE_LEVEL
            .iter()
            .copied()
            .filter(|k| allowed.is_empty() || allowed.contains(k))
            .collect();
        let kind = candidates
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(MutationKind::NullInjection);

        if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
            return failed(record, kind, MutationError::InvalidRate(rate));
        }
        if !matches!(record, Value::Map(_)) {
            return failed(
                record,
                kind,
                MutationError::NotAMap {
                    found: record.type_name(),
                },
            );
        }

        let lowered: Vec<String> = targets.iter().map(|t| t.to_ascii_lowercase()).collect();
        let mut paths = Vec::new();
        collect_target_paths(record, &lowered, "", &mut paths);
        if paths.is_empty() {
            let mut result = skipped(record, kind);
            result
                .metadata
                .insert("no_target_fields".into(), Value::Bool(true));
            return result;
        }

        let boosted = (rate * TARGET_BOOST).min(1.0);
        let mut chosen: Vec<String> = paths
            .iter()
            .filter(|_| self.rng.gen_bool(boosted))
            .cloned()
            .collect();
        if chosen.is_empty() {
            if let Some(one) = paths.choose(&mut self.rng) {
                chosen.push(one.clone());
            }
        }

        let mut mutated = record.clone();
        let mut ctx = MutationCtx {
            rng: &mut self.rng,
            handlers: &self.handlers,
            depth: 0,
            max_depth: self.max_depth,
            overflow_bytes: self.overflow_bytes,
            metadata: BTreeMap::new(),
        };
        for path in &chosen {
            if let Some(slot) = value_at_path_mut(&mut mutated, path) {
                corrupt_value(&mut ctx, slot, kind);
            }
        }
        let mut metadata = std::mem::take(&mut ctx.metadata);
        metadata.insert("targeted".into(), Value::Bool(true));
        metadata.insert(
            "matched_fields".into(),
            Value::List(paths.iter().map(|p| Value::from(p.as_str())).collect()),
        );

        let mut points = chosen;
        ensure_changed(record, &mut mutated, kind, &mut points);
        MutationResult {
            original: record.clone(),
            mutated,
            kind,
            mutation_points: points,
            success: true,
            error: None,
            metadata,
        }
    }

    fn pick_kind(&mut self, allowed: &[MutationKind]) -> MutationKind {
        let pool = if allowed.is_empty() {
            MutationKind::ALL
        } else {
            allowed
        };
        pool.choose(&mut self.rng)
            .copied()
            .unwrap_or(MutationKind::FieldInjection)
    }

    fn apply(&mut self, record: &Value, kind: MutationKind) -> MutationResult {
        let mut mutated = record.clone();
        let Some(fields) = mutated.as_map_mut() else {
            return failed(
                record,
                kind,
                MutationError::NotAMap {
                    found: record.type_name(),
                },
            );
        };
        let Some(handler) = self.handlers.get(&kind).copied() else {
            return failed(record, kind, MutationError::Unregistered(kind));
        };

        let mut ctx = MutationCtx {
            rng: &mut self.rng,
            handlers: &self.handlers,
            depth: 0,
            max_depth: self.max_depth,
            overflow_bytes: self.overflow_bytes,
            metadata: BTreeMap::new(),
        };
        match handler(&mut ctx, fields, kind) {
            Ok(mut points) => {
                let metadata = std::mem::take(&mut ctx.metadata);
                ensure_changed(record, &mut mutated, kind, &mut points);
                MutationResult {
                    original: record.clone(),
                    mutated,
                    kind,
                    mutation_points: points,
                    success: true,
                    error: None,
                    metadata,
                }
            }
            Err(e) => {
                tracing::debug!(kind = %kind, error = %e, "mutation failed");
                failed(record, kind, e)
            }
        }
    }
}

/// Kinds that transform a single value in place.
const VALUE_LEVEL: &[MutationKind] = &[
    MutationKind::BitFlip,
    MutationKind::ByteCorruption,
    MutationKind::EncodingCorruption,
    MutationKind::TypeChange,
    MutationKind::BoundaryValue,
    MutationKind::NullInjection,
    MutationKind::OverflowInjection,
    MutationKind::UnicodeCorruption,
    MutationKind::StringTruncation,
    MutationKind::SqlInjection,
    MutationKind::XssInjection,
    MutationKind::TemplateInjection,
    MutationKind::LogInjection,
];

fn handler_for(kind: MutationKind) -> MutateFn {
    match kind {
        MutationKind::FieldDeletion => field_deletion,
        MutationKind::FieldDuplication => field_duplication,
        MutationKind::FieldInjection => field_injection,
        MutationKind::NestedMutation => nested_mutation,
        MutationKind::ArrayExplosion => array_explosion,
        MutationKind::BitFlip
        | MutationKind::ByteCorruption
        | MutationKind::EncodingCorruption
        | MutationKind::TypeChange
        | MutationKind::BoundaryValue
        | MutationKind::NullInjection
        | MutationKind::OverflowInjection
        | MutationKind::UnicodeCorruption
        | MutationKind::StringTruncation
        | MutationKind::SqlInjection
        | MutationKind::XssInjection
        | MutationKind::TemplateInjection
        | MutationKind::LogInjection => mutate_field,
    }
}

/// Fields a value-level kind prefers to hit.
fn preferred_fields(kind: MutationKind) -> fn(&Value) -> bool {
    match kind {
        MutationKind::BitFlip => is_scalar,
        MutationKind::NullInjection => non_null,
        MutationKind::TypeChange | MutationKind::BoundaryValue | MutationKind::OverflowInjection => {
            any
        }
        _ => is_textual,
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(
        v,
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_)
    )
}

fn is_textual(v: &Value) -> bool {
    matches!(v, Value::Str(_) | Value::Bytes(_))
}

fn non_null(v: &Value) -> bool {
    !v.is_null()
}

fn any(_: &Value) -> bool {
    true
}

fn pick_key(rng: &mut StdRng, fields: &Fields, pred: fn(&Value) -> bool) -> Option<String> {
    let keys: Vec<&String> = fields
        .iter()
        .filter(|(_, v)| pred(v))
        .map(|(k, _)| k)
        .collect();
    keys.choose(rng).map(|k| (*k).clone())
}

/// Pick a preferred field (any field if none match) and corrupt its value.
fn mutate_field(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    let key = pick_key(ctx.rng, fields, preferred_fields(kind)).or_else(|| pick_key(ctx.rng, fields, any));
    let Some(key) = key else {
        return Ok(Vec::new());
    };
    if let Some(slot) = fields.get_mut(&key) {
        corrupt_value(ctx, slot, kind);
    }
    Ok(vec![key])
}

/// Value-level transforms shared by plain and targeted mutation.
fn corrupt_value(ctx: &mut MutationCtx<'_>, slot: &mut Value, kind: MutationKind) {
    let replacement = match kind {
        MutationKind::BitFlip => bit_flip(ctx.rng, slot),
        MutationKind::ByteCorruption => byte_corruption(ctx.rng, slot),
        MutationKind::EncodingCorruption => encoding_corruption(ctx.rng, slot),
        MutationKind::TypeChange => type_change(slot),
        MutationKind::BoundaryValue => boundary_value(ctx.rng, slot),
        MutationKind::NullInjection => Value::Null,
        MutationKind::OverflowInjection => overflow(ctx.rng, slot, ctx.overflow_bytes),
        MutationKind::UnicodeCorruption => unicode_corruption(ctx.rng, slot),
        MutationKind::StringTruncation => truncate(ctx.rng, slot),
        MutationKind::SqlInjection
        | MutationKind::XssInjection
        | MutationKind::TemplateInjection
        | MutationKind::LogInjection => {
            let payload = security_catalogue(kind)
                .choose(ctx.rng)
                .copied()
                .unwrap_or("' OR '1'='1");
            ctx.metadata
                .insert("payload".into(), Value::from(payload));
            match slot {
                Value::Str(s) if ctx.rng.gen_bool(0.5) => Value::Str(format!("{s}{payload}")),
                _ => Value::from(payload),
            }
        }
        // Structural kinds do not apply to a lone value; fall back to a type change.
        MutationKind::FieldDeletion
        | MutationKind::FieldDuplication
        | MutationKind::FieldInjection
        | MutationKind::NestedMutation
        | MutationKind::ArrayExplosion => type_change(slot),
    };
    *slot = replacement;
}

fn bytes_to_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::Str(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

fn bit_flip(rng: &mut StdRng, v: &Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(!b),
        Value::Int(i) => Value::Int(i ^ (1i64 << rng.gen_range(0..63))),
        // Magnitude bits only.
        Value::Float(f) => Value::Float(f64::from_bits(f.to_bits() ^ (1u64 << rng.gen_range(0..63)))),
        Value::Str(s) if !s.is_empty() => {
            let mut bytes = s.clone().into_bytes();
            let i = rng.gen_range(0..bytes.len());
            bytes[i] ^= 1 << rng.gen_range(0..8);
            bytes_to_value(bytes)
        }
        Value::Bytes(b) if !b.is_empty() => {
            let mut bytes = b.clone();
            let i = rng.gen_range(0..bytes.len());
            bytes[i] ^= 1 << rng.gen_range(0..8);
            Value::Bytes(bytes)
        }
        _ => Value::Bytes(vec![1 << rng.gen_range(0..8)]),
    }
}

fn byte_corruption(rng: &mut StdRng, v: &Value) -> Value {
    let mut bytes = match v {
        Value::Str(s) => s.clone().into_bytes(),
        Value::Bytes(b) => b.clone(),
        other => other.to_string().into_bytes(),
    };
    if bytes.is_empty() {
        let n = rng.gen_range(1..8);
        return Value::Bytes((0..n).map(|_| rng.gen()).collect());
    }
    let hits = rng.gen_range(1..=4.min(bytes.len()));
    for _ in 0..hits {
        let i = rng.gen_range(0..bytes.len());
        // XOR with a non-zero byte always changes the position.
        bytes[i] ^= rng.gen_range(1..=255u8);
    }
    bytes_to_value(bytes)
}

fn encoding_corruption(rng: &mut StdRng, v: &Value) -> Value {
    let mut bytes = match v {
        Value::Str(s) => s.clone().into_bytes(),
        Value::Bytes(b) => b.clone(),
        other => other.to_string().into_bytes(),
    };
    let seq = INVALID_UTF8.choose(rng).copied().unwrap_or(&[0xFF]);
    let at = if bytes.is_empty() {
        0
    } else {
        rng.gen_range(0..=bytes.len())
    };
    bytes.splice(at..at, seq.iter().copied());
    Value::Bytes(bytes)
}

fn type_change(v: &Value) -> Value {
    match v {
        Value::Null => Value::Int(0),
        Value::Bool(b) => Value::Str(b.to_string()),
        Value::Int(i) => Value::Str(i.to_string()),
        Value::Float(f) => Value::Str(f.to_string()),
        Value::Str(s) => Value::List(vec![Value::Str(s.clone())]),
        Value::Bytes(b) => Value::Int(b.len() as i64),
        Value::List(items) => Value::Map(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item.clone()))
                .collect(),
        ),
        Value::Map(map) => Value::List(map.values().cloned().collect()),
        Value::Opaque(handle) => Value::Str(handle.clone()),
    }
}

fn boundary_value(rng: &mut StdRng, v: &Value) -> Value {
    let candidates: Vec<Value> = match v {
        Value::Int(_) => vec![
            Value::Int(i64::MIN),
            Value::Int(i64::MAX),
            Value::Int(0),
            Value::Int(-1),
            Value::Float(f64::NAN),
        ],
        Value::Float(_) => vec![
            Value::Float(f64::NAN),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(f64::MIN_POSITIVE),
            Value::Float(f64::MAX),
        ],
        Value::Str(_) | Value::Bytes(_) => vec![
            Value::Str(String::new()),
            Value::Str("\0".into()),
            Value::Str("A".repeat(65_536)),
            Value::Str(" ".into()),
        ],
        _ => vec![
            Value::Int(i64::MAX),
            Value::Float(f64::NAN),
            Value::Str(String::new()),
            Value::List(Vec::new()),
            Value::Map(BTreeMap::new()),
        ],
    };
    let different: Vec<Value> = candidates.into_iter().filter(|c| c != v).collect();
    different
        .choose(rng)
        .cloned()
        .unwrap_or(Value::Float(f64::NAN))
}

fn overflow(rng: &mut StdRng, v: &Value, bytes: usize) -> Value {
    match v {
        Value::List(items) if !items.is_empty() => {
            let seed = items[0].clone();
            Value::List(vec![seed; EXPLOSION_LEN])
        }
        _ => {
            let fill = (b'A' + rng.gen_range(0..26)) as char;
            Value::Str(std::iter::repeat(fill).take(bytes).collect())
        }
    }
}

fn unicode_corruption(rng: &mut StdRng, v: &Value) -> Value {
    let hazard = UNICODE_HAZARDS.choose(rng).copied().unwrap_or("\u{202E}");
    match v {
        Value::Str(s) if !s.is_empty() => {
            let boundaries: Vec<usize> = s
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(s.len()))
                .collect();
            let at = boundaries.choose(rng).copied().unwrap_or(0);
            let mut out = String::with_capacity(s.len() + hazard.len());
            out.push_str(&s[..at]);
            out.push_str(hazard);
            out.push_str(&s[at..]);
            Value::Str(out)
        }
        _ => Value::from(hazard),
    }
}

fn truncate(rng: &mut StdRng, v: &Value) -> Value {
    match v {
        Value::Str(s) if s.len() >= 2 => {
            let bytes = s.as_bytes();
            let cut = rng.gen_range(1..bytes.len());
            bytes_to_value(bytes[..cut].to_vec())
        }
        Value::Bytes(b) if b.len() >= 2 => Value::Bytes(b[..rng.gen_range(1..b.len())].to_vec()),
        // Nothing left to cut: a dangling UTF-8 lead sequence.
        _ => Value::Bytes(vec![0xE2, 0x82]),
    }
}

fn field_deletion(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    _kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    let Some(key) = pick_key(ctx.rng, fields, any) else {
        return Ok(Vec::new());
    };
    let removed = fields.remove(&key);
    if let Some(removed) = removed {
        ctx.metadata
            .insert("removed_type".into(), Value::from(removed.type_name()));
    }
    Ok(vec![key])
}

fn field_duplication(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    _kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    let Some(key) = pick_key(ctx.rng, fields, any) else {
        return Ok(Vec::new());
    };
    let value = fields.get(&key).cloned().unwrap_or_default();
    // Zero-width space: renders identically to the original key.
    let mut dup = format!("{key}\u{200B}");
    while fields.contains_key(&dup) {
        dup.push('\u{200B}');
    }
    fields.insert(dup.clone(), value);
    Ok(vec![dup])
}

fn field_injection(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    _kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    const NAMES: &[&str] = &["__proto__", "constructor", "$where", "_internal", "admin", "debug"];
    let mut key = NAMES
        .choose(ctx.rng)
        .copied()
        .unwrap_or("_internal")
        .to_string();
    let mut n = 0;
    while fields.contains_key(&key) {
        n += 1;
        key = format!("__chaos_injected_{n}");
    }
    let value = match ctx.rng.gen_range(0..4) {
        0 => Value::Bool(true),
        1 => Value::object([("polluted", Value::Bool(true))]),
        2 => Value::Opaque("function() {}".into()),
        _ => Value::Int(ctx.rng.gen()),
    };
    fields.insert(key.clone(), value);
    Ok(vec![key])
}

fn nested_mutation(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    _kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    if ctx.depth >= ctx.max_depth {
        return Err(MutationError::DepthExceeded { max: ctx.max_depth });
    }

    let Some(key) = pick_key(ctx.rng, fields, Value::is_container) else {
        // Flat record: wrap one field so there is a nested structure to break.
        let Some(key) = pick_key(ctx.rng, fields, any) else {
            return Ok(Vec::new());
        };
        if let Some(slot) = fields.get_mut(&key) {
            let inner = std::mem::take(slot);
            *slot = Value::object([("value", inner)]);
        }
        ctx.metadata.insert("wrapped".into(), Value::Bool(true));
        return Ok(vec![key]);
    };

    let Some(slot) = fields.get_mut(&key) else {
        return Ok(Vec::new());
    };
    ctx.depth += 1;
    ctx.metadata
        .insert("depth".into(), Value::Int(ctx.depth as i64));
    let inner_points = match slot {
        Value::Map(inner) => {
            let kind = MutationKind::ALL
                .choose(ctx.rng)
                .copied()
                .unwrap_or(MutationKind::NullInjection);
            let handler = ctx
                .handlers
                .get(&kind)
                .copied()
                .ok_or(MutationError::Unregistered(kind))?;
            ctx.metadata
                .insert("nested_kind".into(), Value::from(kind.as_str()));
            let mut points = handler(ctx, inner, kind)?;
            if points.is_empty() {
                inner.insert("__chaos_nested".into(), Value::Bool(true));
                points.push("__chaos_nested".into());
            }
            points
        }
        Value::List(items) if !items.is_empty() => {
            let i = ctx.rng.gen_range(0..items.len());
            match &mut items[i] {
                Value::Map(inner) => nested_mutation(ctx, inner, MutationKind::NestedMutation)?,
                item => {
                    *item = boundary_value(ctx.rng, item);
                    Vec::new()
                }
            }
            .into_iter()
            .map(|p| format!("{i}.{p}"))
            .chain(std::iter::once(i.to_string()))
            .collect()
        }
        other => {
            *other = Value::List(vec![Value::Null]);
            Vec::new()
        }
    };
    ctx.depth -= 1;

    let mut points: Vec<String> = inner_points
        .into_iter()
        .map(|p| format!("{key}.{p}"))
        .collect();
    if points.is_empty() {
        points.push(key);
    }
    Ok(points)
}

fn array_explosion(
    ctx: &mut MutationCtx<'_>,
    fields: &mut Fields,
    _kind: MutationKind,
) -> Result<Vec<String>, MutationError> {
    let key = pick_key(ctx.rng, fields, |v| matches!(v, Value::List(_)))
        .or_else(|| pick_key(ctx.rng, fields, any));
    let Some(key) = key else {
        return Ok(Vec::new());
    };
    if let Some(slot) = fields.get_mut(&key) {
        let seed = match &*slot {
            Value::List(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        *slot = Value::List(vec![seed; EXPLOSION_LEN]);
    }
    ctx.metadata
        .insert("exploded_len".into(), Value::Int(EXPLOSION_LEN as i64));
    Ok(vec![key])
}

fn collect_target_paths(value: &Value, targets: &[String], prefix: &str, out: &mut Vec<String>) {
    match value {
        Value::Map(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                if targets.iter().any(|t| *t == k.to_ascii_lowercase()) {
                    out.push(path.clone());
                }
                collect_target_paths(v, targets, &path, out);
            }
        }
        Value::List(items) => {
            for (i, v) in items.iter().enumerate() {
                let path = if prefix.is_empty() {
                    i.to_string()
                } else {
                    format!("{prefix}.{i}")
                };
                collect_target_paths(v, targets, &path, out);
            }
        }
        _ => {}
    }
}

fn value_at_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Map(map) => map.get_mut(segment),
        Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

fn ensure_changed(original: &Value, mutated: &mut Value, kind: MutationKind, points: &mut Vec<String>) {
    if mutated != original {
        return;
    }
    if let Some(fields) = mutated.as_map_mut() {
        let mut key = format!("__chaos_{kind}");
        while fields.contains_key(&key) {
            key.push('_');
        }
        fields.insert(key.clone(), Value::from(kind.as_str()));
        points.push(key);
    }
}

fn skipped(record: &Value, kind: MutationKind) -> MutationResult {
    let mut metadata = BTreeMap::new();
    metadata.insert("skipped".into(), Value::Bool(true));
    MutationResult {
        original: record.clone(),
        mutated: record.clone(),
        kind,
        mutation_points: Vec::new(),
        success: true,
        error: None,
        metadata,
    }
}

fn failed(record: &Value, kind: MutationKind, error: MutationError) -> MutationResult {
    MutationResult {
        original: record.clone(),
        mutated: record.clone(),
        kind,
        mutation_points: Vec::new(),
        success: false,
        error: Some(error.to_string()),
        metadata: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Value {
        Value::object([
            ("prompt", Value::from("summarize the incident")),
            ("token", Value::from("tok_abc123")),
            ("count", Value::Int(42)),
            ("ratio", Value::Float(0.25)),
            ("enabled", Value::Bool(true)),
            ("tags", Value::List(vec![Value::from("a"), Value::from("b")])),
            (
                "meta",
                Value::object([
                    ("api_key", Value::from("sk-test")),
                    ("depth", Value::Int(1)),
                ]),
            ),
        ])
    }

    #[test]
    fn every_kind_changes_the_record() {
        let mut engine = MutationEngine::new(7);
        let record = sample_record();
        for kind in MutationKind::ALL {
            for _ in 0..20 {
                let result = engine.mutate_with(&record, *kind);
                assert!(result.success, "{kind} failed: {:?}", result.error);
                assert_ne!(result.mutated, result.original, "{kind} was a no-op");
                assert_eq!(result.kind, *kind);
            }
        }
    }

    #[test]
    fn every_kind_changes_an_empty_record() {
        let mut engine = MutationEngine::new(11);
        let record = Value::Map(BTreeMap::new());
        for kind in MutationKind::ALL {
            let result = engine.mutate_with(&record, *kind);
            assert!(result.success);
            assert_ne!(result.mutated, record, "{kind} left empty record unchanged");
        }
    }

    #[test]
    fn rate_zero_always_skips() {
        let mut engine = MutationEngine::new(1);
        let record = sample_record();
        for _ in 0..50 {
            let result = engine.mutate(&record, &[], 0.0);
            assert!(result.success);
            assert!(result.skipped());
            assert_eq!(result.mutated, record);
        }
    }

    #[test]
    fn skip_keeps_nan_record_unchanged() {
        let mut engine = MutationEngine::new(1);
        let record = Value::object([("ratio", Value::Float(f64::NAN)), ("n", Value::Int(1))]);
        let result = engine.mutate(&record, &[], 0.0);
        assert!(result.skipped());
        assert!(!result.changed());
    }

    #[test]
    fn rate_one_never_skips() {
        let mut engine = MutationEngine::new(2);
        let record = sample_record();
        for _ in 0..50 {
            let result = engine.mutate(&record, &[], 1.0);
            assert!(!result.skipped());
            assert!(result.changed());
        }
    }

    #[test]
    fn allowed_kinds_are_respected() {
        let mut engine = MutationEngine::new(3);
        let record = sample_record();
        let allowed = [MutationKind::NullInjection, MutationKind::FieldDeletion];
        for _ in 0..50 {
            let result = engine.mutate(&record, &allowed, 1.0);
            assert!(allowed.contains(&result.kind));
        }
    }

    #[test]
    fn non_map_record_fails_without_panicking() {
        let mut engine = MutationEngine::new(4);
        let record = Value::Int(5);
        let result = engine.mutate_with(&record, MutationKind::FieldDeletion);
        assert!(!result.success);
        assert_eq!(result.mutated, record);
        assert!(result.error.unwrap().contains("must be a map"));
    }

    #[test]
    fn invalid_rate_is_reported() {
        let mut engine = MutationEngine::new(5);
        let result = engine.mutate(&sample_record(), &[], 1.5);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("outside [0, 1]"));
    }

    #[test]
    fn array_explosion_repeats_first_item() {
        let mut engine = MutationEngine::new(12);
        let record = Value::object([
            ("tags", Value::List(vec![Value::from("a"), Value::from("b")])),
            ("count", Value::Int(1)),
        ]);
        let result = engine.mutate_with(&record, MutationKind::ArrayExplosion);
        assert!(result.success);
        assert_eq!(result.mutation_points, vec!["tags".to_string()]);
        match result.mutated.get("tags") {
            Some(Value::List(items)) => {
                assert_eq!(items.len(), EXPLOSION_LEN);
                assert!(items.iter().all(|v| *v == Value::from("a")));
            }
            other => panic!("tags not exploded: {other:?}"),
        }
        assert_eq!(result.mutated.get("count"), Some(&Value::Int(1)));
    }

    #[test]
    fn nested_mutation_respects_max_depth() {
        let mut engine = MutationEngine::new(6).with_max_depth(0);
        let result = engine.mutate_with(&sample_record(), MutationKind::NestedMutation);
        assert!(!result.success);
        assert_eq!(result.mutated, result.original);
    }

    #[test]
    fn nested_mutation_reports_nested_path() {
        let mut engine = MutationEngine::new(8);
        let record = Value::object([
            ("flat", Value::Int(1)),
            ("inner", Value::object([("x", Value::Int(1)), ("y", Value::from("s"))])),
        ]);
        let result = engine.mutate_with(&record, MutationKind::NestedMutation);
        assert!(result.success);
        assert!(result.mutation_points.iter().all(|p| p.starts_with("inner")));
    }

    #[test]
    fn security_kinds_record_payload() {
        let mut engine = MutationEngine::new(9);
        let result = engine.mutate_with(&sample_record(), MutationKind::SqlInjection);
        let payload = result.metadata.get("payload").and_then(Value::as_str).unwrap();
        assert!(crate::payloads::SQL_INJECTION.contains(&payload));
    }

    #[test]
    fn targeted_only_touches_named_fields() {
        let mut engine = MutationEngine::new(10);
        let record = sample_record();
        for _ in 0..30 {
            let result = engine.mutate_targeted(&record, &["prompt", "API_KEY"], &[], 0.2);
            assert!(result.changed());
            for point in &result.mutation_points {
                assert!(point == "prompt" || point == "meta.api_key", "touched {point}");
            }
            assert_eq!(result.mutated.get("count"), record.get("count"));
        }
    }

    #[test]
    fn targeted_without_matches_is_a_skip() {
        let mut engine = MutationEngine::new(12);
        let result = engine.mutate_targeted(&sample_record(), &["password"], &[], 1.0);
        assert!(result.success);
        assert!(result.skipped());
        assert_eq!(
            result.metadata.get("no_target_fields"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn same_seed_same_mutations() {
        let record = sample_record();
        let mut a = MutationEngine::new(99);
        let mut b = MutationEngine::new(99);
        for _ in 0..20 {
            let ra = a.mutate(&record, &[MutationKind::FieldDeletion, MutationKind::TypeChange], 0.7);
            let rb = b.mutate(&record, &[MutationKind::FieldDeletion, MutationKind::TypeChange], 0.7);
            assert_eq!(ra.kind, rb.kind);
            assert_eq!(ra.mutation_points, rb.mutation_points);
        }
    }

    #[test]
    fn batch_returns_one_result_per_record() {
        let mut engine = MutationEngine::new(13);
        let records = vec![sample_record(), sample_record(), Value::Null];
        let results = engine.mutate_batch(&records, &[], 1.0);
        assert_eq!(results.len(), 3);
        assert!(!results[2].success);
    }
}
