//! Format, Unicode and time corruption.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{char_boundaries, insert_at, GorkCtx, GorkError, Gorked};

// =========================================================================
// Encodings
// =========================================================================

pub(super) fn invalid_base64(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let encoded = STANDARD.encode(data).into_bytes();
    const BAD: &[&[u8]] = &[b"*", b"!", b"=", b"\xC3\xA9", b"-_"];
    let positions = ctx.positions(encoded.len().max(1), ctx.hits(encoded.len()).min(8));
    let picks: Vec<&[u8]> = positions
        .iter()
        .map(|_| *BAD.choose(ctx.rng).unwrap_or(&BAD[0]))
        .collect();
    let (mut bytes, points) = insert_at(&encoded, &positions, |i| picks[i].to_vec());
    // A stray '=' alone can still decode in lenient engines; an odd length cannot.
    if bytes.len() % 4 == 0 {
        bytes.push(b'A');
    }
    Ok(Gorked::new(
        bytes,
        points,
        "base64 with characters outside the alphabet and broken padding",
    ))
}

pub(super) fn invalid_hex(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut bytes = hex::encode(data).into_bytes();
    let mut points = Vec::new();
    if !bytes.is_empty() {
        let hits = ctx.hits(bytes.len()).min(8);
        for i in ctx.positions(bytes.len(), hits) {
            bytes[i] = *b"ghijklmnopqrstuvwxyz".choose(ctx.rng).unwrap_or(&b'g');
            points.push(i);
        }
    }
    if bytes.len() % 2 == 0 {
        points.push(bytes.len());
        bytes.push(b'f');
    }
    Ok(Gorked::new(
        bytes,
        points,
        "hex with non-hex digits and an odd length",
    ))
}

pub(super) fn invalid_url_encoding(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut encoded = String::with_capacity(data.len() * 3);
    for &b in data {
        if b.is_ascii_alphanumeric() || b"-_.~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    const BAD: &[&str] = &["%G1", "%", "%zz", "%E9", "%C0%AF", "%%"];
    let bytes = encoded.into_bytes();
    let positions = ctx.positions(bytes.len() + 1, ctx.hits(bytes.len()).min(8));
    let picks: Vec<&str> = positions
        .iter()
        .map(|_| BAD.choose(ctx.rng).copied().unwrap_or("%"))
        .collect();
    let (bytes, points) = insert_at(&bytes, &positions, |i| picks[i].as_bytes().to_vec());
    Ok(Gorked::new(
        bytes,
        points,
        "percent-encoding with truncated escapes and non-hex digits",
    ))
}

// =========================================================================
// Unicode hazards
// =========================================================================

/// Insert strings at char boundaries when `data` is text, otherwise at byte
/// positions.
fn insert_text(
    ctx: &mut GorkCtx<'_>,
    data: &[u8],
    max: usize,
    mut pick: impl FnMut(&mut GorkCtx<'_>) -> String,
) -> (Vec<u8>, Vec<usize>) {
    let positions = match std::str::from_utf8(data) {
        Ok(s) => {
            let boundaries = char_boundaries(s);
            let take = ctx.hits(s.chars().count()).min(max).min(boundaries.len());
            let mut picked: Vec<usize> = boundaries.choose_multiple(ctx.rng, take).copied().collect();
            picked.sort_unstable();
            picked
        }
        Err(_) => ctx.positions(data.len() + 1, ctx.hits(data.len()).min(max)),
    };
    let inserts: Vec<String> = positions.iter().map(|_| pick(ctx)).collect();
    insert_at(data, &positions, |i| inserts[i].as_bytes().to_vec())
}

pub(super) fn direction_override(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const CONTROLS: &[char] = &['\u{202E}', '\u{202D}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{061C}'];
    let (bytes, points) = insert_text(ctx, data, 8, |ctx| {
        CONTROLS.choose(ctx.rng).copied().unwrap_or('\u{202E}').to_string()
    });
    Ok(Gorked::new(
        bytes,
        points,
        "bidirectional override characters",
    ))
}

pub(super) fn zero_width_injection(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];
    let (bytes, points) = insert_text(ctx, data, 32, |ctx| {
        ZERO_WIDTH.choose(ctx.rng).copied().unwrap_or('\u{200B}').to_string()
    });
    Ok(Gorked::new(bytes, points, "zero-width characters between visible ones"))
}

pub(super) fn zalgo_text(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let (bytes, points) = insert_text(ctx, data, 64, |ctx| {
        let marks = ctx.rng.gen_range(3..=12);
        (0..marks)
            .filter_map(|_| char::from_u32(ctx.rng.gen_range(0x0300..=0x036F)))
            .collect()
    });
    ctx.note("combining_runs", points.len() as i64);
    Ok(Gorked::new(bytes, points, "stacked combining diacritics"))
}

pub(super) fn homoglyph_substitution(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    fn homoglyph(c: char) -> Option<char> {
        Some(match c {
            'a' => '\u{0430}',
            'c' => '\u{0441}',
            'e' => '\u{0435}',
            'i' => '\u{0456}',
            'o' => '\u{043E}',
            'p' => '\u{0440}',
            'x' => '\u{0445}',
            'y' => '\u{0443}',
            'A' => '\u{0391}',
            'B' => '\u{0392}',
            'E' => '\u{0395}',
            'O' => '\u{039F}',
            _ => return None,
        })
    }

    let text = String::from_utf8_lossy(data).into_owned();
    let candidates: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| homoglyph(*c).is_some())
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        let mut bytes = data.to_vec();
        let at = bytes.len();
        bytes.extend_from_slice("\u{0440}\u{0430}y\u{0440}\u{0430}l".as_bytes());
        return Ok(Gorked::new(bytes, vec![at], "look-alike Cyrillic word appended"));
    }
    let take = ctx.hits(candidates.len()).min(candidates.len());
    let mut chosen: Vec<usize> = candidates.choose_multiple(ctx.rng, take).copied().collect();
    chosen.sort_unstable();

    let mut out = String::with_capacity(text.len() + chosen.len());
    let mut points = Vec::with_capacity(chosen.len());
    for (i, c) in text.char_indices() {
        match chosen.binary_search(&i).ok().and_then(|_| homoglyph(c)) {
            Some(glyph) => {
                points.push(out.len());
                out.push(glyph);
            }
            None => out.push(c),
        }
    }
    Ok(Gorked::new(
        out.into_bytes(),
        points,
        format!("{} Latin letters replaced by look-alikes", chosen.len()),
    ))
}

// =========================================================================
// Time
// =========================================================================

fn splice_field(ctx: &mut GorkCtx<'_>, data: &[u8], values: &[&str]) -> (Vec<u8>, Vec<usize>, String) {
    let value = values.choose(ctx.rng).copied().unwrap_or(values[0]);
    let field = format!("{{\"timestamp\":{value}}}");
    let at = if data.is_empty() { 0 } else { ctx.rng.gen_range(0..=data.len()) };
    let (bytes, points) = insert_at(data, &[at], |_| field.as_bytes().to_vec());
    (bytes, points, value.to_string())
}

pub(super) fn epoch_overflow(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const VALUES: &[&str] = &[
        "18446744073709551616",
        "9223372036854775808",
        "-9223372036854775809",
        "2147483648",
        "\"2038-01-19T03:14:08Z\"",
        "\"10000-01-01T00:00:00Z\"",
        "1e400",
    ];
    let (bytes, points, value) = splice_field(ctx, data, VALUES);
    Ok(Gorked::new(bytes, points, format!("timestamp {value} past the representable range")))
}

pub(super) fn invalid_timezone(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const VALUES: &[&str] = &[
        "\"2024-01-01T00:00:00+25:00\"",
        "\"2024-01-01T00:00:00+14:61\"",
        "\"2024-01-01T00:00:00-99:99\"",
        "\"2024-01-01T00:00:00Z+01:00\"",
        "\"2024-01-01T00:00:00 Mars/Olympus\"",
    ];
    let (bytes, points, value) = splice_field(ctx, data, VALUES);
    Ok(Gorked::new(bytes, points, format!("timestamp {value} with an impossible offset")))
}

pub(super) fn leap_second(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const VALUES: &[&str] = &[
        "\"2016-12-31T23:59:60Z\"",
        "\"2024-06-30T23:59:61Z\"",
        "\"2023-02-29T00:00:00Z\"",
        "\"2024-01-01T24:00:01Z\"",
    ];
    let (bytes, points, value) = splice_field(ctx, data, VALUES);
    Ok(Gorked::new(bytes, points, format!("timestamp {value} on a second that does not exist")))
}
