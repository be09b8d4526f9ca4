//! Binary and text-encoding corruption.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{char_boundaries, insert_at, GorkCtx, GorkError, Gorked};
use crate::payloads::INVALID_UTF8;

pub(super) fn random_bytes(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    if data.is_empty() {
        let len = ctx.rng.gen_range(8..64);
        let bytes: Vec<u8> = (0..len).map(|_| ctx.rng.gen()).collect();
        return Ok(Gorked::new(bytes, vec![0], "random bytes in place of an empty payload"));
    }
    let mut bytes = data.to_vec();
    let points = ctx.positions(bytes.len(), ctx.hits(bytes.len()));
    for &i in &points {
        bytes[i] ^= ctx.rng.gen_range(1..=255u8);
    }
    Ok(Gorked::new(
        bytes,
        points.clone(),
        format!("{} bytes overwritten with random values", points.len()),
    ))
}

pub(super) fn null_byte_injection(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let positions = ctx.positions(data.len() + 1, ctx.hits(data.len()));
    let (bytes, points) = insert_at(data, &positions, |_| vec![0x00]);
    Ok(Gorked::new(
        bytes,
        points,
        format!("{} NUL bytes injected", positions.len()),
    ))
}

pub(super) fn high_bit_set(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let low: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, b)| **b < 0x80)
        .map(|(i, _)| i)
        .collect();
    if low.is_empty() {
        let mut bytes = data.to_vec();
        bytes.extend_from_slice(&[0x80, 0xFF]);
        return Ok(Gorked::new(bytes, vec![data.len()], "high-bit bytes appended"));
    }
    let take = ctx.hits(low.len()).min(low.len());
    let mut points: Vec<usize> = low.choose_multiple(ctx.rng, take).copied().collect();
    points.sort_unstable();
    let mut bytes = data.to_vec();
    for &i in &points {
        bytes[i] |= 0x80;
    }
    Ok(Gorked::new(
        bytes,
        points.clone(),
        format!("high bit set on {} ASCII bytes", points.len()),
    ))
}

pub(super) fn binary_in_text(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const CHUNKS: &[&[u8]] = &[
        &[0x00, 0x01, 0x02, 0x03],
        &[0x1B, 0x5B, 0x32, 0x4A, 0x7F],
        &[0xFE, 0xFF, 0x00, 0x00],
        &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
    ];
    let positions = ctx.positions(data.len() + 1, ctx.hits(data.len()).min(8));
    let chunks: Vec<&[u8]> = positions
        .iter()
        .map(|_| *CHUNKS.choose(ctx.rng).unwrap_or(&CHUNKS[0]))
        .collect();
    let (bytes, points) = insert_at(data, &positions, |i| chunks[i].to_vec());
    Ok(Gorked::new(
        bytes,
        points,
        "binary chunks spliced into text",
    ))
}

pub(super) fn invalid_utf8(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let positions = utf8_positions(ctx, data);
    let seqs: Vec<&[u8]> = positions
        .iter()
        .map(|_| *INVALID_UTF8.choose(ctx.rng).unwrap_or(&INVALID_UTF8[0]))
        .collect();
    let (bytes, points) = insert_at(data, &positions, |i| seqs[i].to_vec());
    Ok(Gorked::new(
        bytes,
        points,
        "invalid UTF-8 sequences inserted",
    ))
}

pub(super) fn overlong_utf8(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let ascii: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_ascii())
        .map(|(i, _)| i)
        .collect();
    if ascii.is_empty() {
        // Overlong "/" (the classic path-traversal spelling).
        let mut bytes = vec![0xC0, 0xAF];
        bytes.extend_from_slice(data);
        return Ok(Gorked::new(bytes, vec![0], "overlong '/' prepended"));
    }
    let take = ctx.hits(ascii.len()).min(ascii.len());
    let mut chosen: Vec<usize> = ascii.choose_multiple(ctx.rng, take).copied().collect();
    chosen.sort_unstable();

    let mut bytes = Vec::with_capacity(data.len() + chosen.len());
    let mut points = Vec::with_capacity(chosen.len());
    let mut next = chosen.iter().peekable();
    for (i, &b) in data.iter().enumerate() {
        if next.peek() == Some(&&i) {
            next.next();
            points.push(bytes.len());
            bytes.push(0xC0 | (b >> 6));
            bytes.push(0x80 | (b & 0x3F));
        } else {
            bytes.push(b);
        }
    }
    Ok(Gorked::new(
        bytes,
        points,
        format!("{} ASCII characters re-encoded as overlong UTF-8", chosen.len()),
    ))
}

pub(super) fn mixed_encoding(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const FRAGMENTS: &[&[u8]] = &[
        // Latin-1 "café"
        b"caf\xE9",
        // UTF-16LE "hi"
        b"h\x00i\x00",
        // Windows-1252 smart quotes
        b"\x93quoted\x94",
    ];
    let positions = utf8_positions(ctx, data);
    let frags: Vec<&[u8]> = positions
        .iter()
        .map(|_| *FRAGMENTS.choose(ctx.rng).unwrap_or(&FRAGMENTS[0]))
        .collect();
    let (bytes, points) = insert_at(data, &positions, |i| frags[i].to_vec());
    Ok(Gorked::new(
        bytes,
        points,
        "Latin-1, UTF-16 and Windows-1252 fragments mixed into UTF-8",
    ))
}

pub(super) fn unpaired_surrogate(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    // CESU-8 encodings of lone surrogates U+D800 and U+DFFF.
    const SURROGATES: &[&[u8]] = &[&[0xED, 0xA0, 0x80], &[0xED, 0xBF, 0xBF]];
    let positions = utf8_positions(ctx, data);
    let seqs: Vec<&[u8]> = positions
        .iter()
        .map(|_| *SURROGATES.choose(ctx.rng).unwrap_or(&SURROGATES[0]))
        .collect();
    let (mut bytes, mut points) = insert_at(data, &positions, |i| seqs[i].to_vec());
    if ctx.rng.gen_bool(0.5) {
        points.push(bytes.len());
        bytes.extend_from_slice(br#""\ud800""#);
    }
    Ok(Gorked::new(
        bytes,
        points,
        "unpaired UTF-16 surrogates encoded into the payload",
    ))
}

pub(super) fn bom_misuse(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
    const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
    if ctx.rng.gen_bool(0.5) {
        // UTF-16 BOM declaring an encoding the payload does not use.
        let mut bytes = UTF16LE_BOM.to_vec();
        bytes.extend_from_slice(data);
        Ok(Gorked::new(bytes, vec![0], "UTF-16LE BOM on a UTF-8 payload"))
    } else {
        let positions = utf8_positions(ctx, data);
        let (bytes, points) = insert_at(data, &positions, |_| UTF8_BOM.to_vec());
        Ok(Gorked::new(
            bytes,
            points,
            "byte-order marks inside the payload",
        ))
    }
}

/// Insertion positions that respect char boundaries when `data` is UTF-8.
fn utf8_positions(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Vec<usize> {
    match std::str::from_utf8(data) {
        Ok(s) => {
            let boundaries = char_boundaries(s);
            let take = ctx.hits(s.len()).min(boundaries.len());
            let mut picked: Vec<usize> = boundaries.choose_multiple(ctx.rng, take).copied().collect();
            picked.sort_unstable();
            picked
        }
        Err(_) => ctx.positions(data.len() + 1, ctx.hits(data.len())),
    }
}
