//! Protocol and syntax corruption.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{insert_at, GorkCtx, GorkError, Gorked};

pub(super) fn malformed_protobuf(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut bytes = Vec::with_capacity(data.len() + 16);
    let description = match ctx.rng.gen_range(0..3) {
        0 => {
            // Field 1, length-delimited, claiming ~4 GiB of payload.
            bytes.extend_from_slice(&[0x0A, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
            bytes.extend_from_slice(data);
            "length prefix far larger than the message"
        }
        1 => {
            // Wire type 7 does not exist.
            bytes.push(0x0F);
            bytes.extend_from_slice(data);
            "field tag with reserved wire type 7"
        }
        _ => {
            // Varint of 11 bytes: every continuation bit set past the 64-bit limit.
            bytes.push(0x08);
            bytes.extend_from_slice(&[0xFF; 10]);
            bytes.push(0x01);
            bytes.extend_from_slice(data);
            "varint longer than ten bytes"
        }
    };
    ctx.note("framing", "protobuf");
    Ok(Gorked::new(bytes, vec![0], description))
}

pub(super) fn invalid_json(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    match ctx.rng.gen_range(0..3) {
        0 => {
            // Any prefix followed by a comma is invalid: a complete value gets a
            // trailing comma, an incomplete one stays incomplete.
            let cut = if data.is_empty() {
                0
            } else {
                ctx.rng.gen_range(0..data.len())
            };
            let mut bytes = data[..cut].to_vec();
            bytes.push(b',');
            Ok(Gorked::new(
                bytes,
                vec![cut],
                format!("document truncated at byte {cut} with a dangling comma"),
            ))
        }
        1 => {
            let mut bytes = b"{'unquoted': ".to_vec();
            bytes.extend_from_slice(data);
            Ok(Gorked::new(bytes, vec![0], "single-quoted key opening the document"))
        }
        _ => {
            const BREAKERS: &[&[u8]] = &[b",}", b"]]", b"\"unterminated", b"NaN,", b"01"];
            let breaker = *BREAKERS.choose(ctx.rng).unwrap_or(&BREAKERS[0]);
            let mut bytes = b"[".to_vec();
            bytes.extend_from_slice(data);
            let at = bytes.len();
            bytes.extend_from_slice(breaker);
            Ok(Gorked::new(
                bytes,
                vec![0, at],
                format!("unbalanced array closed with {:?}", String::from_utf8_lossy(breaker)),
            ))
        }
    }
}

pub(super) fn invalid_xml(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let escaped: Vec<u8> = String::from_utf8_lossy(data)
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .into_bytes();
    let (prefix, suffix, description) = match ctx.rng.gen_range(0..4) {
        0 => ("<root><span>", "</root></span>", "mismatched closing tags"),
        1 => ("<root attr=\"unterminated>", "</root>", "unterminated attribute value"),
        2 => ("<root>&undefined;", "<![CDATA[", "undefined entity and open CDATA"),
        _ => (
            "<?xml version=\"1.0\"?><!DOCTYPE lolz [<!ENTITY lol \"lol\"><!ENTITY lol2 \"&lol;&lol;&lol;&lol;\">]><root>&lol2;",
            "",
            "recursive entity expansion with no closing tag",
        ),
    };
    let mut bytes = prefix.as_bytes().to_vec();
    bytes.extend_from_slice(&escaped);
    let tail = bytes.len();
    bytes.extend_from_slice(suffix.as_bytes());
    Ok(Gorked::new(bytes, vec![0, tail], description))
}

pub(super) fn header_injection(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const INJECTIONS: &[&[u8]] = &[
        b"\r\nX-Injected: true\r\n",
        b"\r\nSet-Cookie: session=attacker\r\n\r\n",
        b"\r\nContent-Length: 0\r\n\r\nHTTP/1.1 200 OK\r\n",
        b"\nTransfer-Encoding: chunked\n",
    ];
    let positions = ctx.positions(data.len() + 1, ctx.hits(data.len()).min(4));
    let picks: Vec<&[u8]> = positions
        .iter()
        .map(|_| *INJECTIONS.choose(ctx.rng).unwrap_or(&INJECTIONS[0]))
        .collect();
    let (bytes, points) = insert_at(data, &positions, |i| picks[i].to_vec());
    Ok(Gorked::new(bytes, points, "CRLF sequences forging extra headers"))
}
