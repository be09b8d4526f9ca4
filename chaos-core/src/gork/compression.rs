//! Corrupted compression streams and decompression bombs.

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use rand::Rng;
use std::io::{self, Read, Write};

use super::{GorkCtx, GorkError, Gorked};
use chaos_types::Value;

const GZIP_HEADER_LEN: usize = 10;
const GZIP_TRAILER_LEN: usize = 8;
const ZLIB_TRAILER_LEN: usize = 4;

fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn zlib(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub(super) fn corrupted_gzip(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut stream = gzip(data)?;
    let len = stream.len();
    ctx.note("compressed_bytes", Value::Int(len as i64));

    let gorked = match ctx.rng.gen_range(0..3) {
        0 => {
            // Magic byte 0x1f -> anything else.
            stream[0] ^= ctx.rng.gen_range(1..=255u8);
            Gorked::new(stream, vec![0], "gzip magic bytes corrupted")
        }
        1 => {
            let crc_at = len - GZIP_TRAILER_LEN + ctx.rng.gen_range(0..4);
            stream[crc_at] ^= ctx.rng.gen_range(1..=255u8);
            Gorked::new(stream, vec![crc_at], "gzip CRC32 trailer does not match the payload")
        }
        _ => {
            let cut = ctx.rng.gen_range(1..=GZIP_TRAILER_LEN);
            stream.truncate(len - cut);
            let at = stream.len();
            Gorked::new(
                stream,
                vec![at],
                format!("gzip stream truncated by {cut} bytes"),
            )
        }
    };
    ctx.note("header_len", Value::Int(GZIP_HEADER_LEN as i64));
    Ok(gorked)
}

pub(super) fn corrupted_deflate(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut stream = zlib(data)?;
    let len = stream.len();
    ctx.note("compressed_bytes", Value::Int(len as i64));

    let gorked = match ctx.rng.gen_range(0..2) {
        0 => {
            // CMF 0x78 -> 0x79: compression method 9 does not exist.
            stream[0] = 0x79;
            Gorked::new(stream, vec![0], "zlib header names an unknown compression method")
        }
        _ => {
            let at = len - ZLIB_TRAILER_LEN + ctx.rng.gen_range(0..ZLIB_TRAILER_LEN);
            stream[at] ^= ctx.rng.gen_range(1..=255u8);
            Gorked::new(stream, vec![at], "adler32 trailer does not match the payload")
        }
    };
    Ok(gorked)
}

pub(super) fn compression_bomb(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let expanded = ctx.bomb_bytes + data.len();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    io::copy(&mut io::repeat(0).take(ctx.bomb_bytes as u64), &mut encoder)?;
    encoder.write_all(data)?;
    let bomb = encoder.finish()?;

    let ratio = expanded as f64 / bomb.len().max(1) as f64;
    ctx.note("expanded_bytes", Value::Int(expanded as i64));
    ctx.note("compressed_bytes", Value::Int(bomb.len() as i64));
    ctx.note("ratio", Value::Float(ratio));
    tracing::trace!(expanded, compressed = bomb.len(), "built compression bomb");

    Ok(Gorked::new(
        bomb,
        vec![0],
        format!("{expanded} bytes compressed to a fraction of that ({ratio:.0}:1)"),
    ))
}
