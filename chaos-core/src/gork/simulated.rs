//! Network, filesystem and memory corruption expressed as data patterns.
//!
//! Nothing here touches sockets, disks or process memory; the payloads only
//! look like what those faults leave behind.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{insert_at, GorkCtx, GorkError, Gorked};
use chaos_types::Value;

const FRAGMENT_HEADER_LEN: usize = 4;
const TCP_HEADER_LEN: usize = 20;

pub(super) fn packet_fragmentation(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let payload: &[u8] = if data.is_empty() { b"\x00" } else { data };
    let count = ctx.rng.gen_range(2..=8usize).min(payload.len().max(2));
    let size = payload.len().div_ceil(count).max(1);

    // [seq: u16 BE][len: u16 BE][bytes]
    let mut fragments: Vec<(u16, &[u8])> = payload
        .chunks(size)
        .enumerate()
        .map(|(seq, chunk)| (seq as u16, chunk))
        .collect();
    fragments.shuffle(ctx.rng);
    if let Some(dup) = fragments.first().copied() {
        fragments.push(dup);
    }
    // Drop one fragment so reassembly cannot complete.
    let dropped = if fragments.len() > 2 {
        let i = ctx.rng.gen_range(0..fragments.len());
        Some(fragments.remove(i).0)
    } else {
        None
    };

    let mut bytes = Vec::with_capacity(payload.len() + fragments.len() * FRAGMENT_HEADER_LEN);
    let mut points = Vec::with_capacity(fragments.len());
    for (seq, chunk) in &fragments {
        points.push(bytes.len());
        bytes.extend_from_slice(&seq.to_be_bytes());
        // Length field lies about the chunk size.
        let claimed = (chunk.len() as u16).wrapping_add(ctx.rng.gen_range(0..3));
        bytes.extend_from_slice(&claimed.to_be_bytes());
        bytes.extend_from_slice(chunk);
    }
    ctx.note("fragments", Value::Int(fragments.len() as i64));
    if let Some(seq) = dropped {
        ctx.note("dropped_fragment", Value::Int(seq as i64));
    }
    Ok(Gorked::new(
        bytes,
        points,
        "payload split into out-of-order, duplicated fragments with one missing",
    ))
}

pub(super) fn tcp_segment_corruption(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut header = [0u8; TCP_HEADER_LEN];
    header[0..2].copy_from_slice(&ctx.rng.gen::<u16>().to_be_bytes());
    header[2..4].copy_from_slice(&4317u16.to_be_bytes());
    header[4..8].copy_from_slice(&ctx.rng.gen::<u32>().to_be_bytes());
    // Data offset below the 5-word minimum, every flag set.
    header[12] = 0x20;
    header[13] = 0xFF;
    header[16..18].copy_from_slice(&0xDEADu16.to_be_bytes());

    let mut bytes = header.to_vec();
    bytes.extend_from_slice(data);
    let mut points = vec![12];
    if !data.is_empty() {
        let i = TCP_HEADER_LEN + ctx.rng.gen_range(0..data.len());
        bytes[i] ^= ctx.rng.gen_range(1..=255u8);
        points.push(i);
    }
    Ok(Gorked::new(
        bytes,
        points,
        "TCP segment with an impossible data offset and bad checksum",
    ))
}

pub(super) fn inode_corruption(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let mut block = Vec::with_capacity(32 + data.len());
    // ext-style superblock magic, then an inode with zero links and a size
    // that disagrees with the data that follows.
    block.extend_from_slice(&0xEF53u16.to_le_bytes());
    block.extend_from_slice(&0u16.to_le_bytes());
    block.extend_from_slice(&(data.len() as u64 + ctx.rng.gen_range(1..u32::MAX as u64)).to_le_bytes());
    block.extend_from_slice(&ctx.rng.gen::<u32>().to_le_bytes());
    block.extend_from_slice(&[0xFF; 4]);
    let data_at = block.len();
    block.extend_from_slice(data);
    Ok(Gorked::new(
        block,
        vec![2, 4, data_at],
        "inode with zero links and a size that does not match its blocks",
    ))
}

pub(super) fn path_traversal(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const PATHS: &[&str] = &[
        "../../../../etc/passwd",
        "..%2f..%2f..%2fetc%2fshadow",
        "..\\..\\..\\windows\\win.ini",
        "/var/log/../../root/.ssh/id_rsa\0.png",
        "....//....//etc/hosts",
    ];
    let path = PATHS.choose(ctx.rng).copied().unwrap_or(PATHS[0]);
    let mut bytes = path.as_bytes().to_vec();
    bytes.push(b'/');
    bytes.extend_from_slice(data);
    Ok(Gorked::new(
        bytes,
        vec![0],
        format!("path escaping its root: {path:?}"),
    ))
}

pub(super) fn heap_overflow_pattern(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let fill = ctx.rng.gen_range(256..1024usize);
    let mut bytes = data.to_vec();
    let at = bytes.len();
    bytes.extend(std::iter::repeat(b'A').take(fill));
    let marker_at = bytes.len();
    for _ in 0..4 {
        bytes.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
    }
    ctx.note("overflow_bytes", Value::Int(fill as i64));
    Ok(Gorked::new(
        bytes,
        vec![at, marker_at],
        format!("{fill} filler bytes followed by 0xDEADBEEF markers"),
    ))
}

pub(super) fn stack_smash_pattern(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    let len = ctx.rng.gen_range(128..512usize);
    let mut bytes = data.to_vec();
    let at = bytes.len();
    bytes.extend(cyclic_pattern(len));
    let ret_at = bytes.len();
    // Overwritten canary, then a return address into the filler.
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&0x4141_4141_4141_4141u64.to_le_bytes());
    Ok(Gorked::new(
        bytes,
        vec![at, ret_at],
        format!("{len}-byte cyclic pattern with a clobbered canary and return address"),
    ))
}

pub(super) fn use_after_free_pattern(ctx: &mut GorkCtx<'_>, data: &[u8]) -> Result<Gorked, GorkError> {
    const FREED: &[&[u8]] = &[
        &[0xDD, 0xDD, 0xDD, 0xDD],
        &[0xFE, 0xEE, 0xFE, 0xEE],
        &[0xDE, 0xAD, 0xBE, 0xEF],
        &[0xAB, 0xAB, 0xAB, 0xAB],
    ];
    let positions = ctx.positions(data.len() + 1, ctx.hits(data.len()).min(16));
    let picks: Vec<&[u8]> = positions
        .iter()
        .map(|_| *FREED.choose(ctx.rng).unwrap_or(&FREED[0]))
        .collect();
    let (bytes, points) = insert_at(data, &positions, |i| picks[i].repeat(2));
    Ok(Gorked::new(
        bytes,
        points,
        "freed-memory fill patterns spliced into live data",
    ))
}

/// `Aa0Aa1...` pattern where every 4-byte window is unique.
fn cyclic_pattern(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 3);
    'outer: for upper in b'A'..=b'Z' {
        for lower in b'a'..=b'z' {
            for digit in b'0'..=b'9' {
                if out.len() >= len {
                    break 'outer;
                }
                out.extend_from_slice(&[upper, lower, digit]);
            }
        }
    }
    out.truncate(len);
    out
}
