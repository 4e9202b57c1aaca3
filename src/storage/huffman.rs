//! Canonical Huffman codec for the persisted-configuration payload.
//!
//! The compressed form is self-contained: a 4-byte little-endian raw
//! length, a 256-byte table of canonical code lengths, then the MSB-first
//! bitstream. Canonical codes are reassigned identically on both sides from
//! the lengths alone, so the table is all the decoder needs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::StorageError;

const TABLE_LEN: usize = 256;
const HEADER_LEN: usize = 4 + TABLE_LEN;

pub fn compress(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + raw.len() / 2);
    out.extend_from_slice(&(raw.len() as u32).to_le_bytes());

    let lengths = code_lengths(raw);
    out.extend_from_slice(&lengths);
    if raw.is_empty() {
        return out;
    }

    let codes = canonical_codes(&lengths);
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;
    for &byte in raw {
        let (code, len) = codes[byte as usize];
        acc = (acc << len) | code as u64;
        bits += len as u32;
        while bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    if data.len() < HEADER_LEN {
        return Err(StorageError::Corrupt("compressed stream shorter than its header".into()));
    }
    let raw_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if raw_len == 0 {
        return Ok(Vec::new());
    }
    let mut lengths = [0u8; TABLE_LEN];
    lengths.copy_from_slice(&data[4..HEADER_LEN]);
    let codes = canonical_codes(&lengths);

    // Symbols sorted the canonical way, with the first code of each length.
    let mut by_len: Vec<(u8, u32, u8)> = Vec::new();
    let mut ordered: Vec<(u8, u8)> = lengths
        .iter()
        .enumerate()
        .filter(|(_, &len)| len > 0)
        .map(|(sym, &len)| (len, sym as u8))
        .collect();
    ordered.sort_unstable();
    for &(len, sym) in &ordered {
        let (code, _) = codes[sym as usize];
        by_len.push((len, code, sym));
    }
    if by_len.is_empty() {
        return Err(StorageError::Corrupt("no symbols in code table".into()));
    }

    let mut out = Vec::with_capacity(raw_len);
    let mut code: u32 = 0;
    let mut len: u8 = 0;
    'bytes: for &byte in &data[HEADER_LEN..] {
        for bit in (0..8).rev() {
            code = (code << 1) | ((byte >> bit) & 1) as u32;
            len += 1;
            // Canonical codes sort by (length, code), so lookup is a search.
            if let Ok(at) = by_len.binary_search_by(|&(l, c, _)| (l, c).cmp(&(len, code))) {
                out.push(by_len[at].2);
                code = 0;
                len = 0;
                if out.len() == raw_len {
                    break 'bytes;
                }
            } else if len >= 32 {
                return Err(StorageError::Corrupt("unterminated huffman code".into()));
            }
        }
    }
    if out.len() != raw_len {
        return Err(StorageError::Corrupt(format!(
            "decoded {} of {} bytes",
            out.len(),
            raw_len
        )));
    }
    Ok(out)
}

/// Per-symbol code lengths from symbol frequencies, all zero for empty
/// input. A single distinct symbol gets a one-bit code.
fn code_lengths(raw: &[u8]) -> [u8; TABLE_LEN] {
    let mut freq = [0u64; TABLE_LEN];
    for &byte in raw {
        freq[byte as usize] += 1;
    }

    let mut lengths = [0u8; TABLE_LEN];
    let present: Vec<usize> = (0..TABLE_LEN).filter(|&s| freq[s] > 0).collect();
    match present.len() {
        0 => return lengths,
        1 => {
            lengths[present[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    // Standard heap-built Huffman tree; nodes carry their symbol sets so we
    // can bump every member's depth on merge.
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &sym in &present {
        heap.push(Reverse((freq[sym], groups.len())));
        groups.push(vec![sym]);
    }
    while heap.len() > 1 {
        if let (Some(Reverse((fa, a))), Some(Reverse((fb, b)))) = (heap.pop(), heap.pop()) {
            let mut merged = Vec::with_capacity(groups[a].len() + groups[b].len());
            for &sym in groups[a].iter().chain(groups[b].iter()) {
                lengths[sym] += 1;
                merged.push(sym);
            }
            heap.push(Reverse((fa + fb, groups.len())));
            groups.push(merged);
        }
    }
    lengths
}

/// Canonical assignment: symbols sorted by (length, value) get consecutive
/// codes, shifted left at each length increase.
fn canonical_codes(lengths: &[u8; TABLE_LEN]) -> Vec<(u32, u8)> {
    let mut ordered: Vec<(u8, u8)> = lengths
        .iter()
        .enumerate()
        .filter(|(_, &len)| len > 0)
        .map(|(sym, &len)| (len, sym as u8))
        .collect();
    ordered.sort_unstable();

    let mut codes = vec![(0u32, 0u8); TABLE_LEN];
    let mut code: u32 = 0;
    let mut prev_len: u8 = 0;
    for &(len, sym) in &ordered {
        code <<= len - prev_len;
        codes[sym as usize] = (code, len);
        code += 1;
        prev_len = len;
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_json_text() {
        let raw = br#"{"device":{"exposure":1200,"gain":3},"streams":["depth","ir"]}"#;
        let packed = compress(raw);
        assert_eq!(decompress(&packed).unwrap(), raw);
        assert!(packed.len() < raw.len() + HEADER_LEN + 8);
    }

    #[test]
    fn round_trips_non_ascii() {
        let raw = "配置: tiefe säule λ=532nm".as_bytes();
        assert_eq!(decompress(&compress(raw)).unwrap(), raw);
    }

    #[test]
    fn empty_input_round_trips() {
        let packed = compress(&[]);
        assert_eq!(decompress(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn single_symbol_input_round_trips() {
        let raw = vec![b'x'; 1000];
        let packed = compress(&raw);
        assert_eq!(decompress(&packed).unwrap(), raw);
        // One symbol at one bit each: the bitstream is 125 bytes.
        assert_eq!(packed.len(), HEADER_LEN + 125);
    }

    #[test]
    fn all_byte_values_round_trip() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert_eq!(decompress(&compress(&raw)).unwrap(), raw);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let packed = compress(b"some configuration text");
        assert!(decompress(&packed[..packed.len() - 2]).is_err());
        assert!(decompress(&packed[..10]).is_err());
    }
}
