//! Integration suite for the literal boundary scenarios enumerated in
//! spec.md §8: tiny-ring throughput, a scalar straddling the wrap boundary,
//! and a flexible-reservation byte payload. These exercise `bip_stream`
//! purely through its public API, the way a real producer/consumer pair on
//! opposite sides of the shared region would.

use bridge_core::bip_stream::BipStream;

#[test]
fn tiny_ring_throughput_1000_u32() {
    let stream = BipStream::create(15).unwrap();
    let (mut p, mut c) = stream.split();
    let mut consumed = Vec::new();
    for i in 0u32..1000 {
        let bytes = i.to_be_bytes();
        let mut remaining: &[u8] = &bytes;
        while !remaining.is_empty() {
            loop {
                if let Some(mut res) = p.reserve(remaining.len() as u32, true).unwrap() {
                    let n = res.len() as usize;
                    res.bytes_mut().copy_from_slice(&remaining[..n]);
                    p.commit(res);
                    remaining = &remaining[n..];
                    break;
                }
                let v = c.valid();
                if !v.is_empty() {
                    consumed.extend_from_slice(v);
                    let len = v.len() as u32;
                    c.consume(len).unwrap();
                }
            }
        }
        let v = c.valid();
        consumed.extend_from_slice(v);
        let len = v.len() as u32;
        c.consume(len).unwrap();
    }
    let expected: Vec<u8> = (0u32..1000).flat_map(|i| i.to_be_bytes()).collect();
    assert_eq!(consumed, expected);
}

#[test]
fn wraparound_straddling_i64() {
    let stream = BipStream::create(15).unwrap();
    let (mut p, mut c) = stream.split();

    // Burn 10 bytes to move `write` to offset 10, then drain them.
    let mut res = p.reserve(10, false).unwrap().unwrap();
    res.bytes_mut().copy_from_slice(&[0u8; 10]);
    p.commit(res);
    let v = c.valid();
    let n = v.len() as u32;
    c.consume(n).unwrap();

    let value: i64 = -123_456_789;
    let bytes = value.to_be_bytes();
    let mut remaining: &[u8] = &bytes;
    while !remaining.is_empty() {
        let mut res = p.reserve(remaining.len() as u32, true).unwrap().unwrap();
        let n = res.len() as usize;
        res.bytes_mut().copy_from_slice(&remaining[..n]);
        p.commit(res);
        remaining = &remaining[n..];
    }

    let mut decoded = [0u8; 8];
    let mut filled = 0;
    while filled < 8 {
        let v = c.valid();
        let n = v.len().min(8 - filled);
        decoded[filled..filled + n].copy_from_slice(&v[..n]);
        c.consume(n as u32).unwrap();
        filled += n;
    }
    assert_eq!(i64::from_be_bytes(decoded), value);
}

#[test]
fn flexible_bytes_payload() {
    let stream = BipStream::create(32).unwrap();
    let (mut p, mut c) = stream.split();
    let payload: Vec<u8> = (0u8..100).collect();

    let mut remaining: &[u8] = &payload;
    while !remaining.is_empty() {
        loop {
            if let Some(mut res) = p.reserve(remaining.len() as u32, true).unwrap() {
                let n = res.len() as usize;
                res.bytes_mut().copy_from_slice(&remaining[..n]);
                p.commit(res);
                remaining = &remaining[n..];
                break;
            }
            let v = c.valid();
            let n = v.len() as u32;
            if n > 0 {
                c.consume(n).unwrap();
            }
        }
    }

    let mut received = Vec::new();
    while received.len() < payload.len() {
        let v = c.valid();
        received.extend_from_slice(v);
        let n = v.len() as u32;
        c.consume(n).unwrap();
    }
    assert_eq!(received, payload);
}
