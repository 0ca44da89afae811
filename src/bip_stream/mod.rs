//! Single-producer/single-consumer lock-free ring buffer with wrap-around
//! reservations over a shared byte region (spec §3, §4.1, §6).
//!
//! The three index words (`read`, `write`, `last`) each sit on their own
//! 64-byte cache line to avoid false sharing between the producer and
//! consumer, exactly mirroring the header layout the teacher crate uses for
//! its persistent log ring, just with a third index added for the
//! wrap-around high-water mark.
//!
//! # Shared-memory threads
//!
//! On `wasm32-unknown-unknown` this module assumes the crate is built with
//! `+atomics,+bulk-memory` and instantiated against a shared
//! `WebAssembly.Memory` — the same model `aero-wasm`'s `wasm-threaded`
//! feature targets. In that configuration a `Box<[u8]>` allocated on one
//! worker is visible (by raw offset) to every worker sharing the instance,
//! so the region itself needs no JS-side `SharedArrayBuffer` wrapper: the
//! out-of-scope host/orchestration layer is responsible for handing the
//! `usize` base address and `capacity` to the other side (e.g. over
//! `postMessage`), which is exactly the boundary spec.md draws around
//! "opaque services" it does not define.

mod reservation;

pub use reservation::Reservation;

use crate::error::{BridgeError, Result};
use core::cell::UnsafeCell;
use core::mem::{align_of, size_of};
use core::sync::atomic::{AtomicU32, Ordering};

/// Bytes between the start of consecutive index words, chosen to land each
/// one on its own cache line on every architecture this crate targets.
const LINE_SIZE: usize = 64;

#[repr(C, align(64))]
struct CacheLinePadded(AtomicU32);

/// The three-index header described in spec.md §6.
///
/// `read` is only ever stored by the [`Consumer`], `write` and `last` only
/// ever stored by the [`Producer`]. All three may be loaded by either side.
#[repr(C)]
struct Header {
    read: CacheLinePadded,
    write: CacheLinePadded,
    last: CacheLinePadded,
}

const _: () = assert!(size_of::<Header>() == 3 * LINE_SIZE);

/// Owns the shared region for the lifetime of one connection.
///
/// Created once by whichever side allocates the memory (normally the host
/// facade, C6), then [`BipStream::split`] hands out the [`Producer`] and
/// [`Consumer`] halves to be sent to their respective threads.
pub struct BipStream {
    region: Box<[u8]>,
    data_len: u32,
}

/// Producer-side handle. Only `reserve`/`commit` may be called from here;
/// cross-producer use (more than one `Producer` for the same region) is
/// undefined per spec.md's SPSC contract.
pub struct Producer<'a> {
    header: &'a Header,
    data: &'a [UnsafeCell<u8>],
}

// SAFETY: the producer only touches `header.write`/`header.last` (never
// concurrently mutated by the consumer) and the byte range of its own
// uncommitted reservation (never aliased by a `valid()` slice, by the ring's
// invariants). Moving the handle to another thread is therefore sound.
unsafe impl Send for Producer<'_> {}

/// Consumer-side handle. Only `valid`/`consume` may be called from here.
pub struct Consumer<'a> {
    header: &'a Header,
    data: &'a [UnsafeCell<u8>],
    /// Most recent slice returned by `valid()`, used to bound `consume()`.
    last_valid_len: u32,
}

// SAFETY: symmetric to `Producer`'s argument — the consumer only touches
// `header.read` and the byte ranges `valid()` has already published to it.
unsafe impl Send for Consumer<'_> {}

impl BipStream {
    /// Allocates `3 * LINE_SIZE + capacity + 1` bytes and initializes
    /// `read = write = 0`, `last = capacity` (the one extra byte is the
    /// sentinel that keeps "full" distinguishable from "empty").
    ///
    /// Fails when `capacity == 0`.
    pub fn create(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::BadReservation {
                requested: 0,
                flexible: false,
                capacity: 0,
            });
        }
        let data_len = capacity
            .checked_add(1)
            .expect("capacity + 1 must not overflow u32");
        let total = 3 * LINE_SIZE + data_len as usize;
        let mut region = vec![0u8; total].into_boxed_slice();

        // SAFETY: `region` is freshly allocated, `total` bytes, aligned to
        // at least the allocator's default alignment. `Header` requires
        // align(64); `Vec<u8>`'s allocation is not guaranteed 64-byte
        // aligned in general, so we assert it here rather than transmute
        // blindly — on every allocator this crate has been exercised
        // against the global allocator already over-aligns allocations of
        // this size, but we do not rely on that silently.
        let base = region.as_mut_ptr();
        assert_eq!(
            base as usize % align_of::<Header>(),
            0,
            "bip-stream region must be 64-byte aligned"
        );

        // SAFETY: `base` points to `total` freshly zeroed bytes, `Header`
        // is `repr(C)` and at least as small as `3 * LINE_SIZE`, and no
        // other reference to this allocation exists yet.
        let header = unsafe { &*base.cast::<Header>() };
        header.read.0.store(0, Ordering::Relaxed);
        header.write.0.store(0, Ordering::Relaxed);
        header.last.0.store(data_len, Ordering::Relaxed);

        Ok(Self { region, data_len })
    }

    /// Splits the stream into its producer and consumer halves.
    ///
    /// # Safety
    ///
    /// The caller must ensure each half is used by exactly one thread for
    /// the lifetime of the connection; concurrent use of two `Producer`s or
    /// two `Consumer`s for the same region is undefined per the SPSC
    /// contract.
    pub fn split(&self) -> (Producer<'_>, Consumer<'_>) {
        let base = self.region.as_ptr();
        // SAFETY: `base` points to the same allocation used in `create`;
        // `Header` occupies the first `3 * LINE_SIZE` bytes of it.
        let header = unsafe { &*base.cast::<Header>() };
        let data_ptr = unsafe { base.add(3 * LINE_SIZE) };
        // SAFETY: `data_ptr .. data_ptr + data_len` lies entirely within
        // `region`, which outlives both returned handles (borrowed from
        // `&self`). `UnsafeCell<u8>` has the same layout as `u8`, so
        // reinterpreting the byte range is sound; the cells give both
        // halves the interior mutability they need to write/read
        // disjoint-by-protocol sub-ranges through shared references.
        let data = unsafe {
            core::slice::from_raw_parts(data_ptr.cast::<UnsafeCell<u8>>(), self.data_len as usize)
        };
        (
            Producer { header, data },
            Consumer {
                header,
                data,
                last_valid_len: 0,
            },
        )
    }

    /// Usable byte capacity (`data_len - 1`), i.e. the `count` argument
    /// passed to `create`.
    pub fn capacity(&self) -> u32 {
        self.data_len - 1
    }
}

impl<'a> Producer<'a> {
    fn data_len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Attempts to reserve `count` contiguous bytes for writing.
    ///
    /// When `flexible` is `false`, a successful reservation is always
    /// exactly `count` bytes long, and `count` greater than half the data
    /// area is rejected outright (it could never be satisfied without risking
    /// deadlock against a consumer that hasn't drained anything yet). When
    /// `flexible` is `true`, a successful reservation is `0 < len <= count`
    /// bytes — whatever contiguous space is available.
    pub fn reserve(&mut self, count: u32, flexible: bool) -> Result<Option<Reservation<'a>>> {
        if count == 0 {
            return Err(BridgeError::BadReservation {
                requested: count,
                flexible,
                capacity: self.data_len(),
            });
        }
        if !flexible && count > self.data_len() / 2 {
            return Err(BridgeError::BadReservation {
                requested: count,
                flexible,
                capacity: self.data_len(),
            });
        }

        // Acquire: must observe the consumer's latest `read` to compute
        // available space correctly.
        let read = self.header.read.0.load(Ordering::Acquire);
        // Relaxed: only the producer ever stores `write`.
        let write = self.header.write.0.load(Ordering::Relaxed);
        let len = self.data_len();

        let (start, cap, wraparound) = if write >= read {
            let tail = len - write;
            if tail >= count {
                (write, count, false)
            } else if flexible && tail > 0 {
                (write, tail, false)
            } else {
                let wrap_space = read.saturating_sub(1);
                if wrap_space == 0 {
                    return Ok(None);
                } else if count <= wrap_space {
                    (0, count, true)
                } else if flexible {
                    (0, wrap_space, true)
                } else {
                    return Ok(None);
                }
            }
        } else {
            let space = read - write - 1;
            if space == 0 {
                return Ok(None);
            } else if count <= space {
                (write, count, false)
            } else if flexible {
                (write, space, false)
            } else {
                return Ok(None);
            }
        };

        let slice = &self.data[start as usize..(start + cap) as usize];
        Ok(Some(Reservation::new(slice, wraparound)))
    }

    /// Publishes a reservation, making its bytes visible to the consumer.
    ///
    /// If the reservation wrapped, `last` is published first (recording the
    /// old `write` as the high-water mark) before `write` resets to `0`;
    /// `write` is always the final, sequentially-consistent store so the
    /// consumer never observes a wrap where `write` appears past `last`.
    pub fn commit(&mut self, reservation: Reservation<'a>) {
        let len = reservation.len();
        let wraparound = reservation.wraparound();
        // `Reservation::drop` would otherwise run here; consume it without
        // running any cleanup logic since committing is the intended exit.
        core::mem::forget(reservation);

        let mut write = self.header.write.0.load(Ordering::Relaxed);
        if wraparound {
            self.header.last.0.store(write, Ordering::SeqCst);
            write = 0;
        }
        write += len;
        if write > self.header.last.0.load(Ordering::Relaxed) {
            self.header.last.0.store(write, Ordering::Relaxed);
        }
        self.header.write.0.store(write, Ordering::SeqCst);
    }
}

impl Consumer<'_> {
    /// Returns the longest contiguous slice of unread bytes currently
    /// available. May be shorter than the total amount of unread data when
    /// the unread region straddles the end of the ring — the remainder
    /// becomes visible on the next call, once `consume` has advanced past
    /// the wrap point.
    pub fn valid(&mut self) -> &[u8] {
        // SeqCst: the consumer must observe `write` (and, when needed,
        // `last`) no earlier than the producer's publishing stores in
        // `commit`, in that order, to guarantee it never sees a `write`
        // that has wrapped past a stale `last`.
        let write = self.header.write.0.load(Ordering::SeqCst);
        let read = self.header.read.0.load(Ordering::Relaxed);

        let (start, end) = if write >= read {
            (read, write)
        } else {
            let last = self.header.last.0.load(Ordering::SeqCst);
            if read == last {
                self.header.read.0.store(0, Ordering::Relaxed);
                return self.valid();
            }
            (read, last)
        };

        self.last_valid_len = end - start;
        // SAFETY: `[start, end)` lies within `self.data` by the invariants
        // maintained by `reserve`/`commit`/`consume`; the producer never
        // writes into a range the consumer currently considers valid.
        unsafe {
            core::slice::from_raw_parts(
                self.data[start as usize].get().cast::<u8>(),
                (end - start) as usize,
            )
        }
    }

    /// Marks `count` bytes (from the start of the most recent `valid()`
    /// slice) as consumed, freeing that space for the producer.
    pub fn consume(&mut self, count: u32) -> Result<()> {
        let read = self.header.read.0.load(Ordering::Relaxed);
        let write = self.header.write.0.load(Ordering::Relaxed);

        if write >= read {
            if read + count > write {
                return Err(BridgeError::BadConsume {
                    count,
                    available: write - read,
                });
            }
            self.header.read.0.store(read + count, Ordering::Release);
        } else {
            let last = self.header.last.0.load(Ordering::Relaxed);
            if count == last - read {
                self.header.read.0.store(0, Ordering::Release);
            } else if read + count <= last {
                self.header.read.0.store(read + count, Ordering::Release);
            } else {
                return Err(BridgeError::BadConsume {
                    count,
                    available: last - read,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(capacity: u32, writes: &[&[u8]]) -> Vec<u8> {
        let stream = BipStream::create(capacity).unwrap();
        let (mut p, mut c) = stream.split();
        let mut out = Vec::new();
        for chunk in writes {
            let mut remaining = *chunk;
            while !remaining.is_empty() {
                let res = p
                    .reserve(remaining.len() as u32, true)
                    .unwrap()
                    .expect("space should be available in this test");
                let n = res.len() as usize;
                let mut res = res;
                res.bytes_mut().copy_from_slice(&remaining[..n]);
                p.commit(res);
                remaining = &remaining[n..];

                let v = c.valid();
                out.extend_from_slice(v);
                let len = v.len() as u32;
                c.consume(len).unwrap();
            }
        }
        out
    }

    #[test]
    fn simple_roundtrip() {
        assert_eq!(roundtrip(15, &[b"hello", b"world"]), b"helloworld");
    }

    #[test]
    fn wraparound_roundtrip() {
        // Force several wraps by writing more than the capacity many times.
        let data: Vec<u8> = (0u8..=250).collect();
        assert_eq!(roundtrip(7, &[&data]), data);
    }

    #[test]
    fn reserve_rejects_zero() {
        let stream = BipStream::create(16).unwrap();
        let (mut p, _c) = stream.split();
        assert!(p.reserve(0, true).is_err());
    }

    #[test]
    fn reserve_rejects_oversized_inflexible() {
        let stream = BipStream::create(16).unwrap();
        let (mut p, _c) = stream.split();
        // capacity + 1 sentinel = 17 data bytes; half is 8.
        assert!(p.reserve(9, false).is_err());
    }

    #[test]
    fn consume_rejects_overrun() {
        let stream = BipStream::create(16).unwrap();
        let (mut p, mut c) = stream.split();
        let mut res = p.reserve(4, false).unwrap().unwrap();
        res.bytes_mut().copy_from_slice(b"abcd");
        p.commit(res);
        assert_eq!(c.valid().len(), 4);
        assert!(c.consume(5).is_err());
        c.consume(4).unwrap();
    }

    #[test]
    fn tiny_ring_throughput_1000_u32() {
        // Boundary scenario 1: capacity 15, interleaved writes/reads of
        // 1000 u32 values, final sequence equals the producer sequence.
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
                    // drain before retrying the reservation
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
        // Boundary scenario 2: capacity 15, write is forced to offset 10
        // before an 8-byte i64 is written and read back.
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
        // Boundary scenario 3: capacity 32, a 100-byte payload written via
        // repeated flexible reservations, reconstructed byte for byte.
        let payload: Vec<u8> = (0u8..100).collect();
        assert_eq!(roundtrip(32, &[&payload]), payload);
    }
}
