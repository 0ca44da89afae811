//! Length-prefixed single-producer/single-consumer stdin channel (spec §3,
//! §4.7, §6): a single atomic length word followed by a fixed payload area,
//! synchronized by genuine atomic wait/notify on the length word itself
//! rather than the backoff-driven polling [`crate::lock`] gives the
//! bip-stream — there is exactly one producer write and one consumer read in
//! flight at a time, so a real futex on the length word is both simpler and
//! cheaper than running a lock strategy over it.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::error::{BridgeError, Result};

const EOF: i32 = -1;
const EMPTY: i32 = 0;

/// Owns the shared `[len: i32][payload]` region for the lifetime of one
/// connection (spec §6).
pub struct StdinRing {
    region: Box<[u8]>,
    payload_len: u32,
}

/// Host-side producer half. Only `push_data`/`push_eof` may be called here.
pub struct StdinProducer<'a> {
    len: &'a AtomicI32,
    payload: &'a [UnsafeCell<u8>],
}

// SAFETY: the producer only stores into `len` (via compare-driven waits) and
// the payload bytes while `len == 0`, a region the consumer never reads from
// in that state; moving the handle to another thread is sound.
unsafe impl Send for StdinProducer<'_> {}

/// Compute-side consumer half. Only `consumer_read` may be called here.
pub struct StdinConsumer<'a> {
    len: &'a AtomicI32,
    payload: &'a [UnsafeCell<u8>],
}

// SAFETY: symmetric to `StdinProducer`.
unsafe impl Send for StdinConsumer<'_> {}

/// Result of [`StdinConsumer::consumer_read`].
pub enum StdinRead {
    /// `len` bytes of standard input, in order.
    Data(std::vec::Vec<u8>),
    /// The producer has signaled end of input.
    Eof,
}

impl StdinRing {
    /// Allocates a `4 + payload_len` byte region with `len` initialized to
    /// `EMPTY`.
    pub fn create(payload_len: u32) -> Result<Self> {
        if payload_len == 0 {
            return Err(BridgeError::BadReservation {
                requested: 0,
                flexible: false,
                capacity: 0,
            });
        }
        let total = 4 + payload_len as usize;
        let mut region = vec![0u8; total].into_boxed_slice();
        let base = region.as_mut_ptr();
        assert_eq!(
            base as usize % core::mem::align_of::<AtomicI32>(),
            0,
            "stdin ring region must be 4-byte aligned"
        );
        // SAFETY: `base` points to `total` freshly zeroed, aligned bytes,
        // and no other reference to this allocation exists yet.
        let len = unsafe { &*base.cast::<AtomicI32>() };
        len.store(EMPTY, Ordering::Relaxed);
        Ok(Self { region, payload_len })
    }

    /// Splits the ring into its producer and consumer halves.
    pub fn split(&self) -> (StdinProducer<'_>, StdinConsumer<'_>) {
        let base = self.region.as_ptr();
        // SAFETY: `base` points to the allocation from `create`; the first
        // 4 bytes are a valid, aligned `AtomicI32`.
        let len = unsafe { &*base.cast::<AtomicI32>() };
        let payload_ptr = unsafe { base.add(4) };
        // SAFETY: `payload_ptr .. payload_ptr + payload_len` lies entirely
        // within `region`, which outlives both returned handles.
        let payload = unsafe {
            core::slice::from_raw_parts(
                payload_ptr.cast::<UnsafeCell<u8>>(),
                self.payload_len as usize,
            )
        };
        (StdinProducer { len, payload }, StdinConsumer { len, payload })
    }
}

impl StdinProducer<'_> {
    /// Waits until the ring is empty, writes `bytes`, and publishes `len`.
    ///
    /// Fails if `bytes` is longer than the payload area.
    pub fn push_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u32 > self.payload.len() as u32 {
            return Err(BridgeError::BadEvent {
                reason: "stdin payload exceeds ring capacity",
            });
        }
        wait_for(self.len, EMPTY);
        // SAFETY: `len == EMPTY` was just observed, and only the consumer
        // ever sets `len` back to `EMPTY`, which it does only after it has
        // finished reading every payload byte — the payload area is free.
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.payload[0].get(),
                bytes.len(),
            );
        }
        self.len.store(bytes.len() as i32, Ordering::Release);
        notify(self.len);
        Ok(())
    }

    /// Waits until the ring is empty, then publishes the EOF marker.
    pub fn push_eof(&mut self) {
        wait_for(self.len, EMPTY);
        self.len.store(EOF, Ordering::Release);
        notify(self.len);
    }
}

impl StdinConsumer<'_> {
    /// Waits for data or EOF, decodes up to `max_bytes`, and compacts any
    /// remainder to the head of the payload area.
    pub fn consumer_read(&mut self, max_bytes: usize) -> Result<StdinRead> {
        let observed = wait_for_nonzero(self.len);
        if observed == EOF {
            self.len.store(EMPTY, Ordering::Release);
            notify(self.len);
            return Ok(StdinRead::Eof);
        }

        let available = observed as usize;
        let take = available.min(max_bytes);
        let mut out = std::vec![0u8; take];
        // SAFETY: `[0, available)` of `payload` holds bytes the producer
        // published under `len`'s release store, which `wait_for_nonzero`
        // synchronizes with via its acquire load.
        unsafe {
            core::ptr::copy_nonoverlapping(self.payload[0].get(), out.as_mut_ptr(), take);
        }

        let remainder = available - take;
        if remainder > 0 {
            // SAFETY: both ranges lie within `payload`, which is `available`
            // bytes live at this point; the ranges may overlap, hence
            // `copy` rather than `copy_nonoverlapping`.
            unsafe {
                core::ptr::copy(
                    self.payload[take].get(),
                    self.payload[0].get(),
                    remainder,
                );
            }
        }
        self.len.store(remainder as i32, Ordering::Release);
        notify(self.len);
        Ok(StdinRead::Data(out))
    }
}

fn wait_for(cell: &AtomicI32, expected: i32) {
    while cell.load(Ordering::Acquire) != expected {
        park(cell, cell.load(Ordering::Acquire));
    }
}

fn wait_for_nonzero(cell: &AtomicI32) -> i32 {
    loop {
        let v = cell.load(Ordering::Acquire);
        if v != EMPTY {
            return v;
        }
        park(cell, v);
    }
}

#[cfg(all(target_arch = "wasm32", target_feature = "atomics"))]
fn park(cell: &AtomicI32, observed: i32) {
    let timeout_ns = 1_000_000; // 1ms slices; re-checks the predicate itself.
    // SAFETY: `cell` is a live, aligned `AtomicI32` for the region's
    // lifetime; waiting on the exact value just observed is the documented
    // contract of `memory_atomic_wait32`.
    unsafe {
        core::arch::wasm32::memory_atomic_wait32(
            cell as *const AtomicI32 as *mut i32,
            observed,
            timeout_ns,
        );
    }
}

#[cfg(not(all(target_arch = "wasm32", target_feature = "atomics")))]
fn park(_cell: &AtomicI32, _observed: i32) {
    crate::wait::sleep_ms(1);
}

#[cfg(all(target_arch = "wasm32", target_feature = "atomics"))]
fn notify(cell: &AtomicI32) {
    // SAFETY: see `park` above.
    unsafe {
        core::arch::wasm32::memory_atomic_notify(cell as *const AtomicI32 as *mut i32, u32::MAX);
    }
}

#[cfg(not(all(target_arch = "wasm32", target_feature = "atomics")))]
fn notify(_cell: &AtomicI32) {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_read_data() {
        let ring = StdinRing::create(64).unwrap();
        let (mut p, mut c) = ring.split();
        p.push_data(b"hello").unwrap();
        match c.consumer_read(64).unwrap() {
            StdinRead::Data(bytes) => assert_eq!(bytes, b"hello"),
            StdinRead::Eof => panic!("expected data"),
        }
    }

    #[test]
    fn partial_read_compacts_remainder() {
        let ring = StdinRing::create(64).unwrap();
        let (mut p, mut c) = ring.split();
        p.push_data(b"helloworld").unwrap();
        match c.consumer_read(5).unwrap() {
            StdinRead::Data(bytes) => assert_eq!(bytes, b"hello"),
            StdinRead::Eof => panic!("expected data"),
        }
        match c.consumer_read(64).unwrap() {
            StdinRead::Data(bytes) => assert_eq!(bytes, b"world"),
            StdinRead::Eof => panic!("expected data"),
        }
    }

    #[test]
    fn eof_resets_and_signals() {
        let ring = StdinRing::create(16).unwrap();
        let (mut p, mut c) = ring.split();
        p.push_eof();
        assert!(matches!(c.consumer_read(16).unwrap(), StdinRead::Eof));
    }

    #[test]
    fn push_rejects_oversized_payload() {
        let ring = StdinRing::create(4).unwrap();
        let (mut p, _c) = ring.split();
        assert!(p.push_data(b"too many bytes").is_err());
    }
}
