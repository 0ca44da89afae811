//! Typed scalar/bytes/string codec over a [`bip_stream`](crate::bip_stream)
//! producer/consumer pair (spec §3, §4.3).
//!
//! Scalars are written with [`Writer::write_u32`] and friends; bytes and
//! strings with [`Writer::write_bytes`]/[`Writer::write_string`]. Every write
//! is built on top of [`Writer::write_bytes_raw`], which reserves as many
//! times as it takes to place every byte — a scalar whose width doesn't fit
//! the ring's current tail is transparently split across two consecutive
//! reservations, the straddle spec.md §4.3 describes, rather than requiring
//! one contiguous allocation.

pub mod scalar;

#[cfg(feature = "async")]
pub mod async_io;

use crate::bip_stream::{Consumer, Producer};
use crate::error::{BridgeError, Result};
use crate::lock::LockStrategy;
use crate::wait::{block_until, retry_until_some};

/// Writes typed values onto the producer side of a stream, blocking (per
/// `S`'s wait policy) whenever the ring has no room.
pub struct Writer<'p, S> {
    producer: Producer<'p>,
    strategy: S,
}

impl<'p, S: LockStrategy> Writer<'p, S> {
    pub fn new(producer: Producer<'p>, strategy: S) -> Self {
        Self { producer, strategy }
    }

    /// Writes every byte of `bytes`, reserving as many times as needed.
    /// Each reservation is flexible, so a write that doesn't fit the current
    /// tail contiguously is split across the tail and the wrapped front
    /// region rather than waiting for one contiguous span.
    pub fn write_bytes_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            let remaining = (bytes.len() - offset) as u32;
            let mut reservation =
                retry_until_some(&mut self.strategy, || self.producer.reserve(remaining, true))?;
            let take = reservation.len() as usize;
            reservation.bytes_mut().copy_from_slice(&bytes[offset..offset + take]);
            self.producer.commit(reservation);
            offset += take;
        }
        Ok(())
    }

    /// Writes a `[len: u32][payload]` framed byte string (spec §4.3).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_u32(bytes.len() as u32)?;
        self.write_bytes_raw(bytes)
    }

    /// Writes a `[len: u32][utf8 payload]` framed string.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }
}

macro_rules! write_scalar {
    ($method:ident, $ty:ty, $codec:ident) => {
        impl<'p, S: LockStrategy> Writer<'p, S> {
            #[doc = concat!("Writes a big-endian `", stringify!($ty), "`.")]
            pub fn $method(&mut self, value: $ty) -> Result<()> {
                let bytes = scalar::$codec::encode(value);
                self.write_bytes_raw(&bytes)
            }
        }
    };
}

write_scalar!(write_u8, u8, u8_codec);
write_scalar!(write_u16, u16, u16_codec);
write_scalar!(write_u32, u32, u32_codec);
write_scalar!(write_u64, u64, u64_codec);
write_scalar!(write_i8, i8, i8_codec);
write_scalar!(write_i16, i16, i16_codec);
write_scalar!(write_i32, i32, i32_codec);
write_scalar!(write_i64, i64, i64_codec);
write_scalar!(write_f32, f32, f32_codec);
write_scalar!(write_f64, f64, f64_codec);

/// Reads typed values off the consumer side of a stream, blocking (per `S`'s
/// wait policy) whenever the ring has no unread bytes.
pub struct Reader<'p, S> {
    consumer: Consumer<'p>,
    strategy: S,
    /// Backing storage for [`Reader::read_bytes_raw`]/[`Reader::read_bytes`];
    /// reused across calls instead of allocating a fresh `Vec` per read.
    scratch: std::vec::Vec<u8>,
}

impl<'p, S: LockStrategy> Reader<'p, S> {
    pub fn new(consumer: Consumer<'p>, strategy: S) -> Self {
        Self {
            consumer,
            strategy,
            scratch: std::vec::Vec::new(),
        }
    }

    /// Reads exactly `out.len()` bytes into `out`. Straddling reads (where
    /// the first `valid()` slice is shorter than the requested width)
    /// accumulate into `out` a chunk at a time; scalar `read_*` wrappers pass
    /// a stack-local array, `read_bytes_raw` passes the reader's own scratch
    /// storage.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < out.len() {
            block_until(&mut self.strategy, || !self.consumer.valid().is_empty())?;
            let valid = self.consumer.valid();
            let take = valid.len().min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&valid[..take]);
            self.consumer.consume(take as u32)?;
            filled += take;
        }
        Ok(())
    }

    /// Reads a dynamically-sized byte buffer into the reader's scratch
    /// storage and returns a view over it. The view borrows `self`, so it
    /// must be copied out (or consumed) before the next read call, which is
    /// free to overwrite the same storage (spec §4.3 "Returned buffers").
    pub fn read_bytes_raw(&mut self, len: usize) -> Result<&[u8]> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(len, 0);
        let result = self.read_exact(&mut scratch);
        self.scratch = scratch;
        result?;
        Ok(&self.scratch[..len])
    }

    /// Reads a `[len: u32][payload]` framed byte string. Same scratch-buffer
    /// contract as [`Reader::read_bytes_raw`].
    pub fn read_bytes(&mut self) -> Result<&[u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes_raw(len)
    }

    /// Reads a `[len: u32][utf8 payload]` framed string.
    pub fn read_string(&mut self) -> Result<std::string::String> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| BridgeError::BadEvent {
                reason: "string payload was not valid utf-8",
            })
    }
}

macro_rules! read_scalar {
    ($method:ident, $ty:ty, $codec:ident, $width:expr) => {
        impl<'p, S: LockStrategy> Reader<'p, S> {
            #[doc = concat!("Reads a big-endian `", stringify!($ty), "`.")]
            pub fn $method(&mut self) -> Result<$ty> {
                let mut buf = [0u8; $width];
                self.read_exact(&mut buf)?;
                Ok(scalar::$codec::decode(&buf))
            }
        }
    };
}

read_scalar!(read_u8, u8, u8_codec, 1);
read_scalar!(read_u16, u16, u16_codec, 2);
read_scalar!(read_u32, u32, u32_codec, 4);
read_scalar!(read_u64, u64, u64_codec, 8);
read_scalar!(read_i8, i8, i8_codec, 1);
read_scalar!(read_i16, i16, i16_codec, 2);
read_scalar!(read_i32, i32, i32_codec, 4);
read_scalar!(read_i64, i64, i64_codec, 8);
read_scalar!(read_f32, f32, f32_codec, 4);
read_scalar!(read_f64, f64, f64_codec, 8);

#[cfg(test)]
mod test {
    use super::*;
    use crate::bip_stream::BipStream;
    use crate::lock::Busy;

    #[test]
    fn scalar_roundtrip_no_wrap() {
        let stream = BipStream::create(64).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);

        writer.write_u32(0xcafe_babe).unwrap();
        writer.write_i64(-42).unwrap();
        writer.write_f64(2.5).unwrap();

        assert_eq!(reader.read_u32().unwrap(), 0xcafe_babe);
        assert_eq!(reader.read_i64().unwrap(), -42);
        assert_eq!(reader.read_f64().unwrap(), 2.5);
    }

    #[test]
    fn scalar_straddles_wrap_boundary() {
        // Capacity 15 leaves a 16-byte data area; drain 10 bytes so the
        // consumer has moved `read` up to 10, then write an 8-byte i64 with
        // `write` already sitting at 10 — the tail only has 6 bytes left, so
        // this must straddle across two reservations.
        let stream = BipStream::create(15).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);

        writer.write_bytes_raw(&[0u8; 10]).unwrap();
        reader.read_bytes_raw(10).unwrap();

        writer.write_i64(i64::MIN + 7).unwrap();
        assert_eq!(reader.read_i64().unwrap(), i64::MIN + 7);
    }

    #[test]
    fn bytes_and_string_roundtrip() {
        let stream = BipStream::create(128).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);

        writer.write_bytes(&[1, 2, 3, 4, 5]).unwrap();
        writer.write_string("hello bridge").unwrap();

        assert_eq!(reader.read_bytes().unwrap(), &[1u8, 2, 3, 4, 5][..]);
        assert_eq!(reader.read_string().unwrap(), "hello bridge");
    }

    #[test]
    fn read_string_rejects_non_utf8() {
        let stream = BipStream::create(64).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = Writer::new(producer, Busy);
        let mut reader = Reader::new(consumer, Busy);

        writer.write_bytes(&[0xff, 0xfe, 0xfd]).unwrap();
        assert!(matches!(reader.read_string(), Err(BridgeError::BadEvent { .. })));
    }
}
