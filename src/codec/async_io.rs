//! Cooperative-async counterpart to the sync [`Writer`](super::Writer) /
//! [`Reader`](super::Reader), for the host (UI) thread, which must never
//! block (spec §4.2, §5).
//!
//! Each side guards against being polled from two futures at once with a
//! simple in-flight flag: the host thread only ever drives one read and one
//! write future at a time, but nothing stops a caller from constructing two
//! and polling both, so this crate raises [`BridgeError::ReentrantIo`]
//! rather than silently interleaving partial reservations.

use core::cell::Cell;

use super::scalar;
use crate::bip_stream::{Consumer, Producer};
use crate::error::{BridgeError, Result};
use crate::lock::LockStrategy;
use crate::wait::await_until;

/// Async counterpart to [`super::Writer`].
pub struct AsyncWriter<'p, S> {
    producer: Producer<'p>,
    strategy: S,
    in_flight: Cell<bool>,
}

impl<'p, S: LockStrategy> AsyncWriter<'p, S> {
    pub fn new(producer: Producer<'p>, strategy: S) -> Self {
        Self {
            producer,
            strategy,
            in_flight: Cell::new(false),
        }
    }

    fn enter(&self) -> Result<()> {
        if self.in_flight.replace(true) {
            return Err(BridgeError::ReentrantIo);
        }
        Ok(())
    }

    fn leave(&self) {
        self.in_flight.set(false);
    }

    /// Writes every byte of `bytes`, yielding to the async runtime's timer
    /// facility between reservation attempts instead of blocking.
    pub async fn write_bytes_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.enter()?;
        let result = self.write_bytes_raw_inner(bytes).await;
        self.leave();
        result
    }

    async fn write_bytes_raw_inner(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            let remaining = (bytes.len() - offset) as u32;
            let mut reservation = None;
            await_until(&mut self.strategy, || {
                match self.producer.reserve(remaining, true) {
                    Ok(Some(r)) => {
                        reservation = Some(Ok(r));
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        reservation = Some(Err(e));
                        true
                    }
                }
            })
            .await?;
            let mut reservation = match reservation {
                Some(Ok(r)) => r,
                Some(Err(e)) => return Err(e),
                None => unreachable!("await_until only returns once the predicate is true"),
            };
            let take = reservation.len() as usize;
            reservation
                .bytes_mut()
                .copy_from_slice(&bytes[offset..offset + take]);
            self.producer.commit(reservation);
            offset += take;
        }
        Ok(())
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_u32(bytes.len() as u32).await?;
        self.write_bytes_raw(bytes).await
    }

    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes()).await
    }
}

macro_rules! write_scalar_async {
    ($method:ident, $ty:ty, $codec:ident) => {
        impl<'p, S: LockStrategy> AsyncWriter<'p, S> {
            #[doc = concat!("Writes a big-endian `", stringify!($ty), "`.")]
            pub async fn $method(&mut self, value: $ty) -> Result<()> {
                let bytes = scalar::$codec::encode(value);
                self.write_bytes_raw(&bytes).await
            }
        }
    };
}

write_scalar_async!(write_u8, u8, u8_codec);
write_scalar_async!(write_u16, u16, u16_codec);
write_scalar_async!(write_u32, u32, u32_codec);
write_scalar_async!(write_u64, u64, u64_codec);
write_scalar_async!(write_i8, i8, i8_codec);
write_scalar_async!(write_i16, i16, i16_codec);
write_scalar_async!(write_i32, i32, i32_codec);
write_scalar_async!(write_i64, i64, i64_codec);
write_scalar_async!(write_f32, f32, f32_codec);
write_scalar_async!(write_f64, f64, f64_codec);

/// Async counterpart to [`super::Reader`].
pub struct AsyncReader<'p, S> {
    consumer: Consumer<'p>,
    strategy: S,
    in_flight: Cell<bool>,
    /// Backing storage for [`AsyncReader::read_bytes_raw`]/
    /// [`AsyncReader::read_bytes`]; reused across calls instead of
    /// allocating a fresh `Vec` per read.
    scratch: std::vec::Vec<u8>,
}

impl<'p, S: LockStrategy> AsyncReader<'p, S> {
    pub fn new(consumer: Consumer<'p>, strategy: S) -> Self {
        Self {
            consumer,
            strategy,
            in_flight: Cell::new(false),
            scratch: std::vec::Vec::new(),
        }
    }

    fn enter(&self) -> Result<()> {
        if self.in_flight.replace(true) {
            return Err(BridgeError::ReentrantIo);
        }
        Ok(())
    }

    fn leave(&self) {
        self.in_flight.set(false);
    }

    pub async fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        self.enter()?;
        let result = self.read_exact_inner(out).await;
        self.leave();
        result
    }

    async fn read_exact_inner(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < out.len() {
            await_until(&mut self.strategy, || !self.consumer.valid().is_empty()).await?;
            let valid = self.consumer.valid();
            let take = valid.len().min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&valid[..take]);
            self.consumer.consume(take as u32)?;
            filled += take;
        }
        Ok(())
    }

    /// Reads into the reader's scratch storage and returns a view over it.
    /// The view borrows `self`, so it must be copied out before the next
    /// read call, which is free to overwrite the same storage (spec §4.3
    /// "Returned buffers").
    pub async fn read_bytes_raw(&mut self, len: usize) -> Result<&[u8]> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(len, 0);
        let result = self.read_exact(&mut scratch).await;
        self.scratch = scratch;
        result?;
        Ok(&self.scratch[..len])
    }

    /// Same scratch-buffer contract as [`AsyncReader::read_bytes_raw`].
    pub async fn read_bytes(&mut self) -> Result<&[u8]> {
        let len = self.read_u32().await? as usize;
        self.read_bytes_raw(len).await
    }

    pub async fn read_string(&mut self) -> Result<std::string::String> {
        let bytes = self.read_bytes().await?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| BridgeError::BadEvent {
                reason: "string payload was not valid utf-8",
            })
    }
}

macro_rules! read_scalar_async {
    ($method:ident, $ty:ty, $codec:ident, $width:expr) => {
        impl<'p, S: LockStrategy> AsyncReader<'p, S> {
            #[doc = concat!("Reads a big-endian `", stringify!($ty), "`.")]
            pub async fn $method(&mut self) -> Result<$ty> {
                let mut buf = [0u8; $width];
                self.read_exact(&mut buf).await?;
                Ok(scalar::$codec::decode(&buf))
            }
        }
    };
}

read_scalar_async!(read_u8, u8, u8_codec, 1);
read_scalar_async!(read_u16, u16, u16_codec, 2);
read_scalar_async!(read_u32, u32, u32_codec, 4);
read_scalar_async!(read_u64, u64, u64_codec, 8);
read_scalar_async!(read_i8, i8, i8_codec, 1);
read_scalar_async!(read_i16, i16, i16_codec, 2);
read_scalar_async!(read_i32, i32, i32_codec, 4);
read_scalar_async!(read_i64, i64, i64_codec, 8);
read_scalar_async!(read_f32, f32, f32_codec, 4);
read_scalar_async!(read_f64, f64, f64_codec, 8);

#[cfg(test)]
mod test {
    use super::*;
    use crate::bip_stream::BipStream;
    use crate::lock::Busy;

    #[tokio::test]
    async fn scalar_roundtrip() {
        let stream = BipStream::create(64).unwrap();
        let (producer, consumer) = stream.split();
        let mut writer = AsyncWriter::new(producer, Busy);
        let mut reader = AsyncReader::new(consumer, Busy);

        writer.write_u32(7).await.unwrap();
        writer.write_string("async").await.unwrap();

        assert_eq!(reader.read_u32().await.unwrap(), 7);
        assert_eq!(reader.read_string().await.unwrap(), "async");
    }

    #[tokio::test]
    async fn reentrant_write_is_rejected() {
        let stream = BipStream::create(64).unwrap();
        let (producer, _consumer) = stream.split();
        let writer = AsyncWriter::new(producer, Busy);
        writer.in_flight.set(true);
        let mut writer = writer;
        assert!(matches!(
            writer.write_u8(1).await,
            Err(BridgeError::ReentrantIo)
        ));
    }
}
