//! Big-endian (network byte order) scalar encoding, shared by the sync and
//! async codec variants (spec §3, §4.3).

/// Declares `encode`/`decode` free functions for a scalar type, each
/// operating on a fixed-size big-endian byte array.
macro_rules! scalar_codec {
    ($name:ident, $ty:ty, $width:expr) => {
        pub mod $name {
            #[allow(unused)]
            pub const WIDTH: usize = $width;

            pub fn encode(value: $ty) -> [u8; $width] {
                value.to_be_bytes()
            }

            pub fn decode(bytes: &[u8]) -> $ty {
                let mut buf = [0u8; $width];
                buf.copy_from_slice(&bytes[..$width]);
                <$ty>::from_be_bytes(buf)
            }
        }
    };
}

scalar_codec!(u8_codec, u8, 1);
scalar_codec!(u16_codec, u16, 2);
scalar_codec!(u32_codec, u32, 4);
scalar_codec!(u64_codec, u64, 8);
scalar_codec!(i8_codec, i8, 1);
scalar_codec!(i16_codec, i16, 2);
scalar_codec!(i32_codec, i32, 4);
scalar_codec!(i64_codec, i64, 8);
scalar_codec!(f32_codec, f32, 4);
scalar_codec!(f64_codec, f64, 8);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn u32_roundtrip() {
        let bytes = u32_codec::encode(0xdead_beef);
        assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(u32_codec::decode(&bytes), 0xdead_beef);
    }

    #[test]
    fn i64_roundtrip() {
        let v: i64 = -123_456_789;
        let bytes = i64_codec::encode(v);
        assert_eq!(i64_codec::decode(&bytes), v);
    }

    #[test]
    fn f64_roundtrip() {
        let v: f64 = core::f64::consts::PI;
        let bytes = f64_codec::encode(v);
        assert_eq!(f64_codec::decode(&bytes), v);
    }
}
