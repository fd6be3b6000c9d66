use super::value::Scalar;
use crate::dtype::{ElementType, Endianness, TypeClass};
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use half::f16;
use num_complex::Complex;
use std::{fmt, mem};
use thiserror::Error;

/// An error parsing a `bool` from a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseBoolError {
    bad_value: u8,
}

impl std::error::Error for ParseBoolError {}

impl fmt::Display for ParseBoolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error parsing value {:#04x} as a bool", self.bad_value)
    }
}

/// An error decoding elements from raw array bytes.
#[derive(Debug, Error)]
pub enum ReadDataError {
    /// The stored element type does not match the requested one.
    #[error("stored elements are {found}, which cannot be read as {requested}")]
    WrongElementType {
        /// Element type of the Rust type asked for.
        requested: ElementType,
        /// Element type recorded in the array.
        found: ElementType,
    },
    /// An error parsing the booleans.
    #[error("error parsing data: {0}")]
    ParseBool(#[from] ParseBoolError),
}

/// A primitive that maps one-to-one onto an [`ElementType`].
///
/// Every supported primitive states its own descriptor and byte codec.
pub trait Element: Copy + Sized {
    /// The class and width of `Self`, in native byte order.
    fn element_type() -> ElementType;

    /// Decodes one element from exactly `element_type().width` bytes stored
    /// in `endianness` order.
    fn read_bytes(bytes: &[u8], endianness: Endianness) -> Result<Self, ParseBoolError>;

    /// Appends the native-order bytes of `self` to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Wraps `self` in the matching [`Scalar`] variant.
    fn into_scalar(self) -> Scalar;

    /// Decodes a whole buffer of elements tagged with `element_type`.
    fn read_slice(bytes: &[u8], element_type: ElementType) -> Result<Vec<Self>, ReadDataError> {
        let requested = Self::element_type();
        if !requested.same_kind(&element_type) {
            return Err(ReadDataError::WrongElementType { requested, found: element_type });
        }
        bytes
            .chunks_exact(requested.width)
            .map(|chunk| {
                Self::read_bytes(chunk, element_type.endianness).map_err(ReadDataError::from)
            })
            .collect()
    }

    /// Encodes a slice of elements in native byte order.
    fn write_slice(slice: &[Self]) -> Vec<u8> {
        let mut out = Vec::with_capacity(mem::size_of_val(slice));
        for elem in slice {
            elem.write_bytes(&mut out);
        }
        out
    }
}

impl Element for bool {
    fn element_type() -> ElementType {
        ElementType::native(TypeClass::Bool, 1)
    }

    fn read_bytes(bytes: &[u8], _: Endianness) -> Result<Self, ParseBoolError> {
        match bytes[0] {
            0x00 => Ok(false),
            0x01 => Ok(true),
            bad_value => Err(ParseBoolError { bad_value }),
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }
}

impl Element for i8 {
    fn element_type() -> ElementType {
        ElementType::native(TypeClass::Int, 1)
    }

    fn read_bytes(bytes: &[u8], _: Endianness) -> Result<Self, ParseBoolError> {
        Ok(bytes[0] as i8)
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn into_scalar(self) -> Scalar {
        Scalar::I8(self)
    }
}

impl Element for u8 {
    fn element_type() -> ElementType {
        ElementType::native(TypeClass::Uint, 1)
    }

    fn read_bytes(bytes: &[u8], _: Endianness) -> Result<Self, ParseBoolError> {
        Ok(bytes[0])
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn into_scalar(self) -> Scalar {
        Scalar::U8(self)
    }
}

macro_rules! impl_multibyte {
    ($elem:ty, $class:ident, $variant:ident, $read:ident, $write:ident) => {
        impl Element for $elem {
            fn element_type() -> ElementType {
                ElementType::native(TypeClass::$class, mem::size_of::<$elem>())
            }

            fn read_bytes(bytes: &[u8], endianness: Endianness) -> Result<Self, ParseBoolError> {
                Ok(match endianness {
                    Endianness::Little => LittleEndian::$read(bytes),
                    Endianness::Big => BigEndian::$read(bytes),
                    Endianness::Irrelevant => NativeEndian::$read(bytes),
                })
            }

            fn write_bytes(&self, out: &mut Vec<u8>) {
                let mut buf = [0; mem::size_of::<$elem>()];
                NativeEndian::$write(&mut buf, *self);
                out.extend_from_slice(&buf);
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }
    };
}

impl_multibyte!(i16, Int, I16, read_i16, write_i16);
impl_multibyte!(i32, Int, I32, read_i32, write_i32);
impl_multibyte!(i64, Int, I64, read_i64, write_i64);
impl_multibyte!(u16, Uint, U16, read_u16, write_u16);
impl_multibyte!(u32, Uint, U32, read_u32, write_u32);
impl_multibyte!(u64, Uint, U64, read_u64, write_u64);
impl_multibyte!(f32, Float, F32, read_f32, write_f32);
impl_multibyte!(f64, Float, F64, read_f64, write_f64);

impl Element for f16 {
    fn element_type() -> ElementType {
        ElementType::native(TypeClass::Float, 2)
    }

    fn read_bytes(bytes: &[u8], endianness: Endianness) -> Result<Self, ParseBoolError> {
        Ok(f16::from_bits(u16::read_bytes(bytes, endianness)?))
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.to_bits().write_bytes(out);
    }

    fn into_scalar(self) -> Scalar {
        Scalar::F16(self)
    }
}

macro_rules! impl_complex {
    ($float:ty, $variant:ident) => {
        impl Element for Complex<$float> {
            fn element_type() -> ElementType {
                ElementType::native(TypeClass::Complex, 2 * mem::size_of::<$float>())
            }

            fn read_bytes(bytes: &[u8], endianness: Endianness) -> Result<Self, ParseBoolError> {
                let (re, im) = bytes.split_at(mem::size_of::<$float>());
                Ok(Complex::new(
                    <$float>::read_bytes(re, endianness)?,
                    <$float>::read_bytes(im, endianness)?,
                ))
            }

            fn write_bytes(&self, out: &mut Vec<u8>) {
                self.re.write_bytes(out);
                self.im.write_bytes(out);
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }
    };
}

impl_complex!(f32, C64);
impl_complex!(f64, C128);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_byte_orders() {
        let le = ElementType::new(TypeClass::Int, 4, Endianness::Little);
        let be = ElementType::new(TypeClass::Int, 4, Endianness::Big);
        assert_eq!(i32::read_slice(&[1, 0, 0, 0, 0, 1, 0, 0], le).unwrap(), vec![1, 256]);
        assert_eq!(i32::read_slice(&[0, 0, 0, 1, 0, 0, 1, 0], be).unwrap(), vec![1, 256]);
    }

    #[test]
    fn complex_is_real_then_imaginary() {
        let ty = ElementType::new(TypeClass::Complex, 8, Endianness::Little);
        let mut bytes = 1.5f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        assert_eq!(
            Complex::<f32>::read_slice(&bytes, ty).unwrap(),
            vec![Complex::new(1.5, -2.0)]
        );
    }

    #[test]
    fn rejects_bad_bools() {
        let ty = bool::element_type();
        assert_eq!(bool::read_slice(&[0, 1], ty).unwrap(), vec![false, true]);
        assert!(matches!(
            bool::read_slice(&[0, 2], ty),
            Err(ReadDataError::ParseBool(ParseBoolError { bad_value: 2 }))
        ));
    }

    #[test]
    fn rejects_other_kinds() {
        let ty = f64::element_type();
        assert!(matches!(
            i64::read_slice(&[0; 8], ty),
            Err(ReadDataError::WrongElementType { .. })
        ));
    }

    #[test]
    fn native_write_matches_native_read() {
        let values = [f16::from_f32(0.5), f16::from_f32(-3.0)];
        let bytes = f16::write_slice(&values);
        assert_eq!(f16::read_slice(&bytes, f16::element_type()).unwrap(), values);
    }
}
