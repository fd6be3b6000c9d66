mod elements;
pub mod header;
mod value;

pub use self::{
    elements::{Element, ParseBoolError, ReadDataError},
    header::{
        FormatHeaderError, Header, Order, ParseHeaderError, ReadHeaderError, WriteHeaderError,
    },
    value::{Array, Scalar, ShapeError, Value},
};
use crate::dtype::ElementType;
use std::{
    fs,
    io::{self, Read as _},
    path::Path,
};
use thiserror::Error;

/// Read an `.npy` file located at the specified path.
///
/// This is a convenience function for using `File::open` followed by
/// [`read_value`]. Bytes after the array data are ignored.
pub fn read_npy<P: AsRef<Path>>(path: P) -> Result<Value, ReadNpyError> {
    read_value(io::BufReader::new(fs::File::open(path)?))
}

/// Reads only the header of the `.npy` file at the specified path.
pub fn read_npy_header<P: AsRef<Path>>(path: P) -> Result<Header, ReadNpyError> {
    Ok(Header::from_reader(io::BufReader::new(fs::File::open(path)?))?)
}

/// Writes a value to an `.npy` file at the specified path.
///
/// This function will create the file if it does not exist, or overwrite it if
/// it does. The value is encoded before the file is opened, so an existing
/// file survives an encoding error.
///
/// # Example
///
/// ```no_run
/// use npzio::{write_npy, Array};
/// # use npzio::WriteNpyError;
///
/// let arr = Array::from_vec(vec![2, 3], vec![1i32, 2, 3, 4, 5, 6]).unwrap();
/// write_npy("array.npy", &arr.into())?;
/// # Ok::<_, WriteNpyError>(())
/// ```
pub fn write_npy<P: AsRef<Path>>(path: P, value: &Value) -> Result<(), WriteNpyError> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    write_value(&mut buf, value)?;
    if path.exists() {
        log::info!("{} exists, replacing", path.display());
    }
    fs::write(path, buf)?;
    Ok(())
}

/// Reads one value in `.npy` format from `reader`.
///
/// A zero-dimensional array is returned as [`Value::Scalar`]. Reading stops
/// right after the array data.
pub fn read_value<R: io::Read>(mut reader: R) -> Result<Value, ReadNpyError> {
    let header = Header::from_reader(&mut reader)?;
    let expected = header.data_len().ok_or(ReadNpyError::LengthOverflow)?;
    let mut data = Vec::new();
    reader.take(expected as u64).read_to_end(&mut data)?;
    if data.len() < expected {
        return Err(ReadNpyError::TruncatedData { expected, actual: data.len() });
    }
    if header.shape.is_empty() {
        let scalar = Scalar::from_bytes(&data, header.element_type)
            .ok_or(ReadNpyError::UnsupportedElementType(header.element_type))??;
        return Ok(Value::Scalar(scalar));
    }
    Ok(Value::Array(Array::new(header.element_type, header.shape, header.order, data)))
}

/// Writes `value` to `writer` in `.npy` format.
///
/// Arrays are written in their own [`Order`] without reordering; scalars
/// become zero-dimensional arrays. The writer is flushed before returning.
pub fn write_value<W: io::Write>(writer: W, value: &Value) -> Result<(), WriteNpyError> {
    match value {
        Value::Scalar(scalar) => write_scalar(writer, scalar),
        Value::Array(array) => write_array(writer, array),
    }
}

fn write_scalar<W: io::Write>(mut writer: W, scalar: &Scalar) -> Result<(), WriteNpyError> {
    Header {
        element_type: scalar.element_type(),
        order: Order::C,
        shape: Vec::new(),
    }
    .write(&mut writer)?;
    writer.write_all(&scalar.to_bytes())?;
    writer.flush()?;
    Ok(())
}

fn write_array<W: io::Write>(mut writer: W, array: &Array) -> Result<(), WriteNpyError> {
    let header = Header {
        element_type: array.element_type,
        order: array.order,
        shape: array.shape.clone(),
    };
    let expected = header.data_len().ok_or(WriteNpyError::LengthOverflow)?;
    if expected != array.data.len() {
        return Err(WriteNpyError::DataLength { expected, actual: array.data.len() });
    }
    header.write(&mut writer)?;
    writer.write_all(&array.data)?;
    writer.flush()?;
    Ok(())
}

/// Extension trait for writing values to `.npy` streams.
pub trait WriteNpyExt {
    /// Writes `self` to `writer` in [`.npy`
    /// format](https://numpy.org/doc/stable/reference/generated/numpy.lib.format.html).
    fn write_npy<W: io::Write>(&self, writer: W) -> Result<(), WriteNpyError>;
}

impl WriteNpyExt for Value {
    fn write_npy<W: io::Write>(&self, writer: W) -> Result<(), WriteNpyError> {
        write_value(writer, self)
    }
}

impl WriteNpyExt for Array {
    fn write_npy<W: io::Write>(&self, writer: W) -> Result<(), WriteNpyError> {
        write_array(writer, self)
    }
}

impl WriteNpyExt for Scalar {
    fn write_npy<W: io::Write>(&self, writer: W) -> Result<(), WriteNpyError> {
        write_scalar(writer, self)
    }
}

/// Extension trait for reading values from `.npy` streams.
pub trait ReadNpyExt: Sized {
    /// Reads a value from `reader` in `.npy` format.
    fn read_npy<R: io::Read>(reader: R) -> Result<Self, ReadNpyError>;
}

impl ReadNpyExt for Value {
    fn read_npy<R: io::Read>(reader: R) -> Result<Self, ReadNpyError> {
        read_value(reader)
    }
}

/// An error writing a `.npy` file.
#[derive(Debug, Error)]
pub enum WriteNpyError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error formatting the header.
    #[error("error formatting header: {0}")]
    FormatHeader(FormatHeaderError),
    /// The value's element type has no type descriptor.
    #[error("element type {0} cannot be written")]
    UnsupportedElementType(ElementType),
    /// The array's byte buffer does not match its shape and element type.
    #[error("array data has {actual} bytes, expected {expected}")]
    DataLength {
        /// Byte count implied by the shape and element type.
        expected: usize,
        /// Byte count present.
        actual: usize,
    },
    /// Overflow while computing the length of the array data.
    #[error("overflow computing length from shape")]
    LengthOverflow,
}

impl From<FormatHeaderError> for WriteNpyError {
    fn from(err: FormatHeaderError) -> Self {
        match err {
            FormatHeaderError::UnsupportedElementType(ty) => Self::UnsupportedElementType(ty),
            err => Self::FormatHeader(err),
        }
    }
}

impl From<WriteHeaderError> for WriteNpyError {
    fn from(err: WriteHeaderError) -> Self {
        match err {
            WriteHeaderError::Io(err) => Self::Io(err),
            WriteHeaderError::Format(err) => err.into(),
        }
    }
}

/// An error reading a `.npy` file.
#[derive(Debug, Error)]
pub enum ReadNpyError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error parsing the file header.
    #[error("error parsing header: {0}")]
    ParseHeader(#[from] ParseHeaderError),
    /// An error parsing the booleans.
    #[error("error parsing data: {0}")]
    ParseBool(#[from] ParseBoolError),
    /// Overflow while computing the length of the array (in units of bytes or
    /// the number of elements) from the shape described in the file header.
    #[error("overflow computing length from shape")]
    LengthOverflow,
    /// The file does not contain all the data described in the header.
    #[error("reached EOF after {actual} of {expected} data bytes")]
    TruncatedData {
        /// Byte count described by the header.
        expected: usize,
        /// Byte count available.
        actual: usize,
    },
    /// The header names an element type with no matching scalar.
    #[error("element type {0} has no scalar representation")]
    UnsupportedElementType(ElementType),
}

impl From<ReadHeaderError> for ReadNpyError {
    fn from(err: ReadHeaderError) -> Self {
        match err {
            ReadHeaderError::Io(err) => Self::Io(err),
            ReadHeaderError::Parse(err) => Self::ParseHeader(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{Endianness, TypeClass};
    use half::f16;
    use num_complex::Complex;

    fn roundtrip(value: &Value) -> Value {
        let mut buf = Vec::new();
        write_value(&mut buf, value).unwrap();
        read_value(&buf[..]).unwrap()
    }

    #[test]
    fn arrays_roundtrip_for_every_type() {
        let arrays = [
            Array::from_vec(vec![3], vec![true, false, true]).unwrap(),
            Array::from_vec(vec![2, 2], vec![-1i8, 2, -3, 4]).unwrap(),
            Array::from_vec(vec![2], vec![i16::MIN, i16::MAX]).unwrap(),
            Array::from_vec(vec![1, 3], vec![1i32, -2, 3]).unwrap(),
            Array::from_vec(vec![2], vec![i64::MIN, 7]).unwrap(),
            Array::from_vec(vec![2], vec![0u8, 255]).unwrap(),
            Array::from_vec(vec![2], vec![1u16, 65535]).unwrap(),
            Array::from_vec(vec![2], vec![1u32, u32::MAX]).unwrap(),
            Array::from_vec(vec![2], vec![1u64, u64::MAX]).unwrap(),
            Array::from_vec(vec![2], vec![f16::from_f32(0.5), f16::from_f32(-1.0)]).unwrap(),
            Array::from_vec(vec![2, 1], vec![1.5f32, -0.0]).unwrap(),
            Array::from_vec(vec![2, 3, 1], vec![0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(),
            Array::from_vec(vec![1], vec![Complex::new(1.0f32, 2.0)]).unwrap(),
            Array::from_vec(vec![2], vec![Complex::new(1.0f64, 2.0), Complex::new(-3.0, 0.5)])
                .unwrap(),
            Array::from_vec(vec![0, 4], Vec::<f64>::new()).unwrap(),
        ];
        for array in arrays {
            let value = Value::Array(array);
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn fortran_order_is_kept() {
        let array = Array::from_vec_with_order(vec![2, 3], Order::Fortran, vec![1i32, 4, 2, 5, 3, 6])
            .unwrap();
        let back = roundtrip(&array.clone().into()).into_array().unwrap();
        assert_eq!(back.order, Order::Fortran);
        assert_eq!(back, array);
    }

    #[test]
    fn big_endian_bytes_are_kept() {
        let ty = ElementType::new(TypeClass::Float, 8, Endianness::Big);
        let array = Array::new(ty, vec![1], Order::C, 2.5f64.to_be_bytes().to_vec());
        let back = roundtrip(&array.into()).into_array().unwrap();
        assert_eq!(back.element_type, ty);
        assert_eq!(back.to_vec::<f64>().unwrap(), vec![2.5]);
    }

    #[test]
    fn scalars_are_stripped_of_their_dimension() {
        for scalar in [
            Scalar::Bool(false),
            Scalar::I32(-3),
            Scalar::U8(9),
            Scalar::F32(1.25),
            Scalar::C64(Complex::new(0.0, 1.0)),
        ] {
            assert_eq!(roundtrip(&Value::Scalar(scalar)), Value::Scalar(scalar));
        }
    }

    #[test]
    fn zero_dimensional_array_reads_as_scalar() {
        let array = Array::from_vec(vec![], vec![42i64]).unwrap();
        let mut buf = Vec::new();
        array.write_npy(&mut buf).unwrap();
        assert_eq!(read_value(&buf[..]).unwrap(), Value::Scalar(Scalar::I64(42)));
    }

    #[test]
    fn data_starts_on_a_64_byte_boundary() {
        for shape in [vec![], vec![5], vec![3, 7, 11], vec![1; 40]] {
            let len: usize = shape.iter().product();
            let array = Array::from_vec(shape, vec![1u8; len]).unwrap();
            let mut buf = Vec::new();
            array.write_npy(&mut buf).unwrap();
            let data_start = buf.len() - len;
            assert_eq!(data_start % header::HEADER_DIVISOR, 0);
        }
    }

    #[test]
    fn truncated_data() {
        let array = Array::from_vec(vec![4], vec![1.0f64; 4]).unwrap();
        let mut buf = Vec::new();
        array.write_npy(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read_value(&buf[..]),
            Err(ReadNpyError::TruncatedData { expected: 32, actual: 29 })
        ));
    }

    #[test]
    fn bad_magic() {
        let mut buf = Vec::new();
        Scalar::F64(1.0).write_npy(&mut buf).unwrap();
        buf[0] = b'x';
        assert!(matches!(
            read_value(&buf[..]),
            Err(ReadNpyError::ParseHeader(ParseHeaderError::BadMagic))
        ));
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let array = Array::new(ElementType::native(TypeClass::Int, 4), vec![3], Order::C, vec![0; 8]);
        assert!(matches!(
            write_value(Vec::new(), &array.into()),
            Err(WriteNpyError::DataLength { expected: 12, actual: 8 })
        ));
    }

    #[test]
    fn rejects_unclassifiable_element_types() {
        let ty = ElementType::new(TypeClass::Float, 3, Endianness::Little);
        let array = Array::new(ty, vec![1], Order::C, vec![0; 3]);
        assert!(matches!(
            write_value(Vec::new(), &array.into()),
            Err(WriteNpyError::UnsupportedElementType(t)) if t == ty
        ));
    }

    #[test]
    fn invalid_bool_scalar() {
        let mut buf = Vec::new();
        Scalar::Bool(true).write_npy(&mut buf).unwrap();
        *buf.last_mut().unwrap() = 7;
        assert!(matches!(read_value(&buf[..]), Err(ReadNpyError::ParseBool(_))));
    }
}
