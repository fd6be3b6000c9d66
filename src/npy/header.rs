use crate::dtype::{ElementType, ParseDtypeError};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use num_traits::ToPrimitive;
use py_literal::{
    FormatError as PyValueFormatError, ParseError as PyValueParseError, Value as PyValue,
};
use std::{
    convert::TryFrom,
    fmt,
    io::{self, Read as _},
};
use thiserror::Error;

/// Magic string to indicate npy format.
pub(crate) const MAGIC_STRING: &[u8] = b"\x93NUMPY";

/// The total header length (including magic string, version number, header
/// length value, array format description, padding, and final newline) must be
/// evenly divisible by this value.
pub const HEADER_DIVISOR: usize = 64;

/// An error parsing the header of a `.npy` file.
#[derive(Debug, Error)]
pub enum ParseHeaderError {
    /// The start of the file does not match the magic string.
    #[error("start does not match magic string")]
    BadMagic,
    /// The version number is not recognized.
    #[error("unsupported version number: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version number.
        major: u8,
        /// Minor version number.
        minor: u8,
    },
    /// Indicates that the `HEADER_LEN` doesn't fit in `usize`.
    #[error("HEADER_LEN {0} does not fit in `usize`")]
    HeaderLengthOverflow(u32),
    /// Indicates that the array format string contains non-ASCII characters.
    /// This is an error for .npy format versions 1.0 and 2.0.
    #[error("non-ascii in array format string; this is not supported in .npy format versions 1.0 and 2.0")]
    NonAscii,
    /// Error parsing the array format string as UTF-8. This does not apply to
    /// .npy format versions 1.0 and 2.0, which require the array format string
    /// to be ASCII.
    #[error("error parsing array format string as UTF-8: {0}")]
    Utf8Parse(#[from] std::str::Utf8Error),
    /// An unknown key was found in the metadata dictionary.
    #[error("unknown key: {0}")]
    UnknownKey(PyValue),
    /// A required key was missing from the metadata dictionary.
    #[error("missing key: {0}")]
    MissingKey(&'static str),
    /// An illegal value was found for a key in the metadata dictionary.
    #[error("illegal value for key {key}: {value}")]
    IllegalValue {
        /// The key for which the value was illegal.
        key: &'static str,
        /// The illegal value.
        value: PyValue,
    },
    /// Error parsing the metadata dictionary.
    #[error("error parsing metadata dict: {0}")]
    DictParse(#[from] PyValueParseError),
    /// The metadata is not a dictionary.
    #[error("metadata is not a dict: {0}")]
    MetaNotDict(PyValue),
    /// The header is missing a newline at the end.
    #[error("newline missing at end of header")]
    MissingNewline,
    /// The `descr` value names an unsupported dtype.
    #[error("unsupported dtype: {0}")]
    Dtype(#[from] ParseDtypeError),
}

impl ParseHeaderError {
    /// Returns `true` if the prologue was recognized but the dictionary text
    /// could not be turned into a header.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            Self::BadMagic | Self::UnsupportedVersion { .. } | Self::Dtype(_)
        )
    }
}

/// An error reading a header from a stream.
#[derive(Debug, Error)]
pub enum ReadHeaderError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error parsing the header.
    #[error("error parsing header: {0}")]
    Parse(#[from] ParseHeaderError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
enum Version {
    V1_0,
    V2_0,
    V3_0,
}

impl Version {
    /// Number of bytes taken up by version number (1 byte for major version, 1
    /// byte for minor version).
    const VERSION_NUM_BYTES: usize = 2;

    fn from_array(bytes: [u8; Self::VERSION_NUM_BYTES]) -> Result<Self, ParseHeaderError> {
        match bytes {
            [0x01, 0x00] => Ok(Version::V1_0),
            [0x02, 0x00] => Ok(Version::V2_0),
            [0x03, 0x00] => Ok(Version::V3_0),
            [major, minor] => Err(ParseHeaderError::UnsupportedVersion { major, minor }),
        }
    }

    const fn major_version(self) -> u8 {
        match self {
            Version::V1_0 => 1,
            Version::V2_0 => 2,
            Version::V3_0 => 3,
        }
    }

    const fn minor_version(self) -> u8 {
        0
    }

    /// Number of bytes in representation of header length.
    const fn header_len_num_bytes(self) -> usize {
        match self {
            Version::V1_0 => 2,
            Version::V2_0 | Version::V3_0 => 4,
        }
    }

    fn read_header_len<R: io::Read>(self, mut reader: R) -> Result<usize, ReadHeaderError> {
        match self {
            Version::V1_0 => Ok(usize::from(reader.read_u16::<LittleEndian>()?)),
            Version::V2_0 | Version::V3_0 => {
                let header_len: u32 = reader.read_u32::<LittleEndian>()?;
                Ok(usize::try_from(header_len)
                    .map_err(|_| ParseHeaderError::HeaderLengthOverflow(header_len))?)
            }
        }
    }

    /// Format header length as bytes for writing to file.
    ///
    /// Returns `None` if the value of `header_len` is too large for this .npy
    /// version.
    fn format_header_len(self, header_len: usize) -> Option<Vec<u8>> {
        let mut out = vec![0; self.header_len_num_bytes()];
        match self {
            Version::V1_0 => LittleEndian::write_u16(&mut out, u16::try_from(header_len).ok()?),
            Version::V2_0 | Version::V3_0 => {
                LittleEndian::write_u32(&mut out, u32::try_from(header_len).ok()?)
            }
        }
        Some(out)
    }

    /// Computes the total header length, formatted `HEADER_LEN` value, and
    /// padding length for this .npy version.
    ///
    /// Returns `None` if the total header length overflows `usize` or if the
    /// value of `HEADER_LEN` is too large for this .npy version.
    fn compute_lengths(self, unpadded_arr_format: &[u8]) -> Option<HeaderLengthInfo> {
        const NEWLINE_LEN: usize = b"\n".len();

        let prefix_len =
            MAGIC_STRING.len() + Version::VERSION_NUM_BYTES + self.header_len_num_bytes();
        let unpadded_total_len = prefix_len
            .checked_add(unpadded_arr_format.len())?
            .checked_add(NEWLINE_LEN)?;
        let padding_len = HEADER_DIVISOR - unpadded_total_len % HEADER_DIVISOR;
        let total_len = unpadded_total_len.checked_add(padding_len)?;
        let header_len = total_len - prefix_len;
        let formatted_header_len = self.format_header_len(header_len)?;
        Some(HeaderLengthInfo { total_len, formatted_header_len })
    }
}

struct HeaderLengthInfo {
    /// Total header length (including magic string, version number, header
    /// length value, array format description, padding, and final newline).
    total_len: usize,
    /// Formatted `HEADER_LEN` value.
    formatted_header_len: Vec<u8>,
}

/// An error turning a [`Header`] into bytes.
#[derive(Debug, Error)]
pub enum FormatHeaderError {
    /// Error formatting the metadata dictionary.
    #[error("error formatting Python value: {0}")]
    PyValue(#[from] PyValueFormatError),
    /// The total header length overflows `usize`, or `HEADER_LEN` exceeds the
    /// maximum encodable value.
    #[error("the header is too long")]
    HeaderTooLong,
    /// The element type cannot be described by a type descriptor.
    #[error("element type {0} cannot be written")]
    UnsupportedElementType(ElementType),
}

/// An error writing a header to a stream.
#[derive(Debug, Error)]
pub enum WriteHeaderError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error formatting the header.
    #[error("error formatting header: {0}")]
    Format(#[from] FormatHeaderError),
}

/// Memory layout of a multi-dimensional array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Row-major, the last index varies fastest.
    #[default]
    C,
    /// Column-major, the first index varies fastest.
    Fortran,
}

impl Order {
    /// The other layout.
    pub const fn reversed(self) -> Self {
        match self {
            Self::C => Self::Fortran,
            Self::Fortran => Self::C,
        }
    }
}

/// The parsed prologue of an `.npy` stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Type of each element.
    pub element_type: ElementType,
    /// Layout of the data following the header.
    pub order: Order,
    /// Axis lengths. Empty for a zero-dimensional array.
    pub shape: Vec<usize>,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        self.to_py_value().fmt(f)
    }
}

impl Header {
    /// Number of elements described by the shape, or `None` on overflow.
    pub fn num_elements(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &len| acc.checked_mul(len))
    }

    /// Number of data bytes following the header, or `None` on overflow.
    pub fn data_len(&self) -> Option<usize> {
        self.num_elements()?.checked_mul(self.element_type.width)
    }

    fn from_py_value(value: PyValue) -> Result<Self, ParseHeaderError> {
        let dict = match value {
            PyValue::Dict(dict) => dict,
            value => return Err(ParseHeaderError::MetaNotDict(value)),
        };
        let mut element_type = None;
        let mut order = None;
        let mut shape = None;
        for (key, value) in dict {
            match &key {
                PyValue::String(k) if k == "descr" => match value {
                    PyValue::String(descr) => element_type = Some(descr.parse()?),
                    PyValue::List(_) => {
                        return Err(ParseDtypeError::Structured(value.to_string()).into())
                    }
                    _ => return Err(ParseHeaderError::IllegalValue { key: "descr", value }),
                },
                PyValue::String(k) if k == "fortran_order" => {
                    if let PyValue::Boolean(b) = value {
                        order = Some(if b { Order::Fortran } else { Order::C });
                    } else {
                        return Err(ParseHeaderError::IllegalValue { key: "fortran_order", value });
                    }
                }
                PyValue::String(k) if k == "shape" => {
                    fn parse_shape(value: &PyValue) -> Option<Vec<usize>> {
                        value
                            .as_tuple()?
                            .iter()
                            .map(|elem| elem.as_integer()?.to_usize())
                            .collect()
                    }
                    if let Some(s) = parse_shape(&value) {
                        shape = Some(s);
                    } else {
                        return Err(ParseHeaderError::IllegalValue { key: "shape", value });
                    }
                }
                _ => return Err(ParseHeaderError::UnknownKey(key)),
            }
        }
        let element_type = element_type.ok_or(ParseHeaderError::MissingKey("descr"))?;
        let order = order.ok_or(ParseHeaderError::MissingKey("fortran_order"))?;
        let shape = shape.ok_or(ParseHeaderError::MissingKey("shape"))?;
        Ok(Self { element_type, order, shape })
    }

    /// Reads the header from the start of an `.npy` stream, leaving `reader`
    /// positioned at the first data byte.
    pub fn from_reader<R: io::Read>(mut reader: R) -> Result<Self, ReadHeaderError> {
        let mut buf = [0; MAGIC_STRING.len()];
        reader.read_exact(&mut buf)?;
        if buf != MAGIC_STRING {
            Err(ParseHeaderError::BadMagic)?;
        }

        let mut buf = [0; Version::VERSION_NUM_BYTES];
        reader.read_exact(&mut buf)?;
        let version = Version::from_array(buf)?;

        let header_len = version.read_header_len(&mut reader)?;

        // Parse the dictionary describing the array's format
        let mut buf = Vec::new();
        reader.by_ref().take(header_len as u64).read_to_end(&mut buf)?;
        if buf.len() < header_len {
            Err(io::Error::from(io::ErrorKind::UnexpectedEof))?;
        }
        let without_newline = match buf.split_last() {
            Some((&b'\n', rest)) => rest,
            Some(_) | None => Err(ParseHeaderError::MissingNewline)?,
        };
        let header_str = match version {
            Version::V1_0 | Version::V2_0 => {
                if !without_newline.is_ascii() {
                    Err(ParseHeaderError::NonAscii)?;
                }
                std::str::from_utf8(without_newline).map_err(ParseHeaderError::from)?
            }
            Version::V3_0 => {
                std::str::from_utf8(without_newline).map_err(ParseHeaderError::from)?
            }
        };
        let arr_format = header_str.parse().map_err(ParseHeaderError::from)?;
        let header = Self::from_py_value(arr_format)?;
        log::debug!(
            "read npy {}.{} header: descr {}, shape {:?}, {:?} order",
            version.major_version(),
            version.minor_version(),
            header.element_type,
            header.shape,
            header.order,
        );
        Ok(header)
    }

    fn to_py_value(&self) -> PyValue {
        PyValue::Dict(vec![
            (
                PyValue::String("descr".to_string()),
                PyValue::String(self.element_type.to_string()),
            ),
            (
                PyValue::String("fortran_order".to_string()),
                PyValue::Boolean(self.order == Order::Fortran),
            ),
            (
                PyValue::String("shape".to_string()),
                PyValue::Tuple(
                    self.shape
                        .iter()
                        .map(|&elem| PyValue::Integer(elem.into()))
                        .collect(),
                ),
            ),
        ])
    }

    /// Serializes the header, padded so that its length is a multiple of
    /// [`HEADER_DIVISOR`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatHeaderError> {
        if !self.element_type.is_valid() {
            return Err(FormatHeaderError::UnsupportedElementType(self.element_type));
        }

        // Metadata describing array's format as ASCII string
        let mut arr_format = Vec::new();
        self.to_py_value().write_ascii(&mut arr_format)?;

        // Version 1.0 unless HEADER_LEN no longer fits in two bytes
        let (version, length_info) = [Version::V1_0, Version::V2_0]
            .iter()
            .find_map(|&version| Some((version, version.compute_lengths(&arr_format)?)))
            .ok_or(FormatHeaderError::HeaderTooLong)?;

        let mut out = Vec::with_capacity(length_info.total_len);
        out.extend_from_slice(MAGIC_STRING);
        out.push(version.major_version());
        out.push(version.minor_version());
        out.extend_from_slice(&length_info.formatted_header_len);
        out.extend_from_slice(&arr_format);
        out.resize(length_info.total_len - 1, b' ');
        out.push(b'\n');

        debug_assert_eq!(out.len(), length_info.total_len);
        debug_assert_eq!(out.len() % HEADER_DIVISOR, 0);

        log::debug!(
            "formatted npy {}.{} header of {} bytes for {}",
            version.major_version(),
            version.minor_version(),
            out.len(),
            self,
        );
        Ok(out)
    }

    /// Writes the header to `writer`.
    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), WriteHeaderError> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{Endianness, TypeClass};

    fn header(shape: Vec<usize>) -> Header {
        Header {
            element_type: ElementType::new(TypeClass::Float, 8, Endianness::Little),
            order: Order::C,
            shape,
        }
    }

    fn raw_header(version: [u8; 2], dict: &str) -> Vec<u8> {
        let mut text = format!("{dict}\n").into_bytes();
        let mut out = MAGIC_STRING.to_vec();
        out.extend_from_slice(&version);
        if version[0] == 1 {
            out.extend_from_slice(&(text.len() as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        }
        out.append(&mut text);
        out
    }

    #[test]
    fn roundtrip_through_bytes() {
        for shape in [vec![], vec![0], vec![3], vec![2, 3, 4]] {
            let h = header(shape);
            let bytes = h.to_bytes().unwrap();
            assert_eq!(bytes.len() % HEADER_DIVISOR, 0);
            assert_eq!(Header::from_reader(&bytes[..]).unwrap(), h);
        }
    }

    #[test]
    fn writes_version_1_with_spaces_and_newline() {
        let bytes = header(vec![2, 3]).to_bytes().unwrap();
        assert_eq!(&bytes[..6], MAGIC_STRING);
        assert_eq!(&bytes[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!(header_len + 10, bytes.len());
        assert_eq!(bytes.last(), Some(&b'\n'));
        let text = std::str::from_utf8(&bytes[10..]).unwrap();
        assert!(text.starts_with('{'));
        assert!(text.contains("<f8"));
        assert!(text.contains("False"));
        assert!(text.trim_end_matches('\n').ends_with(' '));
    }

    #[test]
    fn upgrades_to_version_2_for_long_headers() {
        let bytes = header(vec![1; 20_000]).to_bytes().unwrap();
        assert_eq!(&bytes[6..8], &[2, 0]);
        assert_eq!(bytes.len() % HEADER_DIVISOR, 0);
        let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(header_len as usize + 12, bytes.len());
        assert_eq!(Header::from_reader(&bytes[..]).unwrap().shape.len(), 20_000);
    }

    #[test]
    fn reads_version_3() {
        let bytes = raw_header([3, 0], "{'descr': '<i4', 'fortran_order': True, 'shape': (5,)}");
        let h = Header::from_reader(&bytes[..]).unwrap();
        assert_eq!(h.order, Order::Fortran);
        assert_eq!(h.shape, vec![5]);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = header(vec![1]).to_bytes().unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Header::from_reader(&bytes[..]),
            Err(ReadHeaderError::Parse(ParseHeaderError::BadMagic))
        ));
    }

    #[test]
    fn unsupported_version() {
        let bytes = raw_header([4, 0], "{}");
        assert!(matches!(
            Header::from_reader(&bytes[..]),
            Err(ReadHeaderError::Parse(ParseHeaderError::UnsupportedVersion { major: 4, minor: 0 }))
        ));
    }

    #[test]
    fn malformed_dicts() {
        let cases = [
            "{'descr': '<f8', 'fortran_order': False}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (-1,)}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (1.5,)}",
            "{'descr': '<f8', 'fortran_order': 0, 'shape': ()}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (), 'extra': 1}",
            "['descr', 'fortran_order', 'shape']",
            "{'descr': '<f8', 'fortran_order'",
        ];
        for dict in cases {
            let bytes = raw_header([1, 0], dict);
            match Header::from_reader(&bytes[..]) {
                Err(ReadHeaderError::Parse(err)) => assert!(err.is_malformed(), "{dict}: {err}"),
                other => panic!("{dict}: expected parse error, got {other:?}"),
            }
        }
    }

    #[test]
    fn structured_descr_is_rejected() {
        let bytes = raw_header(
            [1, 0],
            "{'descr': [('a', '<i4'), ('b', '<f8')], 'fortran_order': False, 'shape': (2,)}",
        );
        assert!(matches!(
            Header::from_reader(&bytes[..]),
            Err(ReadHeaderError::Parse(ParseHeaderError::Dtype(ParseDtypeError::Structured(_))))
        ));
    }

    #[test]
    fn missing_newline() {
        let mut bytes = raw_header([1, 0], "{'descr': '<f8', 'fortran_order': False, 'shape': ()}");
        *bytes.last_mut().unwrap() = b' ';
        assert!(matches!(
            Header::from_reader(&bytes[..]),
            Err(ReadHeaderError::Parse(ParseHeaderError::MissingNewline))
        ));
    }

    #[test]
    fn invalid_element_type_is_not_written() {
        let h = Header {
            element_type: ElementType::new(TypeClass::Bool, 8, Endianness::Little),
            order: Order::C,
            shape: vec![],
        };
        assert!(matches!(h.to_bytes(), Err(FormatHeaderError::UnsupportedElementType(_))));
    }
}
