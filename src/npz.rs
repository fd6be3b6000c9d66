//! Reading and writing `.npz` archives.
//!
//! An `.npz` file is a zip archive whose members are `.npy` streams named
//! `<array name>.npy`. Members may be stored or deflated.
use crate::npy::{
    read_value, write_value, Header, ReadHeaderError, ReadNpyError, Value, WriteNpyError,
};
use std::{
    collections::HashSet,
    fs,
    io::{self, Write as _},
    path::Path,
};
use thiserror::Error;
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// Gets the name of the array stored under `file_name` inside an archive.
///
/// Follows numpy: the match is case sensitive, and `None` is returned for
/// members that do not end in `.npy`.
pub fn array_name_from_file_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(".npy")
}

/// Gets the archive member name used for the array called `name`.
pub fn file_name_from_array_name(name: &str) -> String {
    format!("{name}.npy")
}

/// How members are stored in a written archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed, as written by `numpy.savez`.
    #[default]
    Stored,
    /// Deflated, as written by `numpy.savez_compressed`.
    #[cfg(feature = "compressed-npz")]
    Deflated,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Self::Stored => CompressionMethod::Stored,
            #[cfg(feature = "compressed-npz")]
            Self::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// An error writing a `.npz` file.
#[derive(Debug, Error)]
pub enum WriteNpzError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error caused by the zip file.
    #[error("zip file error: {0}")]
    Zip(#[from] ZipError),
    /// An error writing a `.npy` file.
    #[error("error writing npy: {0}")]
    Npy(#[from] WriteNpyError),
    /// Two entries were given the same name.
    #[error("duplicate array name {0:?}")]
    DuplicateName(String),
}

/// Writer for `.npz` files.
///
/// Each value is first encoded into memory so that its size is known when
/// the member's local header is written.
///
/// # Example
///
/// ```
/// use npzio::{Array, NpzReader, NpzWriter, Value};
/// use std::io::Cursor;
///
/// let mut npz = NpzWriter::new(Cursor::new(Vec::new()));
/// npz.add_value("a", &Array::from_vec(vec![2], vec![1i32, 2]).unwrap().into())?;
/// npz.add_value("b", &Value::from(7u8))?;
/// let buf = npz.finish()?;
///
/// let mut npz = NpzReader::new(buf)?;
/// assert_eq!(npz.by_name("b")?, Value::from(7u8));
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub struct NpzWriter<W: io::Write + io::Seek> {
    zip: ZipWriter<W>,
    compression: CompressionMethod,
    names: HashSet<String>,
}

impl<W: io::Write + io::Seek> NpzWriter<W> {
    /// Creates a new `.npz` file without compression. See [`numpy.savez`].
    ///
    /// [`numpy.savez`]: https://numpy.org/doc/stable/reference/generated/numpy.savez.html
    pub fn new(writer: W) -> Self {
        Self::with_compression(writer, Compression::Stored)
    }

    /// Creates a new `.npz` file with compression. See [`numpy.savez_compressed`].
    ///
    /// [`numpy.savez_compressed`]: https://numpy.org/doc/stable/reference/generated/numpy.savez_compressed.html
    #[cfg(feature = "compressed-npz")]
    pub fn new_compressed(writer: W) -> Self {
        Self::with_compression(writer, Compression::Deflated)
    }

    /// Creates a new `.npz` file storing members with `compression`.
    pub fn with_compression(writer: W, compression: Compression) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            compression: compression.method(),
            names: HashSet::new(),
        }
    }

    /// Adds a value to the archive as `<name>.npy`.
    pub fn add_value(&mut self, name: &str, value: &Value) -> Result<(), WriteNpzError> {
        if self.names.contains(name) {
            return Err(WriteNpzError::DuplicateName(name.to_string()));
        }
        let mut buf = Vec::new();
        write_value(&mut buf, value)?;
        let options = SimpleFileOptions::default()
            .compression_method(self.compression)
            .large_file(buf.len() as u64 >= u64::from(u32::MAX));
        self.zip.start_file(file_name_from_array_name(name), options)?;
        self.zip.write_all(&buf)?;
        self.names.insert(name.to_string());
        log::debug!("wrote npz member {name:?} ({} bytes)", buf.len());
        Ok(())
    }

    /// Calls `.finish()` on the zip file and returns the underlying writer.
    pub fn finish(self) -> Result<W, WriteNpzError> {
        Ok(self.zip.finish()?)
    }
}

/// An error reading a `.npz` file.
#[derive(Debug, Error)]
pub enum ReadNpzError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error caused by the zip archive.
    #[error("zip file error: {0}")]
    Zip(#[from] ZipError),
    /// An error reading a `.npy` file.
    #[error("error reading npy: {0}")]
    Npy(#[from] ReadNpyError),
    /// No member holds an array of the requested name.
    #[error("no array named {0:?} in archive")]
    MemberNotFound(String),
}

impl From<ReadHeaderError> for ReadNpzError {
    fn from(err: ReadHeaderError) -> Self {
        Self::Npy(err.into())
    }
}

/// Reader for `.npz` files.
///
/// The reader does not decompress any member until it is asked for by name.
pub struct NpzReader<R: io::Read + io::Seek> {
    zip: ZipArchive<R>,
}

impl NpzReader<io::BufReader<fs::File>> {
    /// Opens the `.npz` file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadNpzError> {
        Self::new(io::BufReader::new(fs::File::open(path)?))
    }
}

impl<R: io::Read + io::Seek> NpzReader<R> {
    /// Creates a new `.npz` file reader from the central directory of `reader`.
    pub fn new(reader: R) -> Result<Self, ReadNpzError> {
        Ok(Self { zip: ZipArchive::new(reader)? })
    }

    /// Returns `true` if the archive has no members.
    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }

    /// Returns the number of members in the archive.
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    /// Names of the arrays in the archive, in central-directory order.
    ///
    /// Every call walks the directory again; member data is not touched.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names().filter_map(array_name_from_file_name)
    }

    /// Opens the member holding `name` as a decompressing byte stream.
    ///
    /// Looks for `<name>.npy` first and then for a member called exactly
    /// `name`.
    pub fn member(&mut self, name: &str) -> Result<impl io::Read + '_, ReadNpzError> {
        let index = self
            .zip
            .index_for_name(&file_name_from_array_name(name))
            .or_else(|| self.zip.index_for_name(name))
            .ok_or_else(|| ReadNpzError::MemberNotFound(name.to_string()))?;
        Ok(self.zip.by_index(index)?)
    }

    /// Reads the array called `name`.
    pub fn by_name(&mut self, name: &str) -> Result<Value, ReadNpzError> {
        let value = read_value(self.member(name)?)?;
        log::debug!("read npz member {name:?}");
        Ok(value)
    }

    /// Reads only the header of the array called `name`.
    pub fn header_by_name(&mut self, name: &str) -> Result<Header, ReadNpzError> {
        Ok(Header::from_reader(self.member(name)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::{ElementType, TypeClass},
        npy::{Array, Order, Scalar},
    };
    use std::io::{Cursor, Read as _};

    fn archive(compression: Compression) -> Vec<u8> {
        let mut npz = NpzWriter::with_compression(Cursor::new(Vec::new()), compression);
        npz.add_value("x", &Array::from_vec(vec![3], vec![1.0f64, 2.0, 3.0]).unwrap().into())
            .unwrap();
        npz.add_value("y", &Scalar::I64(3).into()).unwrap();
        npz.add_value("z", &Array::from_vec(vec![2, 2], vec![1u8, 2, 3, 4]).unwrap().into())
            .unwrap();
        npz.finish().unwrap().into_inner()
    }

    #[test]
    fn lists_names_without_reading_members() {
        let npz = NpzReader::new(Cursor::new(archive(Compression::Stored))).unwrap();
        let mut names: Vec<_> = npz.names().collect();
        names.sort_unstable();
        assert_eq!(names, ["x", "y", "z"]);
        // restartable
        assert_eq!(npz.names().count(), 3);
        assert_eq!(npz.len(), 3);
    }

    #[test]
    fn reads_members_by_name() {
        let mut npz = NpzReader::new(Cursor::new(archive(Compression::Stored))).unwrap();
        assert_eq!(npz.by_name("y").unwrap(), Value::Scalar(Scalar::I64(3)));
        let x = npz.by_name("x").unwrap().into_array().unwrap();
        assert_eq!(x.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(npz.header_by_name("z").unwrap().shape, vec![2, 2]);
    }

    #[cfg(feature = "compressed-npz")]
    #[test]
    fn reads_deflated_members() {
        let mut npz = NpzReader::new(Cursor::new(archive(Compression::Deflated))).unwrap();
        let z = npz.by_name("z").unwrap().into_array().unwrap();
        assert_eq!(z.to_vec::<u8>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn member_streams_are_npy() {
        let mut npz = NpzReader::new(Cursor::new(archive(Compression::Stored))).unwrap();
        let mut bytes = Vec::new();
        npz.member("x").unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
    }

    #[test]
    fn missing_member() {
        let mut npz = NpzReader::new(Cursor::new(archive(Compression::Stored))).unwrap();
        assert!(matches!(
            npz.by_name("w"),
            Err(ReadNpzError::MemberNotFound(name)) if name == "w"
        ));
    }

    #[test]
    fn duplicate_member() {
        let mut npz = NpzWriter::new(Cursor::new(Vec::new()));
        npz.add_value("a", &Scalar::U8(1).into()).unwrap();
        assert!(matches!(
            npz.add_value("a", &Scalar::U8(2).into()),
            Err(WriteNpzError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn name_is_free_after_a_failed_member() {
        let ty = ElementType::native(TypeClass::Float, 8);
        let broken = Array::new(ty, vec![4], Order::C, vec![0; 3]);
        let mut npz = NpzWriter::new(Cursor::new(Vec::new()));
        assert!(matches!(
            npz.add_value("a", &broken.into()),
            Err(WriteNpzError::Npy(WriteNpyError::DataLength { expected: 32, actual: 3 }))
        ));
        npz.add_value("a", &Scalar::F64(1.0).into()).unwrap();
        let mut npz = NpzReader::new(npz.finish().unwrap()).unwrap();
        assert_eq!(npz.by_name("a").unwrap(), Value::from(1.0f64));
    }

    #[test]
    fn file_names() {
        assert_eq!(array_name_from_file_name("arr_0.npy"), Some("arr_0"));
        assert_eq!(array_name_from_file_name("dir/a.b.npy"), Some("dir/a.b"));
        assert_eq!(array_name_from_file_name("readme.txt"), None);
        assert_eq!(array_name_from_file_name("A.NPY"), None);
        assert_eq!(file_name_from_array_name("x"), "x.npy");
    }
}
