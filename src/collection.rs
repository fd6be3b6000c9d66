//! Path-level reading and writing of named values.
//!
//! [`read`] looks at the first bytes of a file to decide whether it holds a
//! single `.npy` stream or an `.npz` archive; the file extension is not
//! consulted. Writing to an existing path replaces the file.
use crate::{
    npy::{self, header::MAGIC_STRING, Header, Value},
    npz::{Compression, NpzReader, NpzWriter, ReadNpzError, WriteNpzError},
};
use std::{
    collections::HashSet,
    fs,
    io::{self, BufRead as _, Seek as _},
    path::Path,
};
use thiserror::Error;

/// Two entries of a [`NamedCollection`] share a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate array name {0:?}")]
pub struct DuplicateNameError(pub String);

impl From<DuplicateNameError> for WriteNpzError {
    fn from(err: DuplicateNameError) -> Self {
        Self::DuplicateName(err.0)
    }
}

/// Names mapped to values, kept in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedCollection<T = Value> {
    entries: Vec<(String, T)>,
}

impl<T> Default for NamedCollection<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> NamedCollection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` under `name`, refusing names already present.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<(), DuplicateNameError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(DuplicateNameError(name));
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// Builder form of [`NamedCollection::insert`].
    pub fn with(mut self, name: impl Into<String>, value: T) -> Result<Self, DuplicateNameError> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Removes and returns the value stored under `name`.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns `true` if a value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> IntoIterator for NamedCollection<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The contents of a file read by [`read`] or [`read_header`].
#[derive(Debug, Clone, PartialEq)]
pub enum Contents<T = Value> {
    /// The single value of a bare `.npy` file.
    Npy(T),
    /// The selected members of an `.npz` archive.
    Npz(NamedCollection<T>),
}

impl<T> Contents<T> {
    /// Returns the single value, if the file was a bare `.npy`.
    pub fn into_npy(self) -> Option<T> {
        match self {
            Self::Npy(value) => Some(value),
            Self::Npz(_) => None,
        }
    }

    /// Returns the collection, if the file was an `.npz` archive.
    pub fn into_npz(self) -> Option<NamedCollection<T>> {
        match self {
            Self::Npy(_) => None,
            Self::Npz(collection) => Some(collection),
        }
    }
}

/// Options for [`write_npz_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// How each member is stored.
    pub compression: Compression,
}

enum Kind {
    Npy,
    Npz,
}

/// Zip local file header or end of central directory (empty archive).
const ZIP_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

fn sniff(reader: &mut io::BufReader<fs::File>) -> io::Result<Kind> {
    let head = reader.fill_buf()?;
    if head.starts_with(MAGIC_STRING) {
        Ok(Kind::Npy)
    } else if ZIP_SIGNATURES.iter().any(|sig| head.starts_with(sig)) {
        Ok(Kind::Npz)
    } else {
        // let the npy reader report the bad magic
        Ok(Kind::Npy)
    }
}

fn open(path: &Path) -> Result<(Kind, io::BufReader<fs::File>), ReadNpzError> {
    let mut reader = io::BufReader::new(fs::File::open(path)?);
    let kind = sniff(&mut reader)?;
    reader.rewind()?;
    Ok((kind, reader))
}

fn read_selected<T, F>(
    path: &Path,
    names: Option<&[&str]>,
    read_npy: impl FnOnce(io::BufReader<fs::File>) -> Result<T, ReadNpzError>,
    mut read_member: F,
) -> Result<Contents<T>, ReadNpzError>
where
    F: FnMut(&mut NpzReader<io::BufReader<fs::File>>, &str) -> Result<T, ReadNpzError>,
{
    let (kind, reader) = open(path)?;
    match kind {
        Kind::Npy => {
            if names.is_some_and(|names| !names.is_empty()) {
                log::warn!(
                    "{} is a bare .npy file, ignoring requested names",
                    path.display()
                );
            }
            Ok(Contents::Npy(read_npy(reader)?))
        }
        Kind::Npz => {
            let mut npz = NpzReader::new(reader)?;
            let requested: Vec<String> = match names {
                Some(names) => names.iter().map(|n| n.to_string()).collect(),
                None => npz.names().map(str::to_string).collect(),
            };
            // a name asked for twice, or repeated in a foreign archive, is read once
            let mut seen = HashSet::new();
            let mut collection = NamedCollection::new();
            for name in requested {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let value = read_member(&mut npz, &name)?;
                collection.entries.push((name, value));
            }
            Ok(Contents::Npz(collection))
        }
    }
}

/// Reads every value in the `.npy` or `.npz` file at `path`.
///
/// # Example
///
/// ```no_run
/// use npzio::{read, Contents};
///
/// match read("arrays.npz")? {
///     Contents::Npy(value) => println!("single value {:?}", value.shape()),
///     Contents::Npz(values) => {
///         for (name, value) in values.iter() {
///             println!("{name}: {:?}", value.shape());
///         }
///     }
/// }
/// # Ok::<_, npzio::ReadNpzError>(())
/// ```
pub fn read<P: AsRef<Path>>(path: P) -> Result<Contents, ReadNpzError> {
    read_selected(
        path.as_ref(),
        None,
        |reader| Ok(npy::read_value(reader)?),
        |npz, name| npz.by_name(name),
    )
}

/// Reads only the arrays called `names` from the `.npz` file at `path`.
///
/// Members that are not requested are never decompressed or parsed. A missing
/// name fails with [`ReadNpzError::MemberNotFound`]. If `path` is a bare
/// `.npy` file, `names` is ignored and its single value is returned.
pub fn read_names<P: AsRef<Path>>(path: P, names: &[&str]) -> Result<Contents, ReadNpzError> {
    read_selected(
        path.as_ref(),
        Some(names),
        |reader| Ok(npy::read_value(reader)?),
        |npz, name| npz.by_name(name),
    )
}

/// Reads the headers of every array in the file at `path`, without reading
/// array data.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Contents<Header>, ReadNpzError> {
    read_selected(
        path.as_ref(),
        None,
        |reader| Ok(Header::from_reader(reader)?),
        |npz, name| npz.header_by_name(name),
    )
}

/// Reads the headers of the arrays called `names`. See [`read_names`].
pub fn read_header_names<P: AsRef<Path>>(
    path: P,
    names: &[&str],
) -> Result<Contents<Header>, ReadNpzError> {
    read_selected(
        path.as_ref(),
        Some(names),
        |reader| Ok(Header::from_reader(reader)?),
        |npz, name| npz.header_by_name(name),
    )
}

/// Merges positional and named values the way `numpy.savez` does.
///
/// Positional values are named `arr_0`, `arr_1`, ... in order, then the named
/// values follow. A named value that collides with a positional default fails.
pub fn collect_named(
    positional: impl IntoIterator<Item = Value>,
    named: NamedCollection,
) -> Result<NamedCollection, DuplicateNameError> {
    let mut collection = NamedCollection::new();
    for (index, value) in positional.into_iter().enumerate() {
        collection.insert(format!("arr_{index}"), value)?;
    }
    for (name, value) in named {
        collection.insert(name, value)?;
    }
    Ok(collection)
}

/// Writes `collection` to an uncompressed `.npz` file at `path`.
///
/// This function will create the file if it does not exist, or overwrite it
/// if it does. A collection with one entry is still written as an archive;
/// use [`write_npy`](crate::write_npy) for a bare `.npy` file.
pub fn write_npz<P: AsRef<Path>>(path: P, collection: &NamedCollection) -> Result<(), WriteNpzError> {
    write_npz_with(path, collection, WriteOptions::default())
}

/// Writes `collection` to an `.npz` file at `path` using `options`.
///
/// The whole archive is encoded in memory first, so `path` is left untouched
/// if any entry fails to encode.
pub fn write_npz_with<P: AsRef<Path>>(
    path: P,
    collection: &NamedCollection,
    options: WriteOptions,
) -> Result<(), WriteNpzError> {
    let path = path.as_ref();
    let mut npz = NpzWriter::with_compression(io::Cursor::new(Vec::new()), options.compression);
    for (name, value) in collection.iter() {
        npz.add_value(name, value)?;
    }
    let archive = npz.finish()?.into_inner();
    if path.exists() {
        log::info!("{} exists, replacing", path.display());
    }
    fs::write(path, archive)?;
    Ok(())
}

/// Writes positional values as `arr_0`, `arr_1`, ... together with `named`
/// to an uncompressed `.npz` file at `path`. See [`collect_named`].
pub fn write_npz_args<P: AsRef<Path>>(
    path: P,
    positional: impl IntoIterator<Item = Value>,
    named: NamedCollection,
) -> Result<(), WriteNpzError> {
    let collection = collect_named(positional, named)?;
    write_npz(path, &collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::{Array, Scalar};

    #[test]
    fn default_names_come_first() {
        let named = NamedCollection::new().with("x", Value::from(1u8)).unwrap();
        let merged = collect_named([Value::from(2u8), Value::from(3u8)], named).unwrap();
        assert_eq!(merged.names().collect::<Vec<_>>(), ["arr_0", "arr_1", "x"]);
        assert_eq!(merged.get("arr_1"), Some(&Value::Scalar(Scalar::U8(3))));
    }

    #[test]
    fn default_names_collide_with_explicit_names() {
        let named = NamedCollection::new().with("arr_0", Value::from(1u8)).unwrap();
        let err = collect_named([Value::from(2u8)], named).unwrap_err();
        assert_eq!(err, DuplicateNameError("arr_0".to_string()));
    }

    #[test]
    fn counter_is_local_to_each_call() {
        for _ in 0..2 {
            let merged = collect_named([Value::from(true)], NamedCollection::new()).unwrap();
            assert!(merged.contains("arr_0"));
        }
    }

    #[test]
    fn collection_keeps_insertion_order() {
        let mut c = NamedCollection::new();
        c.insert("b", Value::from(1i32)).unwrap();
        c.insert("a", Array::from_vec(vec![1], vec![2i32]).unwrap().into()).unwrap();
        assert!(c.insert("b", Value::from(3i32)).is_err());
        assert_eq!(c.names().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(c.remove("b"), Some(Value::from(1i32)));
        assert_eq!(c.len(), 1);
    }
}
