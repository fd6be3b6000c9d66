#![doc = include_str!("../README.md")]
//! ## Operate .npy Files
//!
//! - Reading
//!   - [`read_npy`] / [`read_npy_header`] for a path
//!   - [`read_value`] or the [`ReadNpyExt`] extension trait for any reader
//! - Writing
//!   - [`write_npy`] for a path
//!   - [`write_value`] or the [`WriteNpyExt`] extension trait for any writer
//!
//! ## Operate .npz Files
//!
//! - Reading: [`NpzReader`]
//! - Writing: [`NpzWriter`]
//!
//! ## Operate Either
//!
//! - [`read`], [`read_names`], [`read_header`] and [`read_header_names`] detect
//!   the file kind from its first bytes.
//! - [`write_npz`], [`write_npz_with`] and [`write_npz_args`] write a
//!   [`NamedCollection`].
//!
//! ## Values
//!
//! Every entry is a [`Value`]: either a [`Scalar`] or an [`Array`] of raw
//! bytes tagged with an [`ElementType`], a shape and an [`Order`]. Following
//! the file format's convention, zero-dimensional arrays are read back as
//! scalars. Array bytes are kept in the order they are stored in; use
//! [`Array::to_order`] to transpose.
//!
//! ## Limitations
//!
//! - Only boolean, integer, float (16, 32 and 64 bits) and complex element
//!   types are supported. Structured dtypes, strings, datetimes and objects
//!   are rejected with [`ParseDtypeError`].
//! - Headers are written as format version 1.0, or 2.0 when they are too long
//!   for 1.0. Versions 1.0 to 3.0 are read.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs)]

mod collection;
mod dtype;
mod npy;
mod npz;

pub use crate::{
    collection::{
        collect_named, read, read_header, read_header_names, read_names, write_npz,
        write_npz_args, write_npz_with, Contents, DuplicateNameError, NamedCollection,
        WriteOptions,
    },
    dtype::{ElementType, Endianness, ParseDtypeError, TypeClass},
    npy::{
        header::HEADER_DIVISOR, read_npy, read_npy_header, read_value, write_npy, write_value,
        Array, Element, FormatHeaderError, Header, Order, ParseBoolError, ParseHeaderError,
        ReadDataError, ReadHeaderError, ReadNpyError, ReadNpyExt, Scalar, ShapeError,
        WriteHeaderError, WriteNpyError, WriteNpyExt, Value,
    },
    npz::{
        array_name_from_file_name, file_name_from_array_name, Compression, NpzReader, NpzWriter,
        ReadNpzError, WriteNpzError,
    },
};
