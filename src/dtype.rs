//! Element type descriptors.
//!
//! An [`ElementType`] is the codec's view of a `descr` entry in an `.npy`
//! header, such as `'<f8'` or `'|b1'`. It is parsed with [`str::parse`] and
//! formatted with [`std::fmt::Display`]:
//!
//! ```
//! use npzio::{ElementType, Endianness, TypeClass};
//!
//! let ty: ElementType = "<f8".parse()?;
//! assert_eq!(ty, ElementType::new(TypeClass::Float, 8, Endianness::Little));
//! assert_eq!(ty.to_string(), "<f8");
//! # Ok::<_, npzio::ParseDtypeError>(())
//! ```
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Byte order of a multi-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Code `<`.
    Little,
    /// Code `>`.
    Big,
    /// Code `|`. Only valid for single-byte types.
    Irrelevant,
}

impl Endianness {
    /// The byte order of the current machine.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(Self::Little),
            '>' => Some(Self::Big),
            '|' => Some(Self::Irrelevant),
            // "native" is resolved against the element width by the caller
            '=' => Some(Self::native()),
            _ => None,
        }
    }

    const fn as_char(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::Irrelevant => '|',
        }
    }
}

/// The kind of value stored in one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Code `b`.
    Bool,
    /// Code `i`.
    Int,
    /// Code `u`.
    Uint,
    /// Code `f`.
    Float,
    /// Code `c`. Two floats of half the width, real part first.
    Complex,
}

impl TypeClass {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'b' => Some(Self::Bool),
            'i' => Some(Self::Int),
            'u' => Some(Self::Uint),
            'f' => Some(Self::Float),
            'c' => Some(Self::Complex),
            _ => None,
        }
    }

    const fn as_char(self) -> char {
        match self {
            Self::Bool => 'b',
            Self::Int => 'i',
            Self::Uint => 'u',
            Self::Float => 'f',
            Self::Complex => 'c',
        }
    }

    /// Byte widths this class can be stored with.
    pub const fn valid_widths(self) -> &'static [usize] {
        match self {
            Self::Bool => &[1],
            Self::Int | Self::Uint => &[1, 2, 4, 8],
            Self::Float => &[2, 4, 8],
            Self::Complex => &[8, 16],
        }
    }
}

/// Class, width and byte order of an array element.
///
/// Values built with [`ElementType::new`] are not checked; use
/// [`ElementType::is_valid`] or parse a descriptor string to get a checked
/// value. Writing an invalid element type fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    /// Kind of value.
    pub class: TypeClass,
    /// Number of bytes per element.
    pub width: usize,
    /// Byte order of the element.
    pub endianness: Endianness,
}

impl ElementType {
    /// Creates an element type from its parts.
    pub const fn new(class: TypeClass, width: usize, endianness: Endianness) -> Self {
        Self { class, width, endianness }
    }

    /// Creates an element type in the byte order of the current machine,
    /// using `|` for single-byte types.
    pub const fn native(class: TypeClass, width: usize) -> Self {
        let endianness = if width == 1 {
            Endianness::Irrelevant
        } else {
            Endianness::native()
        };
        Self { class, width, endianness }
    }

    /// Returns `true` if the width is legal for the class and the byte order
    /// is `|` exactly when the width is one byte.
    pub fn is_valid(&self) -> bool {
        self.class.valid_widths().contains(&self.width)
            && (self.width == 1) == (self.endianness == Endianness::Irrelevant)
    }

    /// Returns `true` if the stored byte order differs from the machine's.
    pub fn is_byte_swapped(&self) -> bool {
        self.endianness != Endianness::Irrelevant && self.endianness != Endianness::native()
    }

    /// Returns `true` if `other` has the same class and width, ignoring
    /// byte order.
    pub fn same_kind(&self, other: &Self) -> bool {
        self.class == other.class && self.width == other.width
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.endianness.as_char(), self.class.as_char(), self.width)
    }
}

/// Error parsing a type descriptor.
///
/// Every variant means the descriptor names a dtype this crate does not
/// support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDtypeError {
    /// The descriptor is not of the form `<endian><class><width>`.
    #[error("invalid type descriptor {0:?}")]
    Syntax(String),
    /// The class character is not one of `b`, `i`, `u`, `f`, `c`.
    #[error("unsupported type class {class:?} in descriptor {descr:?}")]
    UnknownClass {
        /// The whole descriptor.
        descr: String,
        /// The offending class character.
        class: char,
    },
    /// The width is not legal for the class.
    #[error("unsupported width {width} in descriptor {descr:?}, expected one of {valid:?}")]
    InvalidWidth {
        /// The whole descriptor.
        descr: String,
        /// The offending width.
        width: usize,
        /// The widths the class accepts.
        valid: &'static [usize],
    },
    /// A multi-byte type was given `|` byte order.
    #[error("descriptor {0:?} needs an explicit byte order")]
    MissingEndianness(String),
    /// Structured (record) dtypes are rejected outright.
    #[error("structured dtypes are not supported: {0}")]
    Structured(String),
}

impl FromStr for ElementType {
    type Err = ParseDtypeError;

    fn from_str(descr: &str) -> Result<Self, ParseDtypeError> {
        if descr.contains(',') {
            return Err(ParseDtypeError::Structured(descr.to_string()));
        }
        let syntax = || ParseDtypeError::Syntax(descr.to_string());
        let mut chars = descr.chars();
        let endianness = chars.next().and_then(Endianness::from_char).ok_or_else(syntax)?;
        let class_char = chars.next().ok_or_else(syntax)?;
        let class = TypeClass::from_char(class_char).ok_or_else(|| {
            ParseDtypeError::UnknownClass { descr: descr.to_string(), class: class_char }
        })?;
        let width_str = chars.as_str();
        if width_str.is_empty() || !width_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(syntax());
        }
        // overflow is reported as a width the class cannot take
        let width = width_str.parse().unwrap_or(usize::MAX);
        if !class.valid_widths().contains(&width) {
            return Err(ParseDtypeError::InvalidWidth {
                descr: descr.to_string(),
                width,
                valid: class.valid_widths(),
            });
        }
        let endianness = match (width, endianness) {
            (1, _) => Endianness::Irrelevant,
            (_, Endianness::Irrelevant) => {
                return Err(ParseDtypeError::MissingEndianness(descr.to_string()))
            }
            (_, e) => e,
        };
        Ok(Self { class, width, endianness })
    }
}
