//! Values read from and written to `.npy` streams.
use super::{
    elements::{Element, ParseBoolError, ReadDataError},
    header::Order,
};
use crate::dtype::{ElementType, TypeClass};
use half::f16;
use num_complex::Complex;
use thiserror::Error;

/// A single element, the decoded form of a zero-dimensional array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// `|b1`
    Bool(bool),
    /// `|i1`
    I8(i8),
    /// `i2`
    I16(i16),
    /// `i4`
    I32(i32),
    /// `i8`
    I64(i64),
    /// `|u1`
    U8(u8),
    /// `u2`
    U16(u16),
    /// `u4`
    U32(u32),
    /// `u8`
    U64(u64),
    /// `f2`
    F16(f16),
    /// `f4`
    F32(f32),
    /// `f8`
    F64(f64),
    /// `c8`
    C64(Complex<f32>),
    /// `c16`
    C128(Complex<f64>),
}

macro_rules! dispatch_scalar {
    ($scalar:expr, $v:ident => $body:expr) => {
        match $scalar {
            Scalar::Bool($v) => $body,
            Scalar::I8($v) => $body,
            Scalar::I16($v) => $body,
            Scalar::I32($v) => $body,
            Scalar::I64($v) => $body,
            Scalar::U8($v) => $body,
            Scalar::U16($v) => $body,
            Scalar::U32($v) => $body,
            Scalar::U64($v) => $body,
            Scalar::F16($v) => $body,
            Scalar::F32($v) => $body,
            Scalar::F64($v) => $body,
            Scalar::C64($v) => $body,
            Scalar::C128($v) => $body,
        }
    };
}

/// Calls `$f::<T>($args)` with the Rust type `T` matching `$ty`, or evaluates
/// to `None` if no type matches.
macro_rules! with_element_type {
    ($ty:expr, $f:ident($($args:expr),*)) => {
        match ($ty.class, $ty.width) {
            (TypeClass::Bool, 1) => Some($f::<bool>($($args),*)),
            (TypeClass::Int, 1) => Some($f::<i8>($($args),*)),
            (TypeClass::Int, 2) => Some($f::<i16>($($args),*)),
            (TypeClass::Int, 4) => Some($f::<i32>($($args),*)),
            (TypeClass::Int, 8) => Some($f::<i64>($($args),*)),
            (TypeClass::Uint, 1) => Some($f::<u8>($($args),*)),
            (TypeClass::Uint, 2) => Some($f::<u16>($($args),*)),
            (TypeClass::Uint, 4) => Some($f::<u32>($($args),*)),
            (TypeClass::Uint, 8) => Some($f::<u64>($($args),*)),
            (TypeClass::Float, 2) => Some($f::<f16>($($args),*)),
            (TypeClass::Float, 4) => Some($f::<f32>($($args),*)),
            (TypeClass::Float, 8) => Some($f::<f64>($($args),*)),
            (TypeClass::Complex, 8) => Some($f::<Complex<f32>>($($args),*)),
            (TypeClass::Complex, 16) => Some($f::<Complex<f64>>($($args),*)),
            _ => None,
        }
    };
}

fn decode_scalar<T: Element>(bytes: &[u8], ty: ElementType) -> Result<Scalar, ParseBoolError> {
    Ok(T::read_bytes(bytes, ty.endianness)?.into_scalar())
}

impl Scalar {
    /// The element type of this scalar, in native byte order.
    pub fn element_type(&self) -> ElementType {
        fn of<T: Element>(_: &T) -> ElementType {
            T::element_type()
        }
        dispatch_scalar!(self, v => of(v))
    }

    /// Native-order bytes of this scalar.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        dispatch_scalar!(self, v => v.write_bytes(&mut out));
        out
    }

    /// Decodes one element of type `ty` from `bytes`.
    ///
    /// Returns `None` if no Rust type matches `ty`.
    pub(crate) fn from_bytes(
        bytes: &[u8],
        ty: ElementType,
    ) -> Option<Result<Self, ParseBoolError>> {
        with_element_type!(ty, decode_scalar(bytes, ty))
    }
}

macro_rules! impl_from_element {
    ($($elem:ty),*) => {
        $(
            impl From<$elem> for Scalar {
                fn from(value: $elem) -> Self {
                    value.into_scalar()
                }
            }

            impl From<$elem> for Value {
                fn from(value: $elem) -> Self {
                    Value::Scalar(value.into_scalar())
                }
            }
        )*
    };
}

impl_from_element!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f16,
    f32,
    f64,
    Complex<f32>,
    Complex<f64>
);

/// The shape and element count of an [`Array`] disagree.
#[derive(Debug, Error)]
#[error("shape {shape:?} holds {expected} elements but {actual} were given")]
pub struct ShapeError {
    /// The requested shape.
    pub shape: Vec<usize>,
    /// Element count implied by the shape.
    pub expected: usize,
    /// Element count supplied.
    pub actual: usize,
}

/// An owned n-dimensional array of raw element bytes.
///
/// The bytes are always laid out in `order`; reading and writing never
/// reorder them. Use [`Array::to_order`] to transpose explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    /// Type of each element.
    pub element_type: ElementType,
    /// Axis lengths.
    pub shape: Vec<usize>,
    /// Layout of `data`.
    pub order: Order,
    /// Element bytes in `element_type` byte order.
    pub data: Vec<u8>,
}

impl Array {
    /// Creates an array from raw parts without checking them.
    pub fn new(element_type: ElementType, shape: Vec<usize>, order: Order, data: Vec<u8>) -> Self {
        Self { element_type, shape, order, data }
    }

    /// Creates a row-major array from elements in row-major order.
    pub fn from_vec<T: Element>(shape: Vec<usize>, elements: Vec<T>) -> Result<Self, ShapeError> {
        Self::from_vec_with_order(shape, Order::C, elements)
    }

    /// Creates an array from elements already laid out in `order`.
    pub fn from_vec_with_order<T: Element>(
        shape: Vec<usize>,
        order: Order,
        elements: Vec<T>,
    ) -> Result<Self, ShapeError> {
        let expected = shape.iter().product();
        if expected != elements.len() {
            return Err(ShapeError { shape, expected, actual: elements.len() });
        }
        Ok(Self {
            element_type: T::element_type(),
            shape,
            order,
            data: T::write_slice(&elements),
        })
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns `true` if any axis has length zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Decodes the elements in storage order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, ReadDataError> {
        T::read_slice(&self.data, self.element_type)
    }

    /// Returns a copy of the array with its data laid out in `order`.
    ///
    /// An array whose data length disagrees with its shape is returned
    /// unchanged, still tagged with its own order.
    pub fn to_order(&self, order: Order) -> Self {
        if order == self.order {
            return self.clone();
        }
        match reorder(&self.data, &self.shape, self.element_type.width, self.order) {
            Some(data) => Self {
                element_type: self.element_type,
                shape: self.shape.clone(),
                order,
                data,
            },
            None => self.clone(),
        }
    }
}

/// Strides in elements of an array of `shape` laid out in `order`.
fn strides(shape: &[usize], order: Order) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut acc = 1;
    let mut assign = |axis: usize| {
        strides[axis] = acc;
        acc *= shape[axis];
    };
    match order {
        Order::C => (0..shape.len()).rev().for_each(&mut assign),
        Order::Fortran => (0..shape.len()).for_each(&mut assign),
    }
    strides
}

/// Transposes `data` from `from` order into the other order, or returns
/// `None` if `data` does not hold exactly `shape` elements of `width` bytes.
fn reorder(data: &[u8], shape: &[usize], width: usize, from: Order) -> Option<Vec<u8>> {
    let len = shape.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))?;
    if data.len() != len.checked_mul(width)? {
        return None;
    }
    if shape.len() < 2 || len == 0 {
        return Some(data.to_vec());
    }
    let src_strides = strides(shape, from);
    let mut out = Vec::with_capacity(data.len());
    // target order's fastest axis first
    let axes: Vec<usize> = match from.reversed() {
        Order::C => (0..shape.len()).rev().collect(),
        Order::Fortran => (0..shape.len()).collect(),
    };
    let mut index = vec![0; shape.len()];
    for _ in 0..len {
        let offset: usize = index.iter().zip(&src_strides).map(|(i, s)| i * s).sum();
        out.extend_from_slice(&data[offset * width..(offset + 1) * width]);
        for &axis in &axes {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Some(out)
}

/// A named entry of an `.npy` or `.npz` file.
///
/// Zero-dimensional arrays are read as [`Value::Scalar`], and scalars are
/// written as zero-dimensional arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A bare element.
    Scalar(Scalar),
    /// An array with at least one axis.
    Array(Array),
}

impl Value {
    /// Element type of the value.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Scalar(s) => s.element_type(),
            Self::Array(a) => a.element_type,
        }
    }

    /// Shape of the value; empty for a scalar.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Scalar(_) => &[],
            Self::Array(a) => &a.shape,
        }
    }

    /// Returns the scalar, if this is one.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Array(_) => None,
        }
    }

    /// Returns the array, if this is one.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(a) => Some(a),
        }
    }

    /// Converts into an array, if this is one.
    pub fn into_array(self) -> Option<Array> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(a) => Some(a),
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}
