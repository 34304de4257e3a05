//! N-dimensional numeric arrays.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of an [`NdArray`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically shaped array of one of the supported element types.
///
/// Serializes with its dtype, shape and values so a decode yields an
/// identical array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NdArray {
    Bool(ArrayD<bool>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Element types an [`NdArray`] can hold.
pub trait Element: Sized {
    const DTYPE: DType;

    fn wrap(array: ArrayD<Self>) -> NdArray;

    fn view(array: &NdArray) -> Option<&ArrayD<Self>>;
}

macro_rules! ndarray_variants {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;

                fn wrap(array: ArrayD<Self>) -> NdArray {
                    NdArray::$variant(array)
                }

                fn view(array: &NdArray) -> Option<&ArrayD<Self>> {
                    match array {
                        NdArray::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }

            impl From<ArrayD<$ty>> for NdArray {
                fn from(array: ArrayD<$ty>) -> Self {
                    NdArray::$variant(array)
                }
            }
        )*

        impl NdArray {
            pub fn dtype(&self) -> DType {
                match self {
                    $(NdArray::$variant(_) => DType::$variant,)*
                }
            }

            pub fn shape(&self) -> &[usize] {
                match self {
                    $(NdArray::$variant(a) => a.shape(),)*
                }
            }

            /// Total number of elements.
            pub fn len(&self) -> usize {
                match self {
                    $(NdArray::$variant(a) => a.len(),)*
                }
            }
        }
    };
}

ndarray_variants!(
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

impl NdArray {
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the underlying array if it holds `T` elements.
    pub fn downcast<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::view(self)
    }
}
