use bytes::Bytes;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F64,
    I64,
    I32,
    U8,
    Bool,
    /// UTF-8 text, one byte buffer per element.
    Str,
}

impl DType {
    /// Width of one element in bytes. `None` for variable-width strings.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DType::F32 | DType::I32 => Some(4),
            DType::F64 | DType::I64 => Some(8),
            DType::U8 | DType::Bool => Some(1),
            DType::Str => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Owns the storage for a tensor.
#[derive(Clone, Debug)]
pub enum TensorStorage {
    /// Little-endian packed elements.
    CpuBytes(Bytes),
    /// Encoded text elements, in row-major order.
    Text(Vec<Bytes>),
}

#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub storage: TensorStorage,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc { dtype, shape },
            storage: TensorStorage::CpuBytes(bytes),
        }
    }

    /// Packs `data` with the dtype of its element type.
    pub fn from_slice<T: Element>(shape: Shape, data: &[T]) -> Self {
        Self::from_cpu_bytes(T::DTYPE, shape, bytes_from_slice(data))
    }

    pub fn from_f32(shape: Shape, data: &[f32]) -> Self {
        Self::from_slice(shape, data)
    }

    pub fn from_text(shape: Shape, items: Vec<Bytes>) -> Self {
        Self {
            desc: TensorDesc {
                dtype: DType::Str,
                shape,
            },
            storage: TensorStorage::Text(items),
        }
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    /// Returns the first item along the leading (batch) dimension.
    ///
    /// `None` for scalars and for tensors whose batch dimension is empty.
    pub fn unbatch(&self) -> Option<Tensor> {
        let (&batch, rest) = self.desc.shape.0.split_first()?;
        if batch == 0 {
            return None;
        }
        let shape = Shape::from_slice(rest);
        let item_len = shape.numel();

        let storage = match &self.storage {
            TensorStorage::CpuBytes(bytes) => {
                let width = self.desc.dtype.byte_size()?;
                let end = item_len * width;
                if bytes.len() < end {
                    return None;
                }
                TensorStorage::CpuBytes(bytes.slice(..end))
            }
            TensorStorage::Text(items) => {
                if items.len() < item_len {
                    return None;
                }
                TensorStorage::Text(items[..item_len].to_vec())
            }
        };

        Some(Tensor {
            desc: TensorDesc {
                dtype: self.desc.dtype,
                shape,
            },
            storage,
        })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width element types without padding bytes.
pub trait Element: sealed::Sealed + Copy {
    const DTYPE: DType;
}

macro_rules! element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

element!(f32 => F32, f64 => F64, i64 => I64, i32 => I32, u8 => U8);

/// Packs `slice` as little-endian bytes in host layout.
pub fn bytes_from_slice<T: Element>(slice: &[T]) -> Bytes {
    let byte_len = std::mem::size_of_val(slice);
    let ptr = slice.as_ptr().cast::<u8>();
    let bytes = unsafe { std::slice::from_raw_parts(ptr, byte_len) };
    Bytes::copy_from_slice(bytes)
}
