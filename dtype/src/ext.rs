//! Host scalars and the element types they stand for.

use crate::DType;

/// Host scalar type with a fixed IR element type.
///
/// Literal constructors take the element type from here instead of a separate argument.
pub trait HasDType: Copy {
    const DTYPE: DType;
}

macro_rules! host_scalars {
    ($($host:ty: $dtype:ident),* $(,)?) => {
        $(
            impl HasDType for $host {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

host_scalars! {
    bool: Bool,
    i8: Int8,
    u8: UInt8,
    i16: Int16,
    u16: UInt16,
    i32: Int32,
    u32: UInt32,
    i64: Int64,
    u64: UInt64,
    f32: Float32,
    f64: Float64,
}

/// Element type of host scalar `T`.
pub const fn dtype_of<T: HasDType>() -> DType {
    T::DTYPE
}
