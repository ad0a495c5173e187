//! Tagged value type used to communicate config-property values to the
//! dispatcher.

use std::ffi::c_void;

/// Version carried by every variant for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantVersion {
    pub version: u16,
    pub reserved: u16,
}

impl Default for VariantVersion {
    fn default() -> VariantVersion {
        VariantVersion {
            version: 1,
            reserved: 0,
        }
    }
}

/// The value itself; one variant per supported width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariantValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Ptr(*mut c_void),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variant {
    pub version: VariantVersion,
    pub value: VariantValue,
}

impl Variant {
    pub fn new(value: VariantValue) -> Variant {
        Variant {
            version: VariantVersion::default(),
            value,
        }
    }

    /// Name of the carried type, used in filter diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.value {
            VariantValue::U8(_) => "u8",
            VariantValue::U16(_) => "u16",
            VariantValue::U32(_) => "u32",
            VariantValue::U64(_) => "u64",
            VariantValue::I8(_) => "i8",
            VariantValue::I16(_) => "i16",
            VariantValue::I32(_) => "i32",
            VariantValue::I64(_) => "i64",
            VariantValue::F32(_) => "f32",
            VariantValue::F64(_) => "f64",
            VariantValue::Ptr(_) => "ptr",
        }
    }
}

macro_rules! variant_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Variant {
            fn from(v: $ty) -> Variant {
                Variant::new(VariantValue::$variant(v))
            }
        }
    };
}

variant_from!(u8, U8);
variant_from!(u16, U16);
variant_from!(u32, U32);
variant_from!(u64, U64);
variant_from!(i8, I8);
variant_from!(i16, I16);
variant_from!(i32, I32);
variant_from!(i64, I64);
variant_from!(f32, F32);
variant_from!(f64, F64);
variant_from!(*mut c_void, Ptr);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_impls_carry_the_right_tag() {
        assert_eq!(Variant::from(5u8).value, VariantValue::U8(5));
        assert_eq!(Variant::from(5u32).value, VariantValue::U32(5));
        assert_eq!(Variant::from(-5i64).value, VariantValue::I64(-5));
        assert_eq!(Variant::from(0.5f64).value, VariantValue::F64(0.5));
    }

    #[test]
    fn type_names_match_tags() {
        assert_eq!(Variant::from(1u16).type_name(), "u16");
        assert_eq!(Variant::from(1.0f32).type_name(), "f32");
        let p: *mut c_void = std::ptr::null_mut();
        assert_eq!(Variant::from(p).type_name(), "ptr");
    }

    #[test]
    fn version_defaults_to_one() {
        assert_eq!(Variant::from(0u32).version.version, 1);
    }
}
