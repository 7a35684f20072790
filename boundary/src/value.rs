use std::fmt::Display;

use crate::{NativeHandle, ObjectRef, ValueType};

/// Value crossing the boundary, as seen by the host.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Handle(NativeHandle),
    /// Host object; native code can call its methods while the invocation
    /// that received it is running.
    Object(ObjectRef),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Void => ValueType::Void,
            Value::Bool(_) => ValueType::Bool,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::String(_) => ValueType::Text,
            Value::Handle(_) => ValueType::Handle,
            Value::Object(_) => ValueType::Object,
        }
    }
}

macro_rules! impl_from {
    ($variant:path, $for_type:ty) => {
        impl From<$for_type> for Value {
            fn from(v: $for_type) -> Value {
                $variant(v.into())
            }
        }
    };
}

impl_from!(Value::Bool, bool);
impl_from!(Value::I32, i8);
impl_from!(Value::I32, u8);
impl_from!(Value::I32, i16);
impl_from!(Value::I32, u16);
impl_from!(Value::I32, i32);
impl_from!(Value::I64, u32);
impl_from!(Value::I64, i64);
impl_from!(Value::F32, f32);
impl_from!(Value::F64, f64);
impl_from!(Value::String, String);
impl_from!(Value::String, &str);
impl_from!(Value::Handle, NativeHandle);
impl_from!(Value::Object, ObjectRef);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryFromError {
    BadType { expected: ValueType, found: ValueType },
}

impl Display for TryFromError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryFromError::BadType { expected, found } => {
                write!(f, "expected {expected} value, got {found}")
            }
        }
    }
}

impl std::error::Error for TryFromError {}

macro_rules! impl_try_from {
    ($variant:path, $value_type:expr, $for_type:ty) => {
        impl TryFrom<Value> for $for_type {
            type Error = TryFromError;
            fn try_from(v: Value) -> Result<Self, Self::Error> {
                match v {
                    $variant(d) => Ok(d),
                    other => Err(TryFromError::BadType {
                        expected: $value_type,
                        found: other.value_type(),
                    }),
                }
            }
        }
    };
}

impl_try_from!(Value::Bool, ValueType::Bool, bool);
impl_try_from!(Value::I32, ValueType::I32, i32);
impl_try_from!(Value::I64, ValueType::I64, i64);
impl_try_from!(Value::F32, ValueType::F32, f32);
impl_try_from!(Value::F64, ValueType::F64, f64);
impl_try_from!(Value::String, ValueType::Text, String);
impl_try_from!(Value::Handle, ValueType::Handle, NativeHandle);
impl_try_from!(Value::Object, ValueType::Object, ObjectRef);

impl TryFrom<Value> for () {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Void => Ok(()),
            other => Err(TryFromError::BadType {
                expected: ValueType::Void,
                found: other.value_type(),
            }),
        }
    }
}
