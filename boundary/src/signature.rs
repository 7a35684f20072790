use std::{fmt::Display, str::FromStr};

use crate::{
    abi::{
        TAG_BOOL, TAG_F32, TAG_F64, TAG_HANDLE, TAG_I32, TAG_I64, TAG_OBJECT, TAG_TEXT, TAG_VOID,
    },
    SignatureError, SignatureMismatch, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Bool,
    I32,
    I64,
    F32,
    F64,
    Text,
    Handle,
    Object,
}

impl ValueType {
    pub fn code(self) -> char {
        match self {
            ValueType::Void => 'V',
            ValueType::Bool => 'Z',
            ValueType::I32 => 'I',
            ValueType::I64 => 'J',
            ValueType::F32 => 'F',
            ValueType::F64 => 'D',
            ValueType::Text => 'T',
            ValueType::Handle => 'H',
            ValueType::Object => 'O',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'V' => ValueType::Void,
            'Z' => ValueType::Bool,
            'I' => ValueType::I32,
            'J' => ValueType::I64,
            'F' => ValueType::F32,
            'D' => ValueType::F64,
            'T' => ValueType::Text,
            'H' => ValueType::Handle,
            'O' => ValueType::Object,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        match self {
            ValueType::Void => TAG_VOID,
            ValueType::Bool => TAG_BOOL,
            ValueType::I32 => TAG_I32,
            ValueType::I64 => TAG_I64,
            ValueType::F32 => TAG_F32,
            ValueType::F64 => TAG_F64,
            ValueType::Text => TAG_TEXT,
            ValueType::Handle => TAG_HANDLE,
            ValueType::Object => TAG_OBJECT,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Void => "void",
            ValueType::Bool => "bool",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Text => "text",
            ValueType::Handle => "handle",
            ValueType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Parameter and return types of an entry point or callback method.
///
/// The textual form is a descriptor such as `(ZI)I`: parameter type codes in
/// parentheses followed by the return type code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Vec<ValueType>,
    ret: ValueType,
}

impl Signature {
    pub fn new(params: Vec<ValueType>, ret: ValueType) -> Self {
        Self { params, ret }
    }

    pub fn parse(descriptor: &str) -> Result<Self, SignatureError> {
        let rest = descriptor
            .strip_prefix('(')
            .ok_or(SignatureError::MissingOpenParen)?;
        let (params, rest) = rest
            .split_once(')')
            .ok_or(SignatureError::MissingCloseParen)?;
        let params = params
            .chars()
            .enumerate()
            .map(|(index, code)| match ValueType::from_code(code) {
                Some(ValueType::Void) => Err(SignatureError::VoidParameter(index)),
                Some(t) => Ok(t),
                None => Err(SignatureError::UnknownTypeCode(code)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut chars = rest.chars();
        let code = chars.next().ok_or(SignatureError::MissingReturnType)?;
        let ret = ValueType::from_code(code).ok_or(SignatureError::UnknownTypeCode(code))?;
        let trailing = chars.as_str();
        if !trailing.is_empty() {
            return Err(SignatureError::TrailingCharacters(trailing.into()));
        }
        Ok(Self { params, ret })
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn ret(&self) -> ValueType {
        self.ret
    }

    pub fn check_args(&self, args: &[Value]) -> Result<(), SignatureMismatch> {
        if args.len() != self.params.len() {
            return Err(SignatureMismatch::Arity {
                expected: self.params.len(),
                found: args.len(),
            });
        }
        for (index, (expected, arg)) in self.params.iter().zip(args).enumerate() {
            let found = arg.value_type();
            if *expected != found {
                return Err(SignatureMismatch::Argument {
                    index,
                    expected: *expected,
                    found,
                });
            }
        }
        Ok(())
    }

    pub fn check_return(&self, value: &Value) -> Result<(), SignatureMismatch> {
        let found = value.value_type();
        if found != self.ret {
            return Err(SignatureMismatch::Return {
                expected: self.ret,
                found,
            });
        }
        Ok(())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param.code())?;
        }
        write!(f, "){}", self.ret.code())
    }
}

#[cfg(test)]
mod tests {
    use super::{Signature, ValueType};
    use crate::{SignatureError, SignatureMismatch, Value};

    #[test]
    fn test_parse() {
        let s = Signature::parse("(ZI)I").unwrap();
        assert_eq!(s.params(), &[ValueType::Bool, ValueType::I32]);
        assert_eq!(s.ret(), ValueType::I32);
        assert_eq!(s.to_string(), "(ZI)I");

        let s: Signature = "()V".parse().unwrap();
        assert!(s.params().is_empty());
        assert_eq!(s.ret(), ValueType::Void);

        let s = Signature::parse("(HTIII)V").unwrap();
        assert_eq!(s.params().len(), 5);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Signature::parse("I)V"), Err(SignatureError::MissingOpenParen));
        assert_eq!(Signature::parse("(I"), Err(SignatureError::MissingCloseParen));
        assert_eq!(Signature::parse("(I)"), Err(SignatureError::MissingReturnType));
        assert_eq!(Signature::parse("(IV)I"), Err(SignatureError::VoidParameter(1)));
        assert_eq!(Signature::parse("(Q)V"), Err(SignatureError::UnknownTypeCode('Q')));
        assert_eq!(
            Signature::parse("(I)VV"),
            Err(SignatureError::TrailingCharacters("V".into()))
        );
    }

    #[test]
    fn test_check_args() {
        let s = Signature::parse("(ZI)I").unwrap();
        assert_eq!(s.check_args(&[true.into(), 2.into()]), Ok(()));
        assert_eq!(
            s.check_args(&[true.into()]),
            Err(SignatureMismatch::Arity {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            s.check_args(&[true.into(), 2i64.into()]),
            Err(SignatureMismatch::Argument {
                index: 1,
                expected: ValueType::I32,
                found: ValueType::I64,
            })
        );
        assert!(s.check_return(&Value::I32(1)).is_ok());
        assert!(s.check_return(&Value::Void).is_err());
    }
}
