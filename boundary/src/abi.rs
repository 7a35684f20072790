//! C ABI spoken between the host and native modules.
//!
//! Every entry point has the shape of [`RawEntryPoint`]. Arguments and the
//! result travel as tagged [`RawValue`]s. Text is a length-prefixed UTF-8 byte
//! sequence ([`RawText`]) and is never null-terminated; the receiving side
//! copies it. Text produced by the host stays valid until the invocation
//! returns, text returned by a native entry point stays valid until the entry
//! point returns to the host.
//!
//! Native code written in Rust should not implement entry points by hand but
//! wrap the body in [`run_entry`], which validates pointers, turns panics into
//! faults and keeps returned text alive.

use std::{
    any::Any,
    cell::RefCell,
    ffi::c_void,
    fmt::Display,
    panic::{self, AssertUnwindSafe},
    str::Utf8Error,
};

use crate::{CallbackError, NativeHandle};

/// Version of this ABI. A module init hook must return exactly this value.
pub const ABI_VERSION: i32 = 1;

/// Optional export of type [`RawModuleInit`] called once when the module is loaded.
pub const MODULE_INIT_SYMBOL: &str = "crosscall_module_init";

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAULT: i32 = 1;

pub const CALLBACK_OK: i32 = 0;
pub const CALLBACK_NO_SUCH_CLASS: i32 = 1;
pub const CALLBACK_NO_SUCH_METHOD: i32 = 2;
pub const CALLBACK_SIGNATURE_MISMATCH: i32 = 3;
pub const CALLBACK_FAILED: i32 = 4;
pub const CALLBACK_UNKNOWN_OBJECT: i32 = 5;

pub const TAG_VOID: u32 = 0;
pub const TAG_BOOL: u32 = 1;
pub const TAG_I32: u32 = 2;
pub const TAG_I64: u32 = 3;
pub const TAG_F32: u32 = 4;
pub const TAG_F64: u32 = 5;
pub const TAG_TEXT: u32 = 6;
pub const TAG_HANDLE: u32 = 7;
pub const TAG_OBJECT: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawText {
    pub ptr: *const u8,
    pub len: usize,
}

impl RawText {
    pub const EMPTY: RawText = RawText {
        ptr: std::ptr::null(),
        len: 0,
    };

    /// Borrows the bytes of `text`. The result must not outlive `text`.
    pub fn borrowed(text: &str) -> Self {
        Self {
            ptr: text.as_ptr(),
            len: text.len(),
        }
    }

    /// # Safety
    ///
    /// `ptr` must point to `len` readable bytes that stay alive and unchanged
    /// for `'a`.
    pub unsafe fn as_str<'a>(&self) -> Result<&'a str, Utf8Error> {
        if self.len == 0 || self.ptr.is_null() {
            return Ok("");
        }
        std::str::from_utf8(std::slice::from_raw_parts(self.ptr, self.len))
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union RawPayload {
    pub boolean: u8,
    pub int32: i32,
    pub int64: i64,
    pub float32: f32,
    pub float64: f64,
    pub text: RawText,
    pub handle: u64,
    pub object: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawValue {
    pub tag: u32,
    pub payload: RawPayload,
}

impl RawValue {
    pub const VOID: RawValue = RawValue {
        tag: TAG_VOID,
        payload: RawPayload { int64: 0 },
    };

    pub fn from_bool(v: bool) -> Self {
        Self {
            tag: TAG_BOOL,
            payload: RawPayload { boolean: v as u8 },
        }
    }

    pub fn from_i32(v: i32) -> Self {
        Self {
            tag: TAG_I32,
            payload: RawPayload { int32: v },
        }
    }

    pub fn from_i64(v: i64) -> Self {
        Self {
            tag: TAG_I64,
            payload: RawPayload { int64: v },
        }
    }

    pub fn from_f32(v: f32) -> Self {
        Self {
            tag: TAG_F32,
            payload: RawPayload { float32: v },
        }
    }

    pub fn from_f64(v: f64) -> Self {
        Self {
            tag: TAG_F64,
            payload: RawPayload { float64: v },
        }
    }

    pub fn from_text(v: RawText) -> Self {
        Self {
            tag: TAG_TEXT,
            payload: RawPayload { text: v },
        }
    }

    pub fn from_handle(v: NativeHandle) -> Self {
        Self {
            tag: TAG_HANDLE,
            payload: RawPayload { handle: v.to_bits() },
        }
    }

    pub fn from_object(v: ObjectId) -> Self {
        Self {
            tag: TAG_OBJECT,
            payload: RawPayload { object: v.0 },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        (self.tag == TAG_BOOL).then(|| unsafe { self.payload.boolean != 0 })
    }

    pub fn as_i32(&self) -> Option<i32> {
        (self.tag == TAG_I32).then(|| unsafe { self.payload.int32 })
    }

    pub fn as_i64(&self) -> Option<i64> {
        (self.tag == TAG_I64).then(|| unsafe { self.payload.int64 })
    }

    pub fn as_f32(&self) -> Option<f32> {
        (self.tag == TAG_F32).then(|| unsafe { self.payload.float32 })
    }

    pub fn as_f64(&self) -> Option<f64> {
        (self.tag == TAG_F64).then(|| unsafe { self.payload.float64 })
    }

    pub fn as_text(&self) -> Option<RawText> {
        (self.tag == TAG_TEXT).then(|| unsafe { self.payload.text })
    }

    pub fn as_handle(&self) -> Option<NativeHandle> {
        (self.tag == TAG_HANDLE).then(|| NativeHandle::from_bits(unsafe { self.payload.handle }))
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        (self.tag == TAG_OBJECT).then(|| ObjectId(unsafe { self.payload.object }))
    }
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("RawValue");
        s.field("tag", &self.tag);
        match self.tag {
            TAG_BOOL => s.field("value", &self.as_bool()),
            TAG_I32 => s.field("value", &self.as_i32()),
            TAG_I64 => s.field("value", &self.as_i64()),
            TAG_F32 => s.field("value", &self.as_f32()),
            TAG_F64 => s.field("value", &self.as_f64()),
            TAG_TEXT => s.field("value", &self.as_text()),
            TAG_HANDLE => s.field("value", &self.as_handle()),
            TAG_OBJECT => s.field("value", &self.as_object()),
            _ => &mut s,
        };
        s.finish()
    }
}

/// Identifies a host object passed to the current invocation. Only valid
/// until the invocation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

pub type RawCallStatic = unsafe extern "C" fn(
    context: *mut c_void,
    class: RawText,
    method: RawText,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32;

pub type RawCallMethod = unsafe extern "C" fn(
    context: *mut c_void,
    object: u64,
    method: RawText,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32;

pub type RawLog = unsafe extern "C" fn(context: *mut c_void, level: u32, message: RawText);

/// Host callbacks available to native code for the duration of one invocation,
/// on the invoking thread only.
#[repr(C)]
pub struct RawHost {
    pub context: *mut c_void,
    pub call_static: RawCallStatic,
    pub call_method: RawCallMethod,
    pub log: RawLog,
}

pub type RawEntryPoint = unsafe extern "C" fn(
    host: *const RawHost,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32;

pub type RawModuleInit = unsafe extern "C" fn(host_abi_version: i32) -> i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValueError {
    UnknownTag(u32),
    InvalidUtf8,
    UnknownObject(u64),
}

impl Display for RawValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValueError::UnknownTag(tag) => write!(f, "unknown value tag {tag}"),
            RawValueError::InvalidUtf8 => write!(f, "text is not valid UTF-8"),
            RawValueError::UnknownObject(id) => write!(f, "unknown object id {id}"),
        }
    }
}

impl std::error::Error for RawValueError {}

impl From<Utf8Error> for RawValueError {
    fn from(_: Utf8Error) -> Self {
        RawValueError::InvalidUtf8
    }
}

//
// Native side
//

/// Owned value as seen by native code.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Handle(NativeHandle),
    Object(ObjectId),
}

impl NativeValue {
    /// Raw view of this value; text is borrowed from `self`.
    pub fn as_raw(&self) -> RawValue {
        match self {
            NativeValue::Void => RawValue::VOID,
            NativeValue::Bool(v) => RawValue::from_bool(*v),
            NativeValue::I32(v) => RawValue::from_i32(*v),
            NativeValue::I64(v) => RawValue::from_i64(*v),
            NativeValue::F32(v) => RawValue::from_f32(*v),
            NativeValue::F64(v) => RawValue::from_f64(*v),
            NativeValue::Text(v) => RawValue::from_text(RawText::borrowed(v)),
            NativeValue::Handle(v) => RawValue::from_handle(*v),
            NativeValue::Object(v) => RawValue::from_object(*v),
        }
    }

    /// Copies the raw value.
    ///
    /// # Safety
    ///
    /// Text in `raw` must point to readable memory.
    pub unsafe fn from_raw(raw: &RawValue) -> Result<Self, RawValueError> {
        Ok(match raw.tag {
            TAG_VOID => NativeValue::Void,
            TAG_BOOL => NativeValue::Bool(raw.payload.boolean != 0),
            TAG_I32 => NativeValue::I32(raw.payload.int32),
            TAG_I64 => NativeValue::I64(raw.payload.int64),
            TAG_F32 => NativeValue::F32(raw.payload.float32),
            TAG_F64 => NativeValue::F64(raw.payload.float64),
            TAG_TEXT => NativeValue::Text(raw.payload.text.as_str()?.to_owned()),
            TAG_HANDLE => NativeValue::Handle(NativeHandle::from_bits(raw.payload.handle)),
            TAG_OBJECT => NativeValue::Object(ObjectId(raw.payload.object)),
            tag => return Err(RawValueError::UnknownTag(tag)),
        })
    }
}

/// Failure reported by a native entry point. The message travels back to the
/// host as the fault message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError(pub String);

impl Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NativeError {}

impl From<&str> for NativeError {
    fn from(message: &str) -> Self {
        NativeError(message.into())
    }
}

impl From<String> for NativeError {
    fn from(message: String) -> Self {
        NativeError(message)
    }
}

impl From<CallbackError> for NativeError {
    fn from(error: CallbackError) -> Self {
        NativeError(format!("host callback failed: {error}"))
    }
}

/// Arguments and host callbacks of a single invocation, from the point of
/// view of native code.
pub struct NativeCall<'a> {
    host: &'a RawHost,
    args: &'a [RawValue],
}

impl<'a> NativeCall<'a> {
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    fn raw_arg(&self, index: usize) -> Result<&'a RawValue, NativeError> {
        self.args
            .get(index)
            .ok_or_else(|| NativeError(format!("missing argument {index}")))
    }

    fn typed_arg<T>(
        &self,
        index: usize,
        what: &str,
        get: impl FnOnce(&RawValue) -> Option<T>,
    ) -> Result<T, NativeError> {
        let raw = self.raw_arg(index)?;
        get(raw).ok_or_else(|| {
            NativeError(format!(
                "argument {index} is not {what} (tag {})",
                raw.tag
            ))
        })
    }

    pub fn arg(&self, index: usize) -> Result<NativeValue, NativeError> {
        let raw = self.raw_arg(index)?;
        unsafe { NativeValue::from_raw(raw) }.map_err(|e| NativeError(e.to_string()))
    }

    pub fn bool_arg(&self, index: usize) -> Result<bool, NativeError> {
        self.typed_arg(index, "a bool", RawValue::as_bool)
    }

    pub fn i32_arg(&self, index: usize) -> Result<i32, NativeError> {
        self.typed_arg(index, "an i32", RawValue::as_i32)
    }

    pub fn i64_arg(&self, index: usize) -> Result<i64, NativeError> {
        self.typed_arg(index, "an i64", RawValue::as_i64)
    }

    pub fn f32_arg(&self, index: usize) -> Result<f32, NativeError> {
        self.typed_arg(index, "an f32", RawValue::as_f32)
    }

    pub fn f64_arg(&self, index: usize) -> Result<f64, NativeError> {
        self.typed_arg(index, "an f64", RawValue::as_f64)
    }

    /// Text argument borrowed from the host for the duration of the call.
    pub fn text_arg(&self, index: usize) -> Result<&'a str, NativeError> {
        let text = self.typed_arg(index, "text", RawValue::as_text)?;
        unsafe { text.as_str() }
            .map_err(|_| NativeError(format!("argument {index} is not valid UTF-8")))
    }

    pub fn handle_arg(&self, index: usize) -> Result<NativeHandle, NativeError> {
        self.typed_arg(index, "a handle", RawValue::as_handle)
    }

    pub fn object_arg(&self, index: usize) -> Result<ObjectId, NativeError> {
        self.typed_arg(index, "an object", RawValue::as_object)
    }

    /// Calls a static method of a host class.
    pub fn call_static(
        &self,
        class: &str,
        method: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, CallbackError> {
        let raw_args: Vec<RawValue> = args.iter().map(NativeValue::as_raw).collect();
        let mut out = RawValue::VOID;
        let status = unsafe {
            (self.host.call_static)(
                self.host.context,
                RawText::borrowed(class),
                RawText::borrowed(method),
                raw_args.as_ptr(),
                raw_args.len(),
                &mut out,
            )
        };
        unsafe { callback_result(status, &out, class, method) }
    }

    /// Calls a method on a host object passed to this invocation.
    pub fn call_method(
        &self,
        object: ObjectId,
        method: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, CallbackError> {
        let raw_args: Vec<RawValue> = args.iter().map(NativeValue::as_raw).collect();
        let mut out = RawValue::VOID;
        let status = unsafe {
            (self.host.call_method)(
                self.host.context,
                object.0,
                RawText::borrowed(method),
                raw_args.as_ptr(),
                raw_args.len(),
                &mut out,
            )
        };
        unsafe { callback_result(status, &out, &format!("object #{}", object.0), method) }
    }

    /// Emits a log record through the host logger.
    pub fn log(&self, level: log::Level, message: &str) {
        unsafe {
            (self.host.log)(
                self.host.context,
                level as u32,
                RawText::borrowed(message),
            )
        }
    }
}

unsafe fn callback_result(
    status: i32,
    out: &RawValue,
    class: &str,
    method: &str,
) -> Result<NativeValue, CallbackError> {
    let message = || {
        out.as_text()
            .and_then(|text| text.as_str().ok())
            .unwrap_or_default()
            .to_owned()
    };
    match status {
        CALLBACK_OK => NativeValue::from_raw(out).map_err(|e| CallbackError::Failed(e.to_string())),
        CALLBACK_NO_SUCH_CLASS => Err(CallbackError::NoSuchClass(class.into())),
        CALLBACK_NO_SUCH_METHOD => Err(CallbackError::NoSuchMethod {
            class: class.into(),
            method: method.into(),
        }),
        CALLBACK_SIGNATURE_MISMATCH => Err(CallbackError::SignatureMismatch {
            method: method.into(),
            reason: message(),
        }),
        CALLBACK_UNKNOWN_OBJECT => Err(CallbackError::UnknownObject(message())),
        _ => Err(CallbackError::Failed(message())),
    }
}

thread_local! {
    // Text returned from the most recent entry point on this thread.
    static RETURNED_TEXT: RefCell<String> = RefCell::new(String::new());
}

fn stash_return(value: NativeValue) -> RawValue {
    match value {
        NativeValue::Text(text) => RETURNED_TEXT.with(|slot| {
            let mut slot = slot.borrow_mut();
            *slot = text;
            RawValue::from_text(RawText::borrowed(&slot))
        }),
        value => value.as_raw(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("native code panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("native code panicked: {message}")
    } else {
        "native code panicked".into()
    }
}

/// Runs the body of a native entry point.
///
/// Returns [`STATUS_OK`] with the result in `out`, or [`STATUS_FAULT`] with the
/// error (or panic) message in `out`.
///
/// # Safety
///
/// The pointers must be the ones the host passed to the entry point.
pub unsafe fn run_entry<F>(
    host: *const RawHost,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
    body: F,
) -> i32
where
    F: FnOnce(&NativeCall) -> Result<NativeValue, NativeError>,
{
    if out.is_null() {
        return STATUS_FAULT;
    }
    if host.is_null() || (args.is_null() && argc > 0) {
        *out = stash_return(NativeValue::Text("invalid invocation pointers".into()));
        return STATUS_FAULT;
    }
    let args = if argc == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(args, argc)
    };
    let call = NativeCall { host: &*host, args };
    let (status, value) = match panic::catch_unwind(AssertUnwindSafe(|| body(&call))) {
        Ok(Ok(value)) => (STATUS_OK, value),
        Ok(Err(error)) => (STATUS_FAULT, NativeValue::Text(error.0)),
        Err(panic) => (STATUS_FAULT, NativeValue::Text(panic_message(&*panic))),
    };
    *out = stash_return(value);
    status
}

/// Implementation of a module init hook: accepts hosts speaking this ABI.
pub fn module_init(host_abi_version: i32) -> i32 {
    if host_abi_version != ABI_VERSION {
        log::warn!(
            "Host speaks ABI version {host_abi_version}, module implements {ABI_VERSION}"
        );
    }
    ABI_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_length_prefixed() {
        let text = "hello world";
        let raw = RawText::borrowed(&text[..5]);
        assert_eq!(raw.len, 5);
        assert_eq!(unsafe { raw.as_str() }.unwrap(), "hello");
        assert_eq!(unsafe { RawText::EMPTY.as_str() }.unwrap(), "");
    }

    #[test]
    fn test_accessors_check_tag() {
        let raw = RawValue::from_i32(-7);
        assert_eq!(raw.as_i32(), Some(-7));
        assert_eq!(raw.as_i64(), None);
        assert_eq!(RawValue::from_f64(0.1).as_f64(), Some(0.1));
        assert_eq!(RawValue::from_f32(42.5).as_f32(), Some(42.5));
        assert_eq!(RawValue::from_bool(true).as_bool(), Some(true));
        assert_eq!(RawValue::VOID.as_bool(), None);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let bytes = [0xffu8, 0xfe];
        let raw = RawValue::from_text(RawText {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        });
        assert_eq!(
            unsafe { NativeValue::from_raw(&raw) },
            Err(RawValueError::InvalidUtf8)
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let raw = RawValue {
            tag: 99,
            payload: RawPayload { int64: 0 },
        };
        assert_eq!(
            unsafe { NativeValue::from_raw(&raw) },
            Err(RawValueError::UnknownTag(99))
        );
    }
}
