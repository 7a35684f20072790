//! Native module used by the demos.
//!
//! Built as a `cdylib` it is loaded at runtime by the desktop demo; as an
//! `rlib` the same entry points are available in-process through [`module`].
//! Log records go through the host logger passed with each call, because a
//! separately loaded library does not share the host's logger.

use std::sync::Mutex;

use crosscall_boundary::{
    abi::{run_entry, NativeCall, NativeError, NativeValue, RawHost, RawValue},
    HandleTable, NativeHandle, StaticModule,
};
use once_cell::sync::Lazy;

#[cfg(target_os = "android")]
mod android;

pub const MODULE_NAME: &str = "crosscall_demo_native";

/// Static callbacks of class `V`, with the arguments native code passes.
fn v_static_calls() -> Vec<(&'static str, Vec<NativeValue>)> {
    vec![
        ("vprintln", vec![NativeValue::Text("Hello from native code".into())]),
        ("javaFloatFunc", vec![NativeValue::Text("float".into()), NativeValue::I32(1)]),
        ("javaVoidFunc", vec![NativeValue::Text("void".into()), NativeValue::I32(2)]),
        ("mixedArguments", vec![NativeValue::Bool(true), NativeValue::I32(2)]),
        ("getInt", vec![]),
        ("getBool", vec![]),
        ("getFloat", vec![]),
        ("getString", vec![]),
        ("getStringFromJava", vec![]),
    ]
}

/// Native state behind a keyboard app handle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyboardApp {
    pub text: String,
    pub changes: u32,
}

static APPS: Lazy<Mutex<HandleTable<KeyboardApp>>> =
    Lazy::new(|| Mutex::new(HandleTable::new()));

fn apps() -> std::sync::MutexGuard<'static, HandleTable<KeyboardApp>> {
    // The table stays consistent even if a holder panicked.
    APPS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn create_keyboard_app() -> NativeHandle {
    apps().insert(KeyboardApp::default())
}

pub fn destroy_keyboard_app(handle: NativeHandle) -> Option<KeyboardApp> {
    apps().remove(handle)
}

pub fn keyboard_app(handle: NativeHandle) -> Option<KeyboardApp> {
    apps().get(handle).cloned()
}

/// Applies a text change reported by the soft keyboard.
pub fn record_soft_keyboard_input(
    handle: NativeHandle,
    text: &str,
    start: i32,
    before: i32,
    count: i32,
) -> Result<(), NativeError> {
    if start < 0 || before < 0 || count < 0 {
        return Err(format!("invalid text change ({start}, {before}, {count})").into());
    }
    let mut apps = apps();
    let app = apps
        .get_mut(handle)
        .ok_or_else(|| NativeError(format!("stale keyboard app handle {handle}")))?;
    app.text = text.into();
    app.changes += 1;
    Ok(())
}

mod entries {
    use super::*;

    pub(super) fn v_get_string(_: &NativeCall) -> Result<NativeValue, NativeError> {
        Ok(NativeValue::Text("Hello from native code!".into()))
    }

    pub(super) fn v_get_int(_: &NativeCall) -> Result<NativeValue, NativeError> {
        Ok(NativeValue::I32(42))
    }

    pub(super) fn v_add_int(call: &NativeCall) -> Result<NativeValue, NativeError> {
        Ok(NativeValue::I32(call.i32_arg(0)?.wrapping_add(call.i32_arg(1)?)))
    }

    pub(super) fn v_call_static_methods(call: &NativeCall) -> Result<NativeValue, NativeError> {
        for (method, args) in v_static_calls() {
            let result = call.call_static("V", method, &args)?;
            call.log(log::Level::Debug, &format!("V.{method} returned {result:?}"));
        }
        Ok(NativeValue::Void)
    }

    pub(super) fn v_mixed_arguments(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let args = [NativeValue::Bool(call.bool_arg(0)?), NativeValue::I32(call.i32_arg(1)?)];
        match call.call_static("V", "mixedArguments", &args)? {
            NativeValue::I32(result) => Ok(NativeValue::I32(result)),
            other => Err(format!("V.mixedArguments returned {other:?}").into()),
        }
    }

    pub(super) fn v_call_object_methods(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let object = call.object_arg(0)?;
        call.call_method(object, "setInt", &[NativeValue::I32(42)])?;
        Ok(NativeValue::Void)
    }

    pub(super) fn keyboard_app_create(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let handle = create_keyboard_app();
        call.log(log::Level::Info, &format!("Created keyboard app {handle}"));
        Ok(NativeValue::Handle(handle))
    }

    pub(super) fn keyboard_app_destroy(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let handle = call.handle_arg(0)?;
        destroy_keyboard_app(handle)
            .ok_or_else(|| NativeError(format!("stale keyboard app handle {handle}")))?;
        Ok(NativeValue::Void)
    }

    pub(super) fn keyboard_app_text(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let handle = call.handle_arg(0)?;
        let app = keyboard_app(handle)
            .ok_or_else(|| NativeError(format!("stale keyboard app handle {handle}")))?;
        Ok(NativeValue::Text(app.text))
    }

    pub(super) fn on_soft_keyboard_input(call: &NativeCall) -> Result<NativeValue, NativeError> {
        let handle = call.handle_arg(0)?;
        let text = call.text_arg(1)?;
        let (start, before, count) = (call.i32_arg(2)?, call.i32_arg(3)?, call.i32_arg(4)?);
        record_soft_keyboard_input(handle, text, start, before, count)?;
        call.log(
            log::Level::Debug,
            &format!("Soft keyboard input '{text}' ({start}, {before}, {count})"),
        );
        Ok(NativeValue::Void)
    }
}

macro_rules! entry_points {
    ($($name:ident),* $(,)?) => {
        $(
            #[no_mangle]
            pub unsafe extern "C" fn $name(
                host: *const RawHost,
                args: *const RawValue,
                argc: usize,
                out: *mut RawValue,
            ) -> i32 {
                run_entry(host, args, argc, out, entries::$name)
            }
        )*

        /// The entry points of this library as an in-process module.
        pub fn module() -> StaticModule {
            StaticModule::new(MODULE_NAME)
                $(.with_entry(stringify!($name), $name))*
        }
    };
}

entry_points!(
    v_get_string,
    v_get_int,
    v_add_int,
    v_call_static_methods,
    v_mixed_arguments,
    v_call_object_methods,
    keyboard_app_create,
    keyboard_app_destroy,
    keyboard_app_text,
    on_soft_keyboard_input,
);

#[no_mangle]
pub extern "C" fn crosscall_module_init(host_abi_version: i32) -> i32 {
    crosscall_boundary::abi::module_init(host_abi_version)
}
