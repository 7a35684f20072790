use std::ffi::c_void;

use crosscall_boundary::NativeHandle;
use jni::{
    objects::{JObject, JString},
    sys::{jint, jlong, JNI_VERSION_1_6},
    JNIEnv,
};
use log::error;

fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_min_level(log::Level::Debug)
            .with_tag("crosscall"),
    );
}

#[no_mangle]
#[allow(non_snake_case)]
#[allow(clippy::missing_safety_doc)]
pub unsafe extern "C" fn JNI_OnLoad(_vm: *mut jni::sys::JavaVM, _reserved: *mut c_void) -> jint {
    // May be called more than once; `init_once` ignores repeats.
    init_logging();
    JNI_VERSION_1_6
}

/// `KeyboardActivity.onSoftKeyboardInput(long app, String s, int start, int before, int count)`
#[no_mangle]
extern "system" fn Java_io_crosscall_demo_KeyboardActivity_onSoftKeyboardInput<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    app: jlong,
    text: JString<'local>,
    start: jint,
    before: jint,
    count: jint,
) {
    let text: String = match env.get_string(&text) {
        Ok(text) => text.into(),
        Err(err) => {
            error!("Could not read soft keyboard text: {err}");
            return;
        }
    };
    let handle = NativeHandle::from_bits(app as u64);
    if let Err(err) = crate::record_soft_keyboard_input(handle, &text, start, before, count) {
        env.throw_new("java/lang/IllegalStateException", err.to_string())
            .ok();
    }
}
