use std::sync::{Arc, Mutex};

use crosscall_boundary::{
    abi::{run_entry, NativeValue, RawHost, RawValue},
    Dispatcher, NativeHandle, Registry, RegistryConfig, StaticLoader, StaticModule,
};
use once_cell::sync::Lazy;

use crate::ON_SOFT_KEYBOARD_INPUT;

type Received = (u64, String, i32, i32, i32);

// Shared by all tests; entries are told apart by the app handle.
static RECEIVED: Lazy<Mutex<Vec<Received>>> = Lazy::new(|| Mutex::new(Vec::new()));

unsafe extern "C" fn on_soft_keyboard_input(
    host: *const RawHost,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32 {
    run_entry(host, args, argc, out, |call| {
        let entry = (
            call.handle_arg(0)?.to_bits(),
            call.text_arg(1)?.to_owned(),
            call.i32_arg(2)?,
            call.i32_arg(3)?,
            call.i32_arg(4)?,
        );
        RECEIVED.lock().unwrap().push(entry);
        Ok(NativeValue::Void)
    })
}

pub fn test_dispatcher() -> Arc<Dispatcher> {
    let loader = StaticLoader::new().with_module(
        StaticModule::new("keyboard_test").with_entry(ON_SOFT_KEYBOARD_INPUT, on_soft_keyboard_input),
    );
    let registry = Registry::with_loaders(RegistryConfig::default(), vec![Box::new(loader)]);
    registry.load("keyboard_test").unwrap();
    Arc::new(Dispatcher::new(Arc::new(registry)))
}

/// Text changes received by native code for `app`, in order.
pub fn received(app: NativeHandle) -> Vec<(String, i32, i32, i32)> {
    RECEIVED
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.0 == app.to_bits())
        .map(|(_, text, start, before, count)| (text.clone(), *start, *before, *count))
        .collect()
}
