use std::{rc::Rc, sync::Arc, thread};

use crosscall_boundary::{Declaration, Dispatcher, InvocationError, NativeHandle, Value};
use crosscall_run_loop::{RunLoop, TaskOutcome};
use crosscall_soft_keyboard::{
    on_soft_keyboard_input, HeadlessInputMethod, KeyboardActivity, LogToastPresenter,
    ToastActivity,
};
use futures::executor::block_on;
use log::{info, warn};

use crate::Result;

/// Simulates a user typing into the soft keyboard while native code drives the
/// activity from a worker thread. Runs the current thread's run loop until the
/// worker is done and returns the text native code ended up with.
pub fn run(dispatcher: Arc<Dispatcher>) -> Result<String> {
    let create = Declaration::parse("keyboard_app_create", "()H")?;
    let text = Declaration::parse("keyboard_app_text", "(H)T")?;
    let destroy = Declaration::parse("keyboard_app_destroy", "(H)V")?;

    let app: NativeHandle = dispatcher.invoke(&create, &[])?.try_into()?;
    info!("Native keyboard app handle: {app}");

    let run_loop = RunLoop::current();
    let keyboard = KeyboardActivity::new(dispatcher.clone(), Rc::new(HeadlessInputMethod::new()));
    let toast = ToastActivity::new(Rc::new(LogToastPresenter));

    let keyboard_handle = keyboard.handle();
    let toast_handle = toast.handle();
    let stop = run_loop.new_sender();
    let worker = thread::spawn(move || {
        keyboard_handle.set_app_handle(app);
        keyboard_handle.show_soft_keyboard();
        keyboard_handle.set_soft_keyboard_buffer("Hello");
        keyboard_handle.deliver_edit(5, 0, ", world");
        keyboard_handle.deliver_edit(0, 1, "J");
        let done = toast_handle.show_toast("Soft keyboard demo finished");
        if block_on(done) == TaskOutcome::Dropped {
            warn!("Toast was dropped before it was shown");
        }
        keyboard_handle.hide_soft_keyboard();
        stop.send(|| RunLoop::current().stop());
    });
    run_loop.run();
    if worker.join().is_err() {
        warn!("Keyboard worker thread panicked");
    }

    keyboard.on_destroy();
    toast.on_destroy();

    let final_text: String = dispatcher.invoke(&text, &[app.into()])?.try_into()?;
    info!("Native keyboard app text: \"{final_text}\"");

    dispatcher.invoke(&destroy, &[app.into()])?;
    let args = [
        Value::Handle(app),
        "late".into(),
        0.into(),
        0.into(),
        4.into(),
    ];
    match dispatcher.invoke(&on_soft_keyboard_input(), &args) {
        Err(InvocationError::NativeFault { message, .. }) => {
            info!("Input for a destroyed app is rejected: {message}")
        }
        other => warn!("Input for a destroyed app was not rejected: {other:?}"),
    }
    Ok(final_text)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crosscall_boundary::{Registry, RegistryConfig, StaticLoader};
    use crosscall_demo_native::{module, MODULE_NAME};

    use super::run;
    use crate::managed::dispatcher;

    #[test]
    fn test_keyboard_scenario() {
        let registry = Registry::with_loaders(
            RegistryConfig::default(),
            vec![Box::new(StaticLoader::new().with_module(module()))],
        );
        registry.load(MODULE_NAME).unwrap();
        let dispatcher = Arc::new(dispatcher(Arc::new(registry)).unwrap());
        assert_eq!(run(dispatcher).unwrap(), "Jello, world");
    }
}
