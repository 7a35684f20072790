use std::{cell::Cell, rc::Rc, sync::Arc};

use crosscall_boundary::{Declaration, Dispatcher, NativeHandle, Signature, Value, ValueType};
use log::{error, warn};

use crate::TextWatcher;

pub const ON_SOFT_KEYBOARD_INPUT: &str = "on_soft_keyboard_input";

/// `(app, text, start, before, count) -> void`
pub fn on_soft_keyboard_input() -> Declaration {
    Declaration::new(
        ON_SOFT_KEYBOARD_INPUT,
        Signature::new(
            vec![
                ValueType::Handle,
                ValueType::Text,
                ValueType::I32,
                ValueType::I32,
                ValueType::I32,
            ],
            ValueType::Void,
        ),
    )
}

/// Forwards every text change to native code along with the native app
/// handle stored on the activity.
pub(crate) struct NativeTextForwarder {
    dispatcher: Arc<Dispatcher>,
    declaration: Declaration,
    app: Rc<Cell<Option<NativeHandle>>>,
}

impl NativeTextForwarder {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, app: Rc<Cell<Option<NativeHandle>>>) -> Self {
        Self {
            dispatcher,
            declaration: on_soft_keyboard_input(),
            app,
        }
    }
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TextWatcher for NativeTextForwarder {
    fn on_text_changed(&self, text: &str, start: usize, before: usize, count: usize) {
        let Some(app) = self.app.get() else {
            warn!("Text changed before the native app handle was set, not forwarding");
            return;
        };
        let args = [
            Value::Handle(app),
            Value::String(text.into()),
            Value::I32(to_i32(start)),
            Value::I32(to_i32(before)),
            Value::I32(to_i32(count)),
        ];
        if let Err(err) = self.dispatcher.invoke(&self.declaration, &args) {
            error!("Forwarding soft keyboard input failed: {err}");
        }
    }
}
