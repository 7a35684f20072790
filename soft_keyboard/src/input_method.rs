use std::cell::Cell;

use log::debug;

use crate::HiddenInput;

/// Platform input method service that shows and hides the soft keyboard.
pub trait InputMethod {
    fn show_soft_input(&self, input: &HiddenInput);
    fn hide_soft_input(&self, input: &HiddenInput);
}

/// Input method without a visible keyboard. Tracks visibility only.
#[derive(Default)]
pub struct HeadlessInputMethod {
    visible: Cell<bool>,
}

impl HeadlessInputMethod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }
}

impl InputMethod for HeadlessInputMethod {
    fn show_soft_input(&self, input: &HiddenInput) {
        debug!("Showing soft input (focused: {})", input.has_focus());
        self.visible.set(true);
    }

    fn hide_soft_input(&self, _input: &HiddenInput) {
        debug!("Hiding soft input");
        self.visible.set(false);
    }
}
