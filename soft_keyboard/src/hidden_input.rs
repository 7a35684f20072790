use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// Notified after the text of a [`HiddenInput`] changed: within `text`, the
/// `count` characters starting at `start` replaced `before` characters.
/// Positions and lengths are counted in characters.
pub trait TextWatcher {
    fn on_text_changed(&self, text: &str, start: usize, before: usize, count: usize);
}

/// Invisible single line text input that receives soft keyboard edits.
///
/// Lives on the owner thread only.
pub struct HiddenInput {
    text: RefCell<String>,
    selection: Cell<usize>,
    enabled: Cell<bool>,
    focused: Cell<bool>,
    watchers: RefCell<Vec<Rc<dyn TextWatcher>>>,
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

impl HiddenInput {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            text: RefCell::new(String::new()),
            selection: Cell::new(0),
            enabled: Cell::new(false),
            focused: Cell::new(false),
            watchers: RefCell::new(Vec::new()),
        })
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn char_len(&self) -> usize {
        self.text.borrow().chars().count()
    }

    pub fn add_text_watcher(&self, watcher: Rc<dyn TextWatcher>) {
        self.watchers.borrow_mut().push(watcher);
    }

    /// Replaces the whole text. The cursor moves to the start.
    pub fn set_text(&self, text: &str) {
        let before = self.char_len();
        let count = text.chars().count();
        self.text.replace(text.to_owned());
        self.selection.set(0);
        self.notify(0, before, count);
    }

    /// Replaces `before` characters at `start` with `inserted`, as an input
    /// method edit does. Out of range positions are clamped.
    pub fn replace(&self, start: usize, before: usize, inserted: &str) {
        let (start, before, count) = {
            let mut text = self.text.borrow_mut();
            let len = text.chars().count();
            let start = start.min(len);
            let before = before.min(len - start);
            let from = byte_offset(&text, start);
            let to = byte_offset(&text, start + before);
            text.replace_range(from..to, inserted);
            (start, before, inserted.chars().count())
        };
        self.selection.set(start + count);
        self.notify(start, before, count);
    }

    pub fn selection(&self) -> usize {
        self.selection.get()
    }

    pub fn set_selection(&self, position: usize) {
        self.selection.set(position.min(self.char_len()));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
        if !enabled {
            self.focused.set(false);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Returns whether the input has focus afterwards. Disabled inputs can
    /// not take focus.
    pub fn request_focus(&self) -> bool {
        if self.enabled.get() {
            self.focused.set(true);
        }
        self.focused.get()
    }

    pub fn clear_focus(&self) {
        self.focused.set(false);
    }

    pub fn has_focus(&self) -> bool {
        self.focused.get()
    }

    fn notify(&self, start: usize, before: usize, count: usize) {
        // Watchers may edit the input again.
        let watchers = self.watchers.borrow().clone();
        let text = self.text();
        for watcher in watchers {
            watcher.on_text_changed(&text, start, before, count);
        }
    }
}
