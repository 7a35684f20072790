use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
    sync::Arc,
};

use crosscall_boundary::{Dispatcher, NativeHandle};
use crosscall_run_loop::{util::OwnerBound, PostedTask, RunLoop, RunLoopSender};
use log::{debug, error};

use crate::{forwarder::NativeTextForwarder, Error, HiddenInput, InputMethod, Result};

/// Activity that owns the hidden text input and the native app handle.
///
/// Must be created and used on the owner thread (the thread whose
/// [`RunLoop`] processes its tasks). Other threads use [`KeyboardHandle`].
pub struct KeyboardActivity {
    dispatcher: Arc<Dispatcher>,
    input_method: Rc<dyn InputMethod>,
    sender: RunLoopSender,
    layout: RefCell<Vec<Rc<HiddenInput>>>,
    hidden_input: RefCell<Option<Rc<HiddenInput>>>,
    app: Rc<Cell<Option<NativeHandle>>>,
    destroyed: Cell<bool>,
}

impl KeyboardActivity {
    pub fn new(dispatcher: Arc<Dispatcher>, input_method: Rc<dyn InputMethod>) -> Rc<Self> {
        Rc::new(Self {
            dispatcher,
            input_method,
            sender: RunLoop::current().new_sender(),
            layout: RefCell::new(Vec::new()),
            hidden_input: RefCell::new(None),
            app: Rc::new(Cell::new(None)),
            destroyed: Cell::new(false),
        })
    }

    /// Handle for posting keyboard operations from any thread.
    pub fn handle(self: &Rc<Self>) -> KeyboardHandle {
        KeyboardHandle {
            sender: self.sender.clone(),
            activity: Arc::new(OwnerBound::new_with_sender(
                Rc::downgrade(self),
                self.sender.clone(),
            )),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn hidden_input(&self) -> Option<Rc<HiddenInput>> {
        self.hidden_input.borrow().clone()
    }

    /// Number of views attached to the activity layout.
    pub fn attached_views(&self) -> usize {
        self.layout.borrow().len()
    }

    pub fn app_handle(&self) -> Option<NativeHandle> {
        self.app.get()
    }

    pub fn set_app_handle(&self, handle: NativeHandle) {
        self.app.set(Some(handle));
    }

    pub fn clear_app_handle(&self) {
        self.app.set(None);
    }

    pub fn show_soft_keyboard(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        let input = self.hidden_input().unwrap_or_else(|| {
            let input = HiddenInput::new();
            input.add_text_watcher(Rc::new(NativeTextForwarder::new(
                self.dispatcher.clone(),
                self.app.clone(),
            )));
            self.hidden_input.replace(Some(input.clone()));
            input
        });
        {
            let mut layout = self.layout.borrow_mut();
            if !layout.iter().any(|view| Rc::ptr_eq(view, &input)) {
                layout.push(input.clone());
            }
        }
        input.set_enabled(true);
        input.request_focus();
        self.input_method.show_soft_input(&input);
        debug!("Soft keyboard shown");
        Ok(())
    }

    pub fn hide_soft_keyboard(&self) {
        let Some(input) = self.hidden_input.take() else {
            return;
        };
        self.input_method.hide_soft_input(&input);
        input.clear_focus();
        self.layout
            .borrow_mut()
            .retain(|view| !Rc::ptr_eq(view, &input));
        debug!("Soft keyboard hidden");
    }

    /// Replaces the input text. The cursor is moved to the end by a follow-up
    /// task once the change has been processed.
    pub fn set_soft_keyboard_buffer(&self, text: &str) -> Result<()> {
        let input = self.hidden_input().ok_or(Error::MissingWidget)?;
        input.set_text(text);
        let input = OwnerBound::new_with_sender(Rc::downgrade(&input), self.sender.clone());
        self.sender.send(move || {
            if let Some(input) = input.get().ok().and_then(Weak::upgrade) {
                input.set_selection(input.char_len());
            }
        });
        Ok(())
    }

    /// Edit coming from the input method.
    pub fn deliver_edit(&self, start: usize, before: usize, inserted: &str) -> Result<()> {
        let input = self.hidden_input().ok_or(Error::MissingWidget)?;
        input.replace(start, before, inserted);
        Ok(())
    }

    pub fn on_pause(&self) {
        self.hide_soft_keyboard();
    }

    pub fn on_stop(&self) {
        self.hide_soft_keyboard();
    }

    pub fn on_resume(&self) {
        if self.hidden_input.borrow().is_none() {
            return;
        }
        if let Err(err) = self.show_soft_keyboard() {
            error!("Could not show soft keyboard on resume: {err}");
        }
    }

    pub fn on_destroy(&self) {
        self.hide_soft_keyboard();
        self.destroyed.set(true);
    }
}

/// Cross-thread handle to a [`KeyboardActivity`].
///
/// Every operation is posted to the owner thread and runs there in posting
/// order. Operations reaching a destroyed activity are skipped. Failures are
/// logged.
#[derive(Clone)]
pub struct KeyboardHandle {
    sender: RunLoopSender,
    activity: Arc<OwnerBound<Weak<KeyboardActivity>>>,
}

impl KeyboardHandle {
    fn post<F>(&self, operation: &'static str, f: F) -> PostedTask
    where
        F: FnOnce(&KeyboardActivity) -> Result<()> + Send + 'static,
    {
        let activity = self.activity.clone();
        self.sender.post(move || {
            let activity = match activity.get() {
                Ok(activity) => activity.upgrade(),
                Err(err) => {
                    error!("{operation}: {err}");
                    return;
                }
            };
            let result = match activity {
                Some(activity) if !activity.is_destroyed() => f(&activity),
                _ => Err(Error::Destroyed),
            };
            match result {
                Ok(()) => {}
                Err(Error::Destroyed) => debug!("{operation}: activity is gone, skipping"),
                Err(err) => error!("{operation}: {err}"),
            }
        })
    }

    pub fn show_soft_keyboard(&self) -> PostedTask {
        self.post("show_soft_keyboard", |activity| activity.show_soft_keyboard())
    }

    pub fn hide_soft_keyboard(&self) -> PostedTask {
        self.post("hide_soft_keyboard", |activity| {
            activity.hide_soft_keyboard();
            Ok(())
        })
    }

    pub fn set_soft_keyboard_buffer(&self, text: impl Into<String>) -> PostedTask {
        let text = text.into();
        self.post("set_soft_keyboard_buffer", move |activity| {
            activity.set_soft_keyboard_buffer(&text)
        })
    }

    pub fn deliver_edit(&self, start: usize, before: usize, inserted: impl Into<String>) -> PostedTask {
        let inserted = inserted.into();
        self.post("deliver_edit", move |activity| {
            activity.deliver_edit(start, before, &inserted)
        })
    }

    pub fn set_app_handle(&self, handle: NativeHandle) -> PostedTask {
        self.post("set_app_handle", move |activity| {
            activity.set_app_handle(handle);
            Ok(())
        })
    }

    pub fn clear_app_handle(&self) -> PostedTask {
        self.post("clear_app_handle", |activity| {
            activity.clear_app_handle();
            Ok(())
        })
    }

    pub fn is_owner_thread(&self) -> bool {
        self.sender.is_same_thread()
    }
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, thread};

    use crosscall_boundary::NativeHandle;
    use crosscall_run_loop::{RunLoop, TaskState};

    use super::KeyboardActivity;
    use crate::{
        test_support::{received, test_dispatcher},
        Error, HeadlessInputMethod,
    };

    fn activity() -> (Rc<KeyboardActivity>, Rc<HeadlessInputMethod>) {
        let input_method = Rc::new(HeadlessInputMethod::new());
        let activity = KeyboardActivity::new(test_dispatcher(), input_method.clone());
        (activity, input_method)
    }

    #[test]
    fn test_show_and_hide() {
        let (activity, input_method) = activity();
        activity.hide_soft_keyboard();
        activity.show_soft_keyboard().unwrap();
        let input = activity.hidden_input().unwrap();
        assert!(input.is_enabled());
        assert!(input.has_focus());
        assert!(input_method.is_visible());
        assert_eq!(activity.attached_views(), 1);

        // Showing again reuses the widget.
        activity.show_soft_keyboard().unwrap();
        assert!(Rc::ptr_eq(&input, &activity.hidden_input().unwrap()));
        assert_eq!(activity.attached_views(), 1);

        activity.hide_soft_keyboard();
        assert!(activity.hidden_input().is_none());
        assert!(!input.has_focus());
        assert!(!input_method.is_visible());
        assert_eq!(activity.attached_views(), 0);
    }

    #[test]
    fn test_text_changes_forwarded_with_handle() {
        let (activity, _) = activity();
        let app = NativeHandle::from_bits(0x0001_0000_1001);
        activity.set_app_handle(app);
        activity.show_soft_keyboard().unwrap();
        activity.deliver_edit(0, 0, "hi").unwrap();
        activity.deliver_edit(2, 0, "!").unwrap();
        activity.deliver_edit(0, 2, "yo").unwrap();
        assert_eq!(
            received(app),
            vec![
                ("hi".to_string(), 0, 0, 2),
                ("hi!".to_string(), 2, 0, 1),
                ("yo!".to_string(), 0, 2, 2),
            ]
        );
    }

    #[test]
    fn test_changes_without_handle_are_not_forwarded() {
        let (activity, _) = activity();
        activity.show_soft_keyboard().unwrap();
        activity.deliver_edit(0, 0, "lost").unwrap();
        let app = NativeHandle::from_bits(0x0001_0000_1002);
        activity.set_app_handle(app);
        activity.deliver_edit(4, 0, "!").unwrap();
        assert_eq!(received(app), vec![("lost!".to_string(), 4, 0, 1)]);
        activity.clear_app_handle();
        activity.deliver_edit(0, 0, "x").unwrap();
        assert_eq!(received(app).len(), 1);
    }

    #[test]
    fn test_set_buffer_without_widget_is_a_no_op() {
        let (activity, _) = activity();
        assert_eq!(
            activity.set_soft_keyboard_buffer("text"),
            Err(Error::MissingWidget)
        );
        assert!(activity.hidden_input().is_none());

        let handle = activity.handle();
        let task = handle.set_soft_keyboard_buffer("text");
        RunLoop::current().run_until_idle();
        assert_eq!(task.state(), TaskState::Done);
        assert!(activity.hidden_input().is_none());
    }

    #[test]
    fn test_set_buffer_moves_selection_in_follow_up_task() {
        let (activity, _) = activity();
        let app = NativeHandle::from_bits(0x0001_0000_1003);
        activity.set_app_handle(app);
        activity.show_soft_keyboard().unwrap();
        activity.set_soft_keyboard_buffer("héllo").unwrap();
        let input = activity.hidden_input().unwrap();
        assert_eq!(input.text(), "héllo");
        assert_eq!(input.selection(), 0);
        RunLoop::current().run_until_idle();
        assert_eq!(input.selection(), 5);
        assert_eq!(received(app), vec![("héllo".to_string(), 0, 0, 5)]);
    }

    #[test]
    fn test_handle_posts_in_order_from_other_thread() {
        let (activity, input_method) = activity();
        let handle = activity.handle();
        let app = NativeHandle::from_bits(0x0001_0000_1004);
        thread::spawn(move || {
            assert!(!handle.is_owner_thread());
            handle.set_app_handle(app);
            handle.show_soft_keyboard();
            handle.set_soft_keyboard_buffer("abc");
            handle.deliver_edit(3, 0, "d");
            handle.hide_soft_keyboard();
        })
        .join()
        .unwrap();
        assert!(activity.hidden_input().is_none());
        RunLoop::current().run_until_idle();
        assert_eq!(
            received(app),
            vec![("abc".to_string(), 0, 0, 3), ("abcd".to_string(), 3, 0, 1)]
        );
        assert!(activity.hidden_input().is_none());
        assert!(!input_method.is_visible());
    }

    #[test]
    fn test_lifecycle() {
        let (activity, input_method) = activity();
        activity.show_soft_keyboard().unwrap();
        activity.on_pause();
        assert!(!input_method.is_visible());
        activity.on_resume();
        assert!(!input_method.is_visible());

        activity.show_soft_keyboard().unwrap();
        activity.on_resume();
        assert!(input_method.is_visible());

        let handle = activity.handle();
        activity.on_destroy();
        assert!(activity.is_destroyed());
        assert_eq!(activity.show_soft_keyboard(), Err(Error::Destroyed));
        let task = handle.show_soft_keyboard();
        RunLoop::current().run_until_idle();
        assert_eq!(task.state(), TaskState::Done);
        assert!(activity.hidden_input().is_none());
    }

    #[test]
    fn test_posted_task_after_activity_dropped() {
        let (activity, _) = activity();
        let handle = activity.handle();
        drop(activity);
        let task = handle.show_soft_keyboard();
        RunLoop::current().run_until_idle();
        assert_eq!(task.state(), TaskState::Done);
    }
}
