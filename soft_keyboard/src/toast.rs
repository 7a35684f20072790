use std::{
    cell::Cell,
    rc::{Rc, Weak},
    sync::Arc,
    time::Duration,
};

use crosscall_run_loop::{util::OwnerBound, PostedTask, RunLoop, RunLoopSender};
use log::{debug, error, info};

/// How long a toast stays on screen.
pub const TOAST_DURATION: Duration = Duration::from_millis(2000);

/// Platform toast service.
pub trait ToastPresenter {
    fn present(&self, text: &str, duration: Duration);
}

/// Presents toasts as log records.
pub struct LogToastPresenter;

impl ToastPresenter for LogToastPresenter {
    fn present(&self, text: &str, duration: Duration) {
        info!("Toast ({duration:?}): {text}");
    }
}

pub struct ToastActivity {
    presenter: Rc<dyn ToastPresenter>,
    sender: RunLoopSender,
    destroyed: Cell<bool>,
}

impl ToastActivity {
    /// Must be called on the owner thread.
    pub fn new(presenter: Rc<dyn ToastPresenter>) -> Rc<Self> {
        Rc::new(Self {
            presenter,
            sender: RunLoop::current().new_sender(),
            destroyed: Cell::new(false),
        })
    }

    pub fn handle(self: &Rc<Self>) -> ToastHandle {
        ToastHandle {
            sender: self.sender.clone(),
            activity: Arc::new(OwnerBound::new_with_sender(
                Rc::downgrade(self),
                self.sender.clone(),
            )),
        }
    }

    pub fn show_toast(&self, text: &str) {
        self.presenter.present(text, TOAST_DURATION);
    }

    pub fn on_destroy(&self) {
        self.destroyed.set(true);
    }
}

#[derive(Clone)]
pub struct ToastHandle {
    sender: RunLoopSender,
    activity: Arc<OwnerBound<Weak<ToastActivity>>>,
}

impl ToastHandle {
    /// Shows `text` briefly. May be called from any thread.
    pub fn show_toast(&self, text: impl Into<String>) -> PostedTask {
        let text = text.into();
        let activity = self.activity.clone();
        self.sender.post(move || match activity.get() {
            Ok(activity) => match activity.upgrade() {
                Some(activity) if !activity.destroyed.get() => activity.show_toast(&text),
                _ => debug!("Toast activity is gone, dropping '{text}'"),
            },
            Err(err) => error!("show_toast: {err}"),
        })
    }
}
