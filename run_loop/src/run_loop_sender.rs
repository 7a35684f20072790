use std::fmt::Debug;

use log::warn;

use crate::{get_system_thread_id, platform::PlatformRunLoopSender, PostedTask, SystemThreadId};

/// Can be used to post callbacks from any thread to be executed on the run
/// loop (owner) thread.
#[derive(Clone)]
pub struct RunLoopSender {
    thread_id: SystemThreadId,
    platform_sender: PlatformRunLoopSender,
}

impl Debug for RunLoopSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopSender")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl RunLoopSender {
    pub(crate) fn new(platform_sender: PlatformRunLoopSender) -> Self {
        Self {
            thread_id: get_system_thread_id(),
            platform_sender,
        }
    }

    /// Returns true if sender would send the callback to current thread.
    pub fn is_same_thread(&self) -> bool {
        get_system_thread_id() == self.thread_id
    }

    /// Schedules the callback to be executed on run loop and returns
    /// immediately. The callback is queued even when called on the run loop
    /// thread itself, so callbacks always run in the order they were sent.
    pub fn send<F>(&self, callback: F)
    where
        F: FnOnce() + 'static + Send,
    {
        let _ = self.post(callback);
    }

    /// Same as [`RunLoopSender::send`] but returns a [`PostedTask`] that can be
    /// used to observe the task state or await its completion.
    pub fn post<F>(&self, callback: F) -> PostedTask
    where
        F: FnOnce() + 'static + Send,
    {
        let (task, run) = PostedTask::new(callback);
        if self.platform_sender.send(run) {
            task.mark_scheduled();
        } else {
            warn!(
                "Run loop on thread {:?} no longer exists, dropping posted task",
                self.thread_id
            );
        }
        task
    }
}
