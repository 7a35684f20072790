use std::rc::Rc;

use crate::{platform::PlatformRunLoop, RunLoopSender};

/// Per-thread run loop. The thread that runs a loop is the *owner thread* of
/// everything posted to it: callbacks sent through a [`RunLoopSender`] execute
/// there one at a time, in the order they were sent.
pub struct RunLoop {
    pub platform_run_loop: Rc<PlatformRunLoop>,
}

thread_local!(static RUN_LOOP: RunLoop = RunLoop::new());

impl RunLoop {
    /// Creates new RunLoop instance. This is not meant to be called directly.
    /// Use [`RunLoop::current()`] instead.
    pub(crate) fn new() -> Self {
        Self {
            platform_run_loop: Rc::new(PlatformRunLoop::new()),
        }
    }

    /// Returns sender object that can be used to post callbacks to this run
    /// loop from other threads. The sender, unlike `RunLoop` itself, is both
    /// `Send` and `Sync`.
    pub fn new_sender(&self) -> RunLoopSender {
        RunLoopSender::new(self.platform_run_loop.new_sender())
    }

    /// Returns RunLoop for current thread. Each thread has its own RunLoop
    /// instance. The instance is created on demand and destroyed when thread
    /// exits.
    pub fn current() -> Self {
        RUN_LOOP.with(|run_loop| RunLoop {
            platform_run_loop: run_loop.platform_run_loop.clone(),
        })
    }

    /// Runs the run loop until it is stopped.
    pub fn run(&self) {
        self.platform_run_loop.run()
    }

    /// Stops the run loop.
    pub fn stop(&self) {
        self.platform_run_loop.stop()
    }

    /// Runs queued callbacks, including ones they post while running, and
    /// returns once the queue is empty.
    pub fn run_until_idle(&self) {
        self.platform_run_loop.run_until_idle()
    }

    /// Number of posted callbacks waiting for their turn.
    pub fn pending_callbacks(&self) -> usize {
        self.platform_run_loop.pending_callbacks()
    }
}
