mod sys;

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, Weak},
};

type SenderCallback = Box<dyn FnOnce() + Send>;

struct Queue {
    callbacks: VecDeque<SenderCallback>,
    stopped: bool,
}

// Part of the run loop that is reachable from other threads.
struct Shared {
    queue: Mutex<Queue>,
    condvar: Condvar,
}

/// Run loop backed by a condition variable. Callbacks sent from any thread
/// land in a single FIFO queue and are executed one at a time on the thread
/// that runs the loop.
pub struct PlatformRunLoop {
    shared: Arc<Shared>,
}

impl PlatformRunLoop {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    callbacks: VecDeque::new(),
                    stopped: false,
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    // Blocks until a callback is queued. `None` once the loop is stopped.
    fn wait_next(&self) -> Option<SenderCallback> {
        let mut queue = self.shared.queue.lock().unwrap();
        loop {
            if queue.stopped {
                return None;
            }
            if let Some(callback) = queue.callbacks.pop_front() {
                return Some(callback);
            }
            queue = self.shared.condvar.wait(queue).unwrap();
        }
    }

    pub fn run(&self) {
        self.shared.queue.lock().unwrap().stopped = false;
        // The lock is released before the callback runs so it can post more.
        while let Some(callback) = self.wait_next() {
            callback();
        }
    }

    pub fn stop(&self) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.stopped = true;
        self.shared.condvar.notify_all();
    }

    /// Executes queued callbacks until the queue is empty. Never blocks
    /// waiting for new work.
    pub fn run_until_idle(&self) {
        loop {
            let next = self.shared.queue.lock().unwrap().callbacks.pop_front();
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    pub fn pending_callbacks(&self) -> usize {
        self.shared.queue.lock().unwrap().callbacks.len()
    }

    pub fn new_sender(&self) -> PlatformRunLoopSender {
        PlatformRunLoopSender {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

#[derive(Clone)]
pub struct PlatformRunLoopSender {
    shared: Weak<Shared>,
}

impl PlatformRunLoopSender {
    /// Appends the callback to the run loop queue. Returns `false` (and drops
    /// the callback) if the run loop no longer exists.
    pub fn send<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + 'static + Send,
    {
        match self.shared.upgrade() {
            Some(shared) => {
                let mut queue = shared.queue.lock().unwrap();
                queue.callbacks.push_back(Box::new(callback));
                shared.condvar.notify_all();
                true
            }
            None => false,
        }
    }
}

pub(crate) type PlatformThreadId = usize;

#[cfg(unix)]
pub(crate) fn get_system_thread_id() -> PlatformThreadId {
    unsafe { sys::libc::pthread_self() }
}

#[cfg(windows)]
pub(crate) fn get_system_thread_id() -> PlatformThreadId {
    unsafe { sys::kernel32::GetCurrentThreadId() as PlatformThreadId }
}
