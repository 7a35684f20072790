use std::{
    fmt::Display,
    pin::Pin,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::{channel::oneshot, Future};

/// Lifecycle of a callback posted to the owner thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not (yet) in the run loop queue. A task stays here if the
    /// run loop no longer exists.
    Idle,
    /// Waiting in the owner thread queue.
    ScheduledOnOwnerThread,
    /// Currently running on the owner thread.
    Executing,
    /// Finished running. Awaiting the task tells a completed callback from
    /// one that panicked.
    Done,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::ScheduledOnOwnerThread,
            2 => TaskState::Executing,
            3 => TaskState::Done,
            _ => TaskState::Idle,
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Idle => write!(f, "idle"),
            TaskState::ScheduledOnOwnerThread => write!(f, "scheduled on owner thread"),
            TaskState::Executing => write!(f, "executing"),
            TaskState::Done => write!(f, "done"),
        }
    }
}

/// How a posted task ended, as observed by awaiting [`PostedTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The task was dropped without running to completion, either because the
    /// run loop went away or because the callback panicked.
    Dropped,
}

/// Observer for a callback posted through [`crate::RunLoopSender::post`].
///
/// Dropping it does not cancel the callback; posting is fire-and-forget.
/// Awaiting it resolves once the callback finished on the owner thread.
pub struct PostedTask {
    state: Arc<AtomicU8>,
    done: oneshot::Receiver<()>,
}

impl PostedTask {
    pub(crate) fn new<F>(callback: F) -> (Self, impl FnOnce() + Send + 'static)
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(TaskState::Idle as u8));
        let (sender, receiver) = oneshot::channel();
        let task_state = state.clone();
        let run = move || {
            task_state.store(TaskState::Executing as u8, Ordering::SeqCst);
            let finished = MarkDone(task_state);
            callback();
            drop(finished);
            let _ = sender.send(());
        };
        (
            Self {
                state,
                done: receiver,
            },
            run,
        )
    }

    pub(crate) fn mark_scheduled(&self) {
        // The owner thread may already be executing the task.
        let _ = self.state.compare_exchange(
            TaskState::Idle as u8,
            TaskState::ScheduledOnOwnerThread as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

// Moves the task to `Done` when the callback returns or unwinds.
struct MarkDone(Arc<AtomicU8>);

impl Drop for MarkDone {
    fn drop(&mut self) {
        self.0.store(TaskState::Done as u8, Ordering::SeqCst);
    }
}

impl Future for PostedTask {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.done).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(TaskOutcome::Completed),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(TaskOutcome::Dropped),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{Arc, Mutex},
        thread,
    };

    use futures::executor::block_on;

    use crate::{RunLoop, TaskOutcome, TaskState};

    #[test]
    fn test_state_transitions() {
        let run_loop = RunLoop::current();
        let sender = run_loop.new_sender();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();

        let first = sender.post(|| {});
        assert_eq!(first.state(), TaskState::ScheduledOnOwnerThread);

        let first_state = Arc::new(Mutex::new(first));
        let first_state_clone = first_state.clone();
        let second = sender.post(move || {
            *observed_clone.lock().unwrap() = Some(first_state_clone.lock().unwrap().state());
        });

        run_loop.run_until_idle();
        assert_eq!(*observed.lock().unwrap(), Some(TaskState::Done));
        assert_eq!(second.state(), TaskState::Done);
        assert_eq!(block_on(second), TaskOutcome::Completed);
    }

    #[test]
    fn test_executing_state_is_visible_inside_callback() {
        let run_loop = RunLoop::current();
        let sender = run_loop.new_sender();
        let slot: Arc<Mutex<Option<crate::PostedTask>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let seen_clone = seen.clone();
        let task = sender.post(move || {
            let state = slot_clone.lock().unwrap().as_ref().map(|t| t.state());
            *seen_clone.lock().unwrap() = state;
        });
        *slot.lock().unwrap() = Some(task);
        run_loop.run_until_idle();
        assert_eq!(*seen.lock().unwrap(), Some(TaskState::Executing));
    }

    #[test]
    fn test_task_dropped_with_run_loop() {
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            tx.send(RunLoop::current().new_sender()).unwrap();
        })
        .join()
        .unwrap();
        let sender = rx.recv().unwrap();
        let task = sender.post(|| {});
        assert_eq!(task.state(), TaskState::Idle);
        assert_eq!(block_on(task), TaskOutcome::Dropped);
    }

    #[test]
    fn test_panicking_callback_finishes_as_dropped() {
        let run_loop = RunLoop::current();
        let sender = run_loop.new_sender();
        let task = sender.post(|| panic!("callback failed"));
        let unwound = panic::catch_unwind(AssertUnwindSafe(|| run_loop.run_until_idle()));
        assert!(unwound.is_err());
        assert_eq!(task.state(), TaskState::Done);
        assert_eq!(block_on(task), TaskOutcome::Dropped);
        assert_eq!(run_loop.pending_callbacks(), 0);
    }
}
