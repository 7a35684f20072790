use std::{fmt::Display, mem::ManuallyDrop, thread};

use log::error;

use crate::{get_system_thread_id, RunLoopSender, SystemThreadId};

/// Wraps a value that must only be touched on the thread that created it
/// (usually the owner thread of a run loop), so that it can travel inside
/// closures posted from other threads.
///
/// Access from any other thread fails with [`OwnerBoundError::WrongThread`].
pub struct OwnerBound<T>
where
    T: 'static,
{
    value: Option<T>,
    owner: SystemThreadId,
    sender: Option<RunLoopSender>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerBoundError {
    Empty,
    WrongThread {
        owner: SystemThreadId,
        current: SystemThreadId,
    },
}

impl Display for OwnerBoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerBoundError::Empty => write!(f, "value was already taken"),
            OwnerBoundError::WrongThread { owner, current } => write!(
                f,
                "value owned by thread {owner:?} accessed from thread {current:?}"
            ),
        }
    }
}

impl std::error::Error for OwnerBoundError {}

impl<T> OwnerBound<T>
where
    T: 'static,
{
    /// Binds the value to the current thread. If the value is still inside
    /// when the wrapper is dropped on another thread it is leaked, because it
    /// can not be dropped safely there.
    pub fn new(value: T) -> Self {
        Self {
            value: Some(value),
            owner: get_system_thread_id(),
            sender: None,
        }
    }

    /// Binds the value to the current thread, which must be the thread the
    /// `sender` posts to. A value dropped on another thread is posted back and
    /// dropped on the owner thread.
    pub fn new_with_sender(value: T, sender: RunLoopSender) -> Self {
        Self {
            value: Some(value),
            owner: get_system_thread_id(),
            sender: Some(sender),
        }
    }

    pub fn is_owner_thread(&self) -> bool {
        self.owner == get_system_thread_id()
    }

    fn check_thread(&self) -> Result<(), OwnerBoundError> {
        let current = get_system_thread_id();
        if current == self.owner {
            Ok(())
        } else {
            Err(OwnerBoundError::WrongThread {
                owner: self.owner,
                current,
            })
        }
    }

    pub fn get(&self) -> Result<&T, OwnerBoundError> {
        self.check_thread()?;
        self.value.as_ref().ok_or(OwnerBoundError::Empty)
    }

    pub fn get_mut(&mut self) -> Result<&mut T, OwnerBoundError> {
        self.check_thread()?;
        self.value.as_mut().ok_or(OwnerBoundError::Empty)
    }

    pub fn take(&mut self) -> Result<T, OwnerBoundError> {
        self.check_thread()?;
        self.value.take().ok_or(OwnerBoundError::Empty)
    }
}

impl<T> Drop for OwnerBound<T> {
    fn drop(&mut self) {
        if self.value.is_none() || self.owner == get_system_thread_id() {
            return;
        }
        let value = Carry(ManuallyDrop::new(self.value.take()));
        match self.sender.as_ref() {
            Some(sender) => {
                let owner = self.owner;
                sender.send(move || {
                    let value = value.into_inner();
                    if owner == get_system_thread_id() {
                        drop(ManuallyDrop::into_inner(value));
                    } else {
                        error!("OwnerBound value sent to a thread other than its owner, leaking it");
                    }
                });
            }
            None => {
                if !thread::panicking() {
                    error!(
                        "OwnerBound value dropped on thread {:?} instead of {:?}, leaking it",
                        get_system_thread_id(),
                        self.owner
                    );
                }
            }
        }
    }
}

// Access is checked against the owner thread on every call, and values left
// inside are only ever dropped on the owner thread (or leaked).
unsafe impl<T> Send for OwnerBound<T> {}
unsafe impl<T> Sync for OwnerBound<T> {}

struct Carry<T>(ManuallyDrop<T>);

impl<T> Carry<T> {
    // Call as a method so that closures capture the whole `Carry`.
    fn into_inner(self) -> ManuallyDrop<T> {
        self.0
    }
}

unsafe impl<T> Send for Carry<T> {}
