use crate::platform;

#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug)]
pub struct SystemThreadId(platform::PlatformThreadId);

/// Returns the native identifier of the calling thread.
///
/// Unlike [`std::thread::ThreadId`] this can be queried while thread locals
/// are being destroyed, which is when thread-bound values left in a posted
/// closure are typically dropped. Identifiers may be reused by later threads.
pub fn get_system_thread_id() -> SystemThreadId {
    SystemThreadId(platform::get_system_thread_id())
}
