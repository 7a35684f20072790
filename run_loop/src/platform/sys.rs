// Only the thread identifier is needed, no need to pull entire libc as dependency
#[cfg(unix)]
#[allow(non_camel_case_types)]
pub mod libc {
    pub type pthread_t = usize;

    extern "C" {
        pub fn pthread_self() -> pthread_t;
    }
}

#[cfg(windows)]
#[allow(non_snake_case)]
pub mod kernel32 {
    pub type DWORD = u32;

    #[link(name = "kernel32")]
    extern "system" {
        pub fn GetCurrentThreadId() -> DWORD;
    }
}
