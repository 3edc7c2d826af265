//! Debug configuration from environment variables.
//!
//! Flags are parsed once, at heap construction, and never re-read. Lookups
//! go through `libc::getenv` rather than `std::env`: the allocator may be
//! the process allocator, and `std::env::var` allocates an owned string on
//! every hit.

use std::ffi::{CStr, c_char};

/// Instrumentation toggles, all off by default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebugFlags {
    /// `MALLOC_SCRIBBLE`: fill released tiny/small payloads with 0xDE.
    pub scribble: bool,
    /// `MALLOC_PRE_SCRIBBLE`: fill fresh allocations with 0xAA before
    /// returning them.
    pub pre_scribble: bool,
    /// `MALLOC_GUARD`: reserved guard-checking toggle; currently a no-op
    /// extension point.
    pub guard: bool,
    /// `MALLOC_STACK_LOGGING`: record every allocate/release in the
    /// bounded history ring.
    pub stack_logging: bool,
    /// `MALLOC_CHECK_`: checking intensity 0-3, advisory only.
    pub check_level: i32,
}

fn env_present(name: &CStr) -> bool {
    // SAFETY: getenv with a NUL-terminated name has no other preconditions.
    unsafe { !libc::getenv(name.as_ptr()).is_null() }
}

fn env_int(name: &CStr) -> Option<i32> {
    // SAFETY: getenv returns null or a NUL-terminated string owned by the
    // environment, valid for the duration of this read.
    let raw: *const c_char = unsafe { libc::getenv(name.as_ptr()) };
    if raw.is_null() {
        return None;
    }
    // SAFETY: non-null getenv results are NUL-terminated.
    let value = unsafe { CStr::from_ptr(raw) };
    value.to_str().ok()?.trim().parse::<i32>().ok()
}

impl DebugFlags {
    /// Reads all five settings from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            scribble: env_present(c"MALLOC_SCRIBBLE"),
            pre_scribble: env_present(c"MALLOC_PRE_SCRIBBLE"),
            guard: env_present(c"MALLOC_GUARD"),
            stack_logging: env_present(c"MALLOC_STACK_LOGGING"),
            check_level: env_int(c"MALLOC_CHECK_").unwrap_or(0).clamp(0, 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_off() {
        let flags = DebugFlags::default();
        assert!(!flags.scribble);
        assert!(!flags.pre_scribble);
        assert!(!flags.guard);
        assert!(!flags.stack_logging);
        assert_eq!(flags.check_level, 0);
    }

    #[test]
    fn env_roundtrip() {
        // Process-global environment mutation; keep both cases in one test
        // to avoid ordering races with parallel test threads.
        // SAFETY: test-only env mutation, no other thread reads these names.
        unsafe {
            std::env::set_var("MALLOC_SCRIBBLE", "1");
            std::env::set_var("MALLOC_CHECK_", "2");
        }
        let flags = DebugFlags::from_env();
        assert!(flags.scribble);
        assert_eq!(flags.check_level, 2);

        // SAFETY: as above.
        unsafe {
            std::env::set_var("MALLOC_CHECK_", "99");
        }
        assert_eq!(
            DebugFlags::from_env().check_level,
            3,
            "check level must clamp to the 0-3 range"
        );

        // SAFETY: as above.
        unsafe {
            std::env::remove_var("MALLOC_SCRIBBLE");
            std::env::remove_var("MALLOC_CHECK_");
        }
        let cleared = DebugFlags::from_env();
        assert!(!cleared.scribble);
        assert_eq!(cleared.check_level, 0);
    }
}
