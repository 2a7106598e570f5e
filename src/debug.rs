use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Switch verbose diagnostics on or off for the whole process.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// `println!` that only prints when `--debug` was given.
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        if $crate::debug::is_verbose() {
            println!("[debug] {}", format_args!($($arg)*));
        }
    };
}

/// `eprintln!` that only prints when `--debug` was given.
#[macro_export]
macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if $crate::debug::is_verbose() {
            eprintln!("[debug] {}", format_args!($($arg)*));
        }
    };
}
