//! Failures a caller is expected to handle.
//!
//! Spec fatal/invariant-violation failures are not represented here: those
//! use [`kernel_assert`] / [`kernel_assert_eq`] and halt instead of
//! returning, because by definition nothing upstream can recover from them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum KernelError {
    #[error("operation timed out")]
    Timeout,

    #[error("resource pool exhausted")]
    PoolExhausted,

    #[error("socket is closed")]
    SocketClosed,

    #[error("no route to host")]
    NoRoute,

    #[error("address already in use")]
    AddressInUse,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("buffer too small")]
    BufferTooSmall,

    #[error("name resolution failed")]
    ResolutionFailed,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("network device busy")]
    DeviceBusy,
}

pub type KernelResult<T> = Result<T, KernelError>;

/// Fatal assertion: logs then traps. Used for invariant violations that the
/// original RTOS handled by dropping into `OS_Assert` and halting, not by
/// returning an error code.
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            $crate::error::fatal(concat!("assertion failed: ", stringify!($cond)), file!(), line!());
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::error::fatal(&alloc::format!($($arg)+), file!(), line!());
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_eq {
    ($left:expr, $right:expr) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::error::fatal(
                        &alloc::format!(
                            "assertion failed: `(left == right)`\n  left: `{:?}`\n right: `{:?}`",
                            left_val, right_val
                        ),
                        file!(),
                        line!(),
                    );
                }
            }
        }
    };
}

/// Logs a fatal condition and halts. Never returns.
///
/// Mirrors the original RTOS's `OS_Assert` which, on the bare soft core,
/// parked the CPU in a tight loop for a JTAG debugger to attach.
#[cold]
pub fn fatal(message: &str, file: &str, line: u32) -> ! {
    log::error!("fatal: {message} at {file}:{line}");
    #[cfg(feature = "sim")]
    {
        panic!("fatal: {message} at {file}:{line}");
    }
    #[cfg(not(feature = "sim"))]
    loop {
        core::hint::spin_loop();
    }
}
