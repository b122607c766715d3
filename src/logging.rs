//! Wires the `log` crate facade to whatever console the board provides.
//!
//! The UART/console itself is an out-of-scope external collaborator (per
//! spec.md §1); this module only needs one narrow seam to reach it, the
//! [`Console`] trait. A `sim` build installs a stdout-backed console so the
//! whole crate is testable off-target.

use core::fmt;

use hermit_sync::OnceCell;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// The narrow seam onto the board's UART/console device.
pub trait Console: Sync + Send {
    fn write_str(&self, s: &str);
}

static CONSOLE: OnceCell<&'static dyn Console> = OnceCell::new();

pub fn init(console: &'static dyn Console, level: LevelFilter) {
    CONSOLE.set(console).ok();
    log::set_logger(&KERNEL_LOGGER).ok();
    log::set_max_level(level);
}

struct KernelLogger;

static KERNEL_LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(console) = CONSOLE.get() else {
            return;
        };
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = fmt::Write::write_fmt(
            &mut ConsoleWriter(*console),
            format_args!("[{tag}] {}\n", record.args()),
        );
    }

    fn flush(&self) {}
}

struct ConsoleWriter(&'static dyn Console);

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Backend for the `print!`/`println!` macros; bypasses level filtering.
pub fn _print(args: fmt::Arguments<'_>) {
    if let Some(console) = CONSOLE.get() {
        let _ = fmt::Write::write_fmt(&mut ConsoleWriter(*console), args);
    }
}

#[cfg(feature = "sim")]
pub mod sim {
    use super::Console;

    pub struct StdoutConsole;

    impl Console for StdoutConsole {
        fn write_str(&self, s: &str) {
            std::print!("{s}");
        }
    }

    pub static STDOUT_CONSOLE: StdoutConsole = StdoutConsole;

    pub fn install(level: log::LevelFilter) {
        super::init(&STDOUT_CONSOLE, level);
    }
}
