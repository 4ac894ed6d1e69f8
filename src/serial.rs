//! Serial console logging.
//!
//! The board wires a UART (or any other byte sink) in with [`init`]. After
//! that every `log` record from the stack is written as one
//! `[LEVEL] target: message` line, and [`serial_print!`] /
//! [`serial_println!`] write raw text to the same sink.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Anything the console can be written to.
pub type Sink = &'static mut (dyn Write + Send);

static SINK: Mutex<Option<Sink>> = Mutex::new(None);
static LOGGER: SerialLogger = SerialLogger;

/// `log` backend writing to the registered serial sink.
pub struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(sink) = SINK.lock().as_mut() {
            // A console that can't keep up just loses the line
            let _ = writeln!(sink, "[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Register the console sink and install [`SerialLogger`] as the global logger.
///
/// The sink is replaced even when a logger was already installed, so a board
/// can move the console to another UART later on.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    *SINK.lock() = Some(sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Detach the console sink; later output is discarded.
pub fn detach() -> Option<Sink> {
    SINK.lock().take()
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    if let Some(sink) = SINK.lock().as_mut() {
        let _ = sink.write_fmt(args);
    }
}

/// Prints to the serial console.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Prints to the serial console, appending a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}

#[cfg(test)]
mod tests {
    use super::*;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    struct Capture;

    impl Write for Capture {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            CAPTURED.lock().push_str(s);
            Ok(())
        }
    }

    #[test]
    fn test_logger_and_println_share_sink() {
        let sink: &'static mut Capture = Box::leak(Box::new(Capture));
        init(sink, LevelFilter::Info).unwrap();

        log::info!(target: "udp", "bound port {}", 6454);
        log::debug!(target: "udp", "filtered out");
        crate::serial_println!("Inet      : {}", "10.0.0.2");

        let captured = CAPTURED.lock().clone();
        assert!(captured.contains("[INFO] udp: bound port 6454\n"));
        assert!(!captured.contains("filtered out"));
        assert!(captured.contains("Inet      : 10.0.0.2\n"));

        assert!(detach().is_some());
        assert!(detach().is_none());
    }
}
