//! Real-time-safe logging.
//!
//! `rt_log!` formats into a fixed-size entry and pushes it onto a lock-free
//! ring; nothing on the audio thread allocates or touches the filesystem.
//! Entries are written out by `drain_to_file` from non-real-time code. The
//! whole mechanism compiles away unless the `debug` feature is enabled.

use std::fmt;

#[cfg(feature = "debug")]
pub mod logger {
    use std::cell::UnsafeCell;
    use std::fmt;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    const LOG_CAP: usize = 256;
    const LOG_MSG_MAX: usize = 256;
    const LOG_PATH: &str = "/tmp/rnnoise_vox.log";

    #[derive(Copy, Clone)]
    struct LogEntry {
        len: u16,
        bytes: [u8; LOG_MSG_MAX],
    }

    impl Default for LogEntry {
        fn default() -> Self {
            Self {
                len: 0,
                bytes: [0; LOG_MSG_MAX],
            }
        }
    }

    /// Single-producer (audio thread), single-consumer (drain) ring.
    struct LogRing {
        head: AtomicUsize,
        tail: AtomicUsize,
        buf: Box<[UnsafeCell<LogEntry>]>,
    }

    unsafe impl Sync for LogRing {}

    impl LogRing {
        fn new() -> Self {
            let buf = (0..LOG_CAP)
                .map(|_| UnsafeCell::new(LogEntry::default()))
                .collect::<Vec<_>>()
                .into_boxed_slice();
            Self {
                head: AtomicUsize::new(0),
                tail: AtomicUsize::new(0),
                buf,
            }
        }

        fn push(&self, entry: LogEntry) {
            let cap = self.buf.len();
            let head = self.head.load(Ordering::Relaxed);
            let next = (head + 1) % cap;
            if next == self.tail.load(Ordering::Acquire) {
                // full, drop the message
                return;
            }
            unsafe {
                *self.buf[head].get() = entry;
            }
            self.head.store(next, Ordering::Release);
        }

        fn pop(&self) -> Option<LogEntry> {
            let cap = self.buf.len();
            let tail = self.tail.load(Ordering::Relaxed);
            if tail == self.head.load(Ordering::Acquire) {
                return None;
            }
            let entry = unsafe { *self.buf[tail].get() };
            self.tail.store((tail + 1) % cap, Ordering::Release);
            Some(entry)
        }
    }

    static LOGGER: OnceLock<LogRing> = OnceLock::new();
    static LOG_ENABLED: AtomicBool = AtomicBool::new(false);

    pub fn init_logger() {
        let _ = LOGGER.get_or_init(LogRing::new);
        LOG_ENABLED.store(true, Ordering::Relaxed);
    }

    struct FixedBuf {
        entry: LogEntry,
    }

    impl fmt::Write for FixedBuf {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let len = self.entry.len as usize;
            let avail = LOG_MSG_MAX - len;
            let n = s.len().min(avail);
            self.entry.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.entry.len += n as u16;
            Ok(())
        }
    }

    pub fn log_args(args: fmt::Arguments) {
        if !LOG_ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(logger) = LOGGER.get() else {
            return;
        };
        let mut buf = FixedBuf {
            entry: LogEntry::default(),
        };
        let _ = fmt::write(&mut buf, args);
        logger.push(buf.entry);
    }

    pub fn drain_to_file() {
        if !LOG_ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(logger) = LOGGER.get() else {
            return;
        };
        let mut file = match OpenOptions::new().create(true).append(true).open(LOG_PATH) {
            Ok(f) => f,
            Err(_) => return,
        };
        while let Some(entry) = logger.pop() {
            let len = entry.len as usize;
            if len == 0 {
                continue;
            }
            let msg = std::str::from_utf8(&entry.bytes[..len]).unwrap_or("<invalid>");
            let _ = writeln!(file, "{}", msg);
        }
    }
}

#[cfg(feature = "debug")]
pub(crate) fn rt_log_inner(args: fmt::Arguments) {
    logger::log_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn rt_log_inner(_args: fmt::Arguments) {}

/// Drain queued real-time messages to the log file. No-op without `debug`.
pub fn drain() {
    #[cfg(feature = "debug")]
    logger::drain_to_file();
}

/// Enable the real-time ring. No-op without `debug`.
pub fn init() {
    #[cfg(feature = "debug")]
    logger::init_logger();
}

#[macro_export]
macro_rules! rt_log {
    ($($arg:tt)*) => {
        $crate::debug::rt_log_inner(format_args!($($arg)*))
    };
}
