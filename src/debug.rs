//! Real-time safe logging for the limiter.
//!
//! Messages are formatted into fixed-size entries of a lock-free ring and
//! forwarded to the `log` crate later from a non-real-time callback.
//! Compiled out unless the `debug` feature is enabled.

use std::fmt;

#[cfg(feature = "debug")]
pub mod logger {
    use std::cell::UnsafeCell;
    use std::fmt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    const LOG_CAP: usize = 128;
    const LOG_MSG_MAX: usize = 256;

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

    impl LogEntry {
        fn as_str(&self) -> &str {
            let bytes = &self.bytes[..self.len as usize];
            match std::str::from_utf8(bytes) {
                Ok(s) => s,
                // Truncation may split a code point.
                Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
            }
        }
    }

    impl fmt::Write for LogEntry {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let len = self.len as usize;
            let n = s.len().min(LOG_MSG_MAX - len);
            self.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.len = (len + n) as u16;
            Ok(())
        }
    }

    // Single producer (audio thread), single consumer (drain).
    struct LogRing {
        head: AtomicUsize,
        tail: AtomicUsize,
        buf: Box<[UnsafeCell<LogEntry>]>,
    }

    unsafe impl Sync for LogRing {}

    impl LogRing {
        fn new() -> Self {
            Self {
                head: AtomicUsize::new(0),
                tail: AtomicUsize::new(0),
                buf: (0..LOG_CAP)
                    .map(|_| UnsafeCell::new(LogEntry::default()))
                    .collect(),
            }
        }

        fn push(&self, entry: &LogEntry) {
            let cap = self.buf.len();
            let head = self.head.load(Ordering::Relaxed);
            let next = (head + 1) % cap;
            if next == self.tail.load(Ordering::Acquire) {
                return;
            }
            unsafe {
                *self.buf[head].get() = *entry;
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

    pub fn log_args(args: fmt::Arguments) {
        if !LOG_ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(ring) = LOGGER.get() else {
            return;
        };

        let mut entry = LogEntry::default();
        let _ = fmt::write(&mut entry, args);
        ring.push(&entry);
    }

    /// Forwards queued messages to `log::debug!`. Call from a non-real-time context.
    pub fn drain() {
        let Some(ring) = LOGGER.get() else {
            return;
        };
        while let Some(entry) = ring.pop() {
            if entry.len > 0 {
                log::debug!("{}", entry.as_str());
            }
        }
    }
}

#[cfg(feature = "debug")]
pub(crate) fn rt_log_inner(args: fmt::Arguments) {
    logger::log_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn rt_log_inner(_args: fmt::Arguments) {}

#[macro_export]
macro_rules! rt_log {
    ($($arg:tt)*) => {
        $crate::debug::rt_log_inner(format_args!($($arg)*))
    };
}
