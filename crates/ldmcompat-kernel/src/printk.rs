//! Kernel log emulation
//!
//! Decoders report through `printk`, prefixing messages with kernel
//! priority tags (`<N>`). A message may arrive in several calls before its
//! terminating newline, so once a debug-priority message is dropped every
//! continuation fragment up to the newline must be dropped as well.
//!
//! ```text
//!            debug-priority text without '\n'
//!   Normal  ---------------------------------->  Suppressing
//!           <----------------------------------
//!            any text containing '\n' (dropped)
//! ```

use ldmcompat_common::LOG_LINE_SIZE;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

pub const KERN_EMERG: &str = "<0>";
pub const KERN_ALERT: &str = "<1>";
pub const KERN_CRIT: &str = "<2>";
pub const KERN_ERR: &str = "<3>";
pub const KERN_WARNING: &str = "<4>";
pub const KERN_NOTICE: &str = "<5>";
pub const KERN_INFO: &str = "<6>";
pub const KERN_DEBUG: &str = "<7>";

/// Banner the LDM decoder prints before its progress output
pub const LDM_MARKER: &str = " [LDM]";

/// Priority character of the lowest severity level
const DEBUG_PRIORITY: u8 = b'7';

/// Filter state carried between calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogState {
    #[default]
    Normal,
    /// Dropping fragments until a newline is seen
    Suppressing,
}

/// Decide what to print for one rendered fragment.
///
/// Returns the next state and the text to emit, if any.
pub fn filter(state: LogState, debug: bool, text: &str) -> (LogState, Option<&str>) {
    if state == LogState::Suppressing {
        let next = if text.contains('\n') {
            LogState::Normal
        } else {
            LogState::Suppressing
        };
        return (next, None);
    }

    if !debug && text == LDM_MARKER {
        return (LogState::Normal, None);
    }

    let bytes = text.as_bytes();
    if !debug && bytes.len() >= 2 && bytes[0] == b' ' && bytes[1].is_ascii_digit() {
        return (LogState::Normal, None);
    }

    if bytes.len() >= 3 && bytes[0] == b'<' && bytes[2] == b'>' {
        let body = &text[3..];
        if debug || bytes[1] != DEBUG_PRIORITY {
            return (LogState::Normal, Some(body));
        }
        let next = if text.contains('\n') {
            LogState::Normal
        } else {
            LogState::Suppressing
        };
        return (next, None);
    }

    (LogState::Normal, Some(text))
}

/// Bounded render target; keeps at most `cap` bytes and ignores
/// everything after the first truncation
struct LineBuf {
    buf: String,
    cap: usize,
    truncated: bool,
}

impl LineBuf {
    fn new(cap: usize) -> Self {
        Self {
            buf: String::with_capacity(cap),
            cap,
            truncated: false,
        }
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = self.cap - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
        } else {
            let mut end = room;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            self.buf.push_str(&s[..end]);
            self.truncated = true;
        }
        Ok(())
    }
}

/// Render `args` the way `vsnprintf` into a `LOG_LINE_SIZE` buffer would
pub fn render(args: fmt::Arguments<'_>) -> String {
    let mut line = LineBuf::new(LOG_LINE_SIZE - 1);
    // A Display impl failing only shortens the message
    let _ = fmt::write(&mut line, args);
    line.buf
}

struct LogInner {
    state: LogState,
    sink: Box<dyn Write + Send>,
}

/// Kernel log with suppression state
pub struct KernelLog {
    debug: AtomicBool,
    inner: Mutex<LogInner>,
}

impl KernelLog {
    /// Create a log writing to `sink`
    pub fn new(sink: impl Write + Send + 'static, debug: bool) -> Self {
        Self {
            debug: AtomicBool::new(debug),
            inner: Mutex::new(LogInner {
                state: LogState::Normal,
                sink: Box::new(sink),
            }),
        }
    }

    /// Create a log writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout(), false)
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Current suppression state
    pub fn state(&self) -> LogState {
        self.inner.lock().state
    }

    /// Log one fragment, returning the number of bytes printed
    pub fn log(&self, args: fmt::Arguments<'_>) -> usize {
        let text = render(args);
        let debug = self.is_debug();

        let mut inner = self.inner.lock();
        let (next, out) = filter(inner.state, debug, &text);
        if next != inner.state {
            trace!(from = ?inner.state, to = ?next, "printk state change");
        }
        inner.state = next;

        let Some(out) = out else {
            return 0;
        };
        if let Err(e) = inner
            .sink
            .write_all(out.as_bytes())
            .and_then(|()| inner.sink.flush())
        {
            debug!(error = %e, "kernel log sink write failed");
            return 0;
        }
        out.len()
    }
}

impl fmt::Debug for KernelLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelLog")
            .field("debug", &self.is_debug())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Shared in-memory sink
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.buf.lock().clear();
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

static KLOG: OnceLock<KernelLog> = OnceLock::new();

/// Process-wide kernel log, printing to standard output
pub fn klog() -> &'static KernelLog {
    KLOG.get_or_init(KernelLog::stdout)
}

/// Log through the process-wide kernel log
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => {
        $crate::printk::klog().log(::std::format_args!($($arg)*))
    };
}
