//! Logging subsystem: the backend behind the `log` facade.
//!
//! Two outputs can be chained: a stdio writer and a fixed-capacity ring
//! buffer. Sinks attach to the ring with their own severity filter, fill
//! threshold and read cursor; a record stays in the ring until every sink
//! has observed it. The networked log shipper is just another ring sink.
//!
//! Records may be produced from any call site but only one logical thread at
//! a time; the state sits behind a mutex and writes never block on anything
//! but it.

use applause_utils::{counter, Timespec64};
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt::Write as _;

pub const LOG_RING_MAX: usize = 512;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogFlags: u32 {
        const STDIO = 1 << 0;
        const RING  = 1 << 1;
        const QUIET = 1 << 2;
    }
}

impl LogFlags {
    pub const DEFAULT: Self = Self::STDIO;
    pub const FULL: Self = Self::STDIO.union(Self::RING);
}

/// One produced log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub ts: Timespec64,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub level: Level,
    pub msg: String,
}

type FlushFn = Box<dyn FnMut(&LogEntry) + Send>;

struct RingSink {
    token: u64,
    filter: Level,
    fill: usize,
    /// Index of the last slot this sink has emitted; `None` until the first
    /// flush ("before first record").
    rp: Option<usize>,
    flush: FlushFn,
}

struct Ring {
    slots: Vec<Option<LogEntry>>,
    wp: usize,
    sinks: Vec<RingSink>,
}

impl Ring {
    fn new() -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(LOG_RING_MAX).collect(),
            wp: 0,
            sinks: Vec::new(),
        }
    }

    fn flush_sink(slots: &[Option<LogEntry>], wp: usize, sink: &mut RingSink) {
        let size = slots.len();
        let start = match sink.rp {
            None => 0,
            Some(rp) => (rp + 1) % size,
        };
        let mut i = start;
        while i != wp {
            if let Some(entry) = &slots[i] {
                if entry.level <= sink.filter {
                    (sink.flush)(entry);
                }
                sink.rp = Some(i);
            }
            i = (i + 1) % size;
        }
    }

    /// The flush protocol: flush every sink that needs it (uninitialized
    /// cursor, imminent overwrite, or fill threshold reached; all of them
    /// when `force`d), then drop the records every sink has observed.
    fn flush(&mut self, force: bool) {
        if self.sinks.is_empty() {
            return;
        }

        let wp = self.wp;
        let size = self.slots.len();
        for sink in self.sinks.iter_mut() {
            let needed = force
                || sink.rp.is_none()
                || self.slots[wp].is_some()
                || {
                    let fill = match sink.rp {
                        None => size,
                        Some(rp) => (wp + size - (rp + 1) % size) % size,
                    };
                    fill >= sink.fill
                };
            if needed {
                Self::flush_sink(&self.slots, wp, sink);
            }
        }

        // A slot is reclaimable once no sink still has it ahead of its
        // cursor.
        for i in 0..size {
            if self.slots[i].is_none() {
                continue;
            }
            let unobserved = self.sinks.iter().any(|sink| {
                let start = match sink.rp {
                    None => return true,
                    Some(rp) => (rp + 1) % size,
                };
                // Is i within [start, wp) walking forward around the ring?
                let span = (wp + size - start) % size;
                let off = (i + size - start) % size;
                off < span
            });
            if !unobserved {
                self.slots[i] = None;
            }
        }
    }

    fn push(&mut self, entry: LogEntry) {
        self.flush(false);
        self.slots[self.wp] = Some(entry);
        self.wp = (self.wp + 1) % self.slots.len();
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

struct LoggerState {
    flags: LogFlags,
    floor: LevelFilter,
    ring: Ring,
    up: bool,
}

static STATE: Lazy<Mutex<LoggerState>> = Lazy::new(|| {
    Mutex::new(LoggerState {
        flags: LogFlags::DEFAULT,
        floor: LevelFilter::Debug,
        ring: Ring::new(),
        up: false,
    })
});

struct EngineLogger;

static LOGGER: EngineLogger = EngineLogger;

impl log::Log for EngineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= STATE.lock().floor
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        submit(
            record.level(),
            record.module_path().unwrap_or("?"),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {
        STATE.lock().ring.flush(true);
    }
}

/// Installs the backend. Safe to call more than once; later calls only
/// adjust the output flags.
pub fn init(flags: LogFlags) {
    let mut state = STATE.lock();
    state.flags = flags;
    if !state.up {
        state.up = true;
        if flags.contains(LogFlags::QUIET) {
            state.floor = LevelFilter::Info;
        }
        drop(state);
        // Another logger may already be installed (tests); that's fine.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
        log::debug!("logger initialized, applause {}", crate::VERSION);
    }
}

pub fn set_floor(floor: LevelFilter) {
    STATE.lock().floor = floor;
}

pub fn floor() -> LevelFilter {
    STATE.lock().floor
}

static ABORT_ON_ERROR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// When set, an error-level record aborts the process right after being
/// emitted (the `--aoe` debugging aid).
pub fn set_abort_on_error(abort: bool) {
    ABORT_ON_ERROR.store(abort, std::sync::atomic::Ordering::Relaxed);
}

/// Command-driven verbosity flip: debug <-> trace.
pub fn toggle_noise() {
    let mut state = STATE.lock();
    state.floor = if state.floor == LevelFilter::Trace {
        LevelFilter::Debug
    } else {
        LevelFilter::Trace
    };
}

fn stdio_emit(entry: &LogEntry) {
    use std::io::Write;

    let source_relevant = entry.level >= Level::Debug || entry.level <= Level::Warn;
    let file = entry.file.rsplit(['/', '\\']).next().unwrap_or("?");
    let prefix = if source_relevant {
        format!("[{}:{} @{}] ", file, entry.line, entry.module)
    } else {
        String::new()
    };

    if entry.level <= Level::Warn {
        let _ = writeln!(std::io::stderr(), "{}{}", prefix, entry.msg);
    } else {
        let _ = writeln!(std::io::stdout(), "{}{}", prefix, entry.msg);
    }
}

/// Produces one record into the configured outputs. The `log` macros land
/// here; tests may call it directly.
pub fn submit(level: Level, module: &str, file: &str, line: u32, msg: &str) {
    let mut state = STATE.lock();
    if level > state.floor {
        return;
    }

    let entry = LogEntry {
        ts: Timespec64::now(),
        module: module.to_string(),
        file: file.to_string(),
        line,
        level,
        msg: msg.to_string(),
    };

    if state.flags.contains(LogFlags::STDIO) {
        stdio_emit(&entry);
    }
    if state.flags.contains(LogFlags::RING) {
        state.ring.push(entry);
    }
    drop(state);

    if level == Level::Error && ABORT_ON_ERROR.load(std::sync::atomic::Ordering::Relaxed) {
        std::process::abort();
    }
}

/// Attaches a sink to the ring. `filter` is the least severe level the sink
/// accepts, `fill` the number of buffered records that forces a flush.
///
/// The flush callback runs with the logger state locked and must not log.
pub fn ring_sink_add(filter: Level, fill: usize, flush: impl FnMut(&LogEntry) + Send + 'static) -> u64 {
    let token = counter::next();
    STATE.lock().ring.sinks.push(RingSink {
        token,
        filter,
        fill,
        rp: None,
        flush: Box::new(flush),
    });
    token
}

pub fn ring_sink_del(token: u64) {
    let mut state = STATE.lock();
    state.ring.sinks.retain(|sink| sink.token != token);
}

/// Flushes all ring sinks regardless of thresholds; used at teardown.
pub fn ring_flush() {
    STATE.lock().ring.flush(true);
}

/// Dumps a buffer at debug level, 16 bytes a row, hex plus printable column.
pub fn hexdump(buf: &[u8]) {
    for row in buf.chunks(16) {
        let mut line = String::with_capacity(16 * 4 + 4);
        for byte in row {
            let _ = write!(line, "{byte:02x} ");
        }
        for _ in row.len()..16 {
            line.push_str("   ");
        }
        line.push(' ');
        for byte in row {
            line.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        log::debug!("XD: {line}");
    }
}
