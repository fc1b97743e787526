//! Per-session log mask over `tracing`.
//!
//! The `log` connection parameter is a bitmask: 1 traces method entry and
//! exit, 2 logs bind values and escape directives, 4 dumps decoded rows and
//! column metadata. Events go to whatever `tracing` subscriber the
//! application installed; a session with mask 0 emits nothing.

pub const LOG_TRACE: u32 = 1;
pub const LOG_DEBUG: u32 = 2;
pub const LOG_DUMP: u32 = 4;

/// Log settings of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogMask(u32);

impl LogMask {
    pub fn new(mask: u32) -> Self {
        Self(mask)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn trace_enabled(&self) -> bool {
        self.0 & LOG_TRACE != 0
    }

    pub fn debug_enabled(&self) -> bool {
        self.0 & LOG_DEBUG != 0
    }

    pub fn dump_enabled(&self) -> bool {
        self.0 & LOG_DUMP != 0
    }

    /// Log entry into a driver method.
    pub fn enter(&self, method: &str) {
        if self.trace_enabled() {
            tracing::trace!(method, "entering");
        }
    }

    /// Log exit from a driver method.
    pub fn leave(&self, method: &str) {
        if self.trace_enabled() {
            tracing::trace!(method, "leaving");
        }
    }

    /// Log a debug message built lazily.
    pub fn debug(&self, message: impl FnOnce() -> String) {
        if self.debug_enabled() {
            tracing::debug!("{}", message());
        }
    }

    /// Log a dump message built lazily.
    pub fn dump(&self, message: impl FnOnce() -> String) {
        if self.dump_enabled() {
            tracing::debug!(target: "teradatasql_rs::dump", "{}", message());
        }
    }
}

/// Scope guard pairing [`LogMask::enter`] with [`LogMask::leave`], so the
/// exit is logged on error paths too.
pub struct MethodScope {
    mask: LogMask,
    method: &'static str,
}

impl MethodScope {
    pub fn new(mask: LogMask, method: &'static str) -> Self {
        mask.enter(method);
        Self { mask, method }
    }
}

impl Drop for MethodScope {
    fn drop(&mut self) {
        self.mask.leave(self.method);
    }
}
