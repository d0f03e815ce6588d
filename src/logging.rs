//! `key=value` event lines emitted through the `log` facade.
//!
//! Every line starts with `event=<name>`, then the component tag of the
//! [`LogContext`] when one is given, then the event's own fields.

/// Target shared by every rangefetch event, for filtering in the logger.
pub(crate) const LOG_TARGET: &str = "rangefetch";

/// Component tag written after the event name.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LogContext {
    common_kv: &'static str,
}

impl LogContext {
    /// Tag events with `common_kv`; an empty string writes no tag.
    pub(crate) const fn new(common_kv: &'static str) -> Self {
        Self { common_kv }
    }

    pub(crate) fn common_kv(&self) -> Option<&'static str> {
        if self.common_kv.is_empty() {
            None
        } else {
            Some(self.common_kv)
        }
    }
}

/// Reads, fetches and buffer growth.
pub(crate) const FETCH_LOG_CTX: LogContext = LogContext::new("component=fetch");
/// Open, close and dispose.
pub(crate) const LIFECYCLE_LOG_CTX: LogContext = LogContext::new("component=lifecycle");

/// Log `event` with a formatted field list when `level` is enabled for the
/// rangefetch target. The `ctx:` arm inserts the context's component tag.
macro_rules! rangefetch_log {
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            if let Some(common_kv) = $ctx.common_kv() {
                log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {} {}",
                    $event,
                    common_kv,
                    format_args!($fmt $(, $args)*)
                );
            } else {
                log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {}",
                    $event,
                    format_args!($fmt $(, $args)*)
                );
            }
        }
    }};
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use rangefetch_log;
