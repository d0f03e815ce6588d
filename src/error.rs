use std::fmt;

use crate::engine::EngineError;

/// Column of a record: its key or its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Key column.
    Key,
    /// Value column.
    Value,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Key => f.write_str("key"),
            Side::Value => f.write_str("value"),
        }
    }
}

/// Error returned by every fallible operation of the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database or a buffer was configured in a way the operation cannot use.
    #[error("{message}, {context}")]
    Configuration {
        /// What is misconfigured.
        message: String,
        /// Description of the resource.
        context: String,
    },
    /// A fixed-size column cannot hold a record.
    #[error(
        "requested {side} length [{required}] is greater than size [{size}] of fixed buffer, \
         {context}"
    )]
    CapacityExceeded {
        /// Overflowing column.
        side: Side,
        /// Bytes the record needs.
        required: usize,
        /// Configured fixed size.
        size: usize,
        /// Description of the resource.
        context: String,
    },
    /// The storage engine reported a failure.
    #[error("api [{api}] failed, error code [{code}], {message}, {context}")]
    Store {
        /// Engine call that failed.
        api: &'static str,
        /// Engine error number.
        code: i32,
        /// Engine error text.
        message: String,
        /// Description of the resource.
        context: String,
    },
    /// The cursor, database or environment was already released.
    #[error("{context} is released")]
    Disposed {
        /// Description of the released resource.
        context: String,
    },
    /// The engine kept reporting short buffers after the retry ceiling.
    #[error("{message}, {context}")]
    Protocol {
        /// What went wrong.
        message: String,
        /// Description of the resource.
        context: String,
    },
    /// Indexing outside the valid cells of a table or segment.
    #[error("{message}")]
    OutOfBounds {
        /// Offending indices.
        message: String,
    },
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>, context: &str) -> Self {
        Error::Configuration {
            message: message.into(),
            context: context.to_owned(),
        }
    }

    pub(crate) fn store(api: &'static str, source: EngineError, context: &str) -> Self {
        Error::Store {
            api,
            code: source.code,
            message: source.message,
            context: context.to_owned(),
        }
    }

    pub(crate) fn disposed(context: &str) -> Self {
        Error::Disposed {
            context: context.to_owned(),
        }
    }

    pub(crate) fn out_of_bounds(message: impl Into<String>) -> Self {
        Error::OutOfBounds {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_carries_context() {
        let err = Error::store(
            "cursor.get",
            EngineError::new(22, "invalid argument"),
            "database (file name [db.bin], database name [main])",
        );
        assert_eq!(
            err.to_string(),
            "api [cursor.get] failed, error code [22], invalid argument, database (file name \
             [db.bin], database name [main])"
        );
    }

    #[test]
    fn capacity_error_names_side() {
        let err = Error::CapacityExceeded {
            side: Side::Value,
            required: 7,
            size: 4,
            context: "values, db".into(),
        };
        assert_eq!(
            err.to_string(),
            "requested value length [7] is greater than size [4] of fixed buffer, values, db"
        );
    }
}
