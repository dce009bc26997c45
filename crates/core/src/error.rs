//! Error types for the L3 replay backtester.
//!
//! [`BookError`] is always fatal to a run; [`ExecError`] is always recoverable.

use thiserror::Error;

use crate::types::{IntentId, OrderId, OrderSide, PriceTicks, Quantity, RejectReason, TimestampNs};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the backtester.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A latency setting was negative.
    #[error("Latency configuration error: {name} = {value}us is negative")]
    LatencyConfiguration { name: String, value: i64 },

    /// Data error (invalid or missing data).
    #[error("Data error: {0}")]
    Data(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// An event was scheduled before the simulation clock.
    #[error("Causality violation: origin {origin_ts} precedes clock {now}")]
    Causality {
        origin_ts: TimestampNs,
        now: TimestampNs,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a latency configuration error.
    pub fn latency(name: impl Into<String>, value: i64) -> Self {
        Error::LatencyConfiguration {
            name: name.into(),
            value,
        }
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }
}

/// Fatal order book reconstruction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// Best bid >= best ask after an update.
    #[error("Crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook { bid: PriceTicks, ask: PriceTicks },

    /// The input stream violated its own rules.
    #[error("Malformed event: {0}")]
    Malformed(#[from] MalformedEvent),

    /// Cancel/Modify/Execute of an order id the book does not hold.
    #[error("Unknown order reference: {order_id}")]
    UnknownOrderReference { order_id: OrderId },
}

/// Ways an L3 event can be malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("timestamp {ts} is earlier than last applied {last_ts}")]
    OutOfOrder {
        ts: TimestampNs,
        last_ts: TimestampNs,
    },

    #[error("order {order_id} has non-positive quantity {quantity}")]
    NonPositiveQuantity {
        order_id: OrderId,
        quantity: Quantity,
    },

    #[error("order {order_id} is already resting")]
    DuplicateOrderId { order_id: OrderId },

    #[error("execute of {executed} against order {order_id} with only {resting} resting")]
    ExecuteExceedsResting {
        order_id: OrderId,
        resting: Quantity,
        executed: Quantity,
    },

    #[error("order {order_id} referenced on the wrong side")]
    SideMismatch { order_id: OrderId },
}

/// Recoverable execution conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// No usable depth on the opposing side.
    #[error("Insufficient liquidity for intent {intent_id}: {side:?} {requested}")]
    InsufficientLiquidity {
        intent_id: IntentId,
        side: OrderSide,
        requested: Quantity,
    },

    /// Fill-or-kill limit could not be fully filled.
    #[error("Fill-or-kill intent {intent_id} rejected: {available} of {requested} available")]
    FillOrKill {
        intent_id: IntentId,
        requested: Quantity,
        available: Quantity,
    },

    /// Intent failed validation.
    #[error("Invalid intent {intent_id}: {reason}")]
    InvalidIntent { intent_id: IntentId, reason: String },

    /// Cancel of an intent that is not resting.
    #[error("Cannot cancel intent {intent_id}: not resting")]
    UnknownIntent { intent_id: IntentId },
}

impl ExecError {
    /// Id of the intent that failed.
    pub fn intent_id(&self) -> IntentId {
        match self {
            ExecError::InsufficientLiquidity { intent_id, .. }
            | ExecError::FillOrKill { intent_id, .. }
            | ExecError::InvalidIntent { intent_id, .. }
            | ExecError::UnknownIntent { intent_id } => *intent_id,
        }
    }

    /// Reason reported on the zero-quantity fill.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            ExecError::InsufficientLiquidity { .. } => RejectReason::InsufficientLiquidity,
            ExecError::FillOrKill { .. } => RejectReason::FillOrKill,
            ExecError::InvalidIntent { .. } => RejectReason::InvalidIntent,
            ExecError::UnknownIntent { .. } => RejectReason::UnknownIntent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_converts_to_book_error() {
        let err: BookError = MalformedEvent::NonPositiveQuantity {
            order_id: 7,
            quantity: 0,
        }
        .into();
        assert!(matches!(err, BookError::Malformed(_)));
        assert_eq!(err.to_string(), "Malformed event: order 7 has non-positive quantity 0");
    }

    #[test]
    fn test_exec_error_reason() {
        let err = ExecError::FillOrKill {
            intent_id: 3,
            requested: 10,
            available: 4,
        };
        assert_eq!(err.intent_id(), 3);
        assert_eq!(err.reject_reason(), RejectReason::FillOrKill);

        let err = ExecError::UnknownIntent { intent_id: 4 };
        assert_eq!(err.intent_id(), 4);
        assert_eq!(err.reject_reason(), RejectReason::UnknownIntent);
    }

    #[test]
    fn test_latency_error_message() {
        let err = Error::latency("latency_data_signal_us", -5);
        assert!(err.to_string().contains("latency_data_signal_us"));
    }
}
