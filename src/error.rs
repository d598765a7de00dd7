use std::fmt::Display;

use alloy::{
    primitives::{B256, TxHash},
    transports,
};

/// Failure class of a [`CrawlError`], deciding how the crawl loop reacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network hiccup, resolved by retrying the call or the whole window.
    Transient,

    /// Log does not match any known decoder, or its payload is malformed.
    /// Needs a decoder registry update.
    Schema,

    /// Chain data contradicts itself, e.g. a trade from a reverted transaction.
    Consistency,

    /// Downstream store refused or lost the window batch.
    Persistence,
}

/// Error produced while crawling and assembling a block window.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("query result too large: {0}")]
    RangeTooLarge(String),

    #[error("call timed out")]
    Timeout,

    #[error("unexpected empty RPC response")]
    NullResp,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        source: Box<CrawlError>,
    },

    #[error("unknown event topic {topic:?}, tx: {tx_hash}, log: {log_index}")]
    UnknownEventTopic {
        topic: Option<B256>,
        tx_hash: TxHash,
        log_index: u64,
    },

    #[error("malformed event, tx: {tx_hash}, log: {log_index}: {reason}")]
    MalformedEvent {
        tx_hash: TxHash,
        log_index: u64,
        reason: String,
    },

    #[error("log is missing {0}")]
    IncompleteLog(&'static str),

    #[error("logs out of order, ({0}, {1}) followed by ({2}, {3})")]
    LogsOutOfOrder(u64, u64, u64, u64),

    #[error("receipt not found: {0}")]
    MissingReceipt(TxHash),

    #[error("trade emitted by failed transaction: {0}")]
    FailedTransaction(TxHash),

    #[error("block not found: {0}")]
    MissingBlock(u64),

    #[error("window out of order, expected start: {0}, got: {1}")]
    WindowOutOfOrder(u64, u64),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_)
            | Self::RateLimited(_)
            | Self::RangeTooLarge(_)
            | Self::Timeout
            | Self::NullResp
            | Self::RetriesExhausted { .. } => ErrorKind::Transient,
            Self::InvalidRequest(_)
            | Self::UnknownEventTopic { .. }
            | Self::MalformedEvent { .. }
            | Self::IncompleteLog(_) => ErrorKind::Schema,
            Self::LogsOutOfOrder(..)
            | Self::MissingReceipt(_)
            | Self::FailedTransaction(_)
            | Self::MissingBlock(_)
            | Self::WindowOutOfOrder(..) => ErrorKind::Consistency,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Whether repeating the very same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::RateLimited(_)
                | Self::RangeTooLarge(_)
                | Self::Timeout
                | Self::NullResp
        )
    }
}

impl<E: Display> From<transports::RpcError<E>> for CrawlError {
    fn from(value: transports::RpcError<E>) -> Self {
        match value {
            transports::RpcError::ErrorResp(ref resp) => {
                // Providers disagree on codes for result limits, so the message
                // is inspected as well
                let msg = resp.message.to_ascii_lowercase();
                if resp.code == -32005
                    || msg.contains("more than")
                    || msg.contains("too many")
                    || msg.contains("block range")
                    || msg.contains("range is too large")
                    || msg.contains("response size")
                    || msg.contains("query timeout")
                {
                    Self::RangeTooLarge(msg)
                } else if resp.code == 429 || msg.contains("rate limit") {
                    Self::RateLimited(msg)
                } else if (resp.code == -32600 || resp.code == -32601 || resp.code == -32602)
                    && (msg.contains("invalid") || msg.contains("not found"))
                {
                    Self::InvalidRequest(msg)
                } else {
                    Self::Transport(value.to_string())
                }
            }
            transports::RpcError::NullResp => Self::NullResp,
            _ => {
                let msg = value.to_string();
                if msg.contains("429") {
                    Self::RateLimited(msg)
                } else {
                    Self::Transport(msg)
                }
            }
        }
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(value: serde_json::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}
