//! Chain lookups with retries, deadlines and memoization.
//!
//! - [`LogFetcher`] - Logs of a block window, bisecting ranges the provider refuses
//! - [`ReceiptFetcher`] - Gas accounting per transaction, single-flight memoized
//! - [`TimestampResolver`] - Wall-clock time per block, single-flight memoized

mod cache;
mod logs;
mod receipt;
mod timestamp;

pub use cache::SingleFlight;
pub use logs::LogFetcher;
pub use receipt::ReceiptFetcher;
pub use timestamp::TimestampResolver;
