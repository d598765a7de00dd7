mod log;
mod record;

pub use log::*;
pub use record::*;

/// Block number.
pub type BlockNumber = u64;

/// Block timestamp, seconds since Unix epoch.
pub type Timestamp = u64;

/// Inclusive range of blocks crawled as one unit.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct BlockWindow {
    from: BlockNumber,
    to: BlockNumber,
}

impl BlockWindow {
    /// # Panics
    ///
    /// If `to < from`.
    pub fn new(from: BlockNumber, to: BlockNumber) -> Self {
        assert!(from <= to, "empty block window {from}..={to}");
        Self { from, to }
    }

    pub fn from(&self) -> BlockNumber {
        self.from
    }

    pub fn to(&self) -> BlockNumber {
        self.to
    }

    /// Number of blocks in the window.
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Always false, windows span at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Splits the window into two halves, or returns `None` for a single block.
    pub fn bisect(&self) -> Option<(Self, Self)> {
        if self.from == self.to {
            return None;
        }
        let mid = self.from + (self.to - self.from) / 2;
        Some((Self::new(self.from, mid), Self::new(mid + 1, self.to)))
    }
}

impl std::fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bisect() {
        let (lo, hi) = BlockWindow::new(10, 20).bisect().unwrap();
        assert_eq!(lo, BlockWindow::new(10, 15));
        assert_eq!(hi, BlockWindow::new(16, 20));
        assert_eq!(lo.len() + hi.len(), 11);

        let (lo, hi) = BlockWindow::new(7, 8).bisect().unwrap();
        assert_eq!((lo.len(), hi.len()), (1, 1));

        assert!(BlockWindow::new(5, 5).bisect().is_none());
    }
}
