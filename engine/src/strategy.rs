//! Execution strategy selection.

/// How a task's bytes get from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain files into a single archive
    CompressInto,
    /// Archive entries out into plain files
    DecompressFrom,
    /// File-for-file copy; an archive on both sides is just one big file
    DirectTransfer,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::CompressInto => write!(f, "compress"),
            Strategy::DecompressFrom => write!(f, "decompress"),
            Strategy::DirectTransfer => write!(f, "direct transfer"),
        }
    }
}

pub fn select_strategy(source_compressed: bool, target_compressed: bool) -> Strategy {
    match (source_compressed, target_compressed) {
        (false, true) => Strategy::CompressInto,
        (true, false) => Strategy::DecompressFrom,
        (false, false) | (true, true) => Strategy::DirectTransfer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        assert_eq!(select_strategy(false, true), Strategy::CompressInto);
        assert_eq!(select_strategy(true, false), Strategy::DecompressFrom);
        assert_eq!(select_strategy(false, false), Strategy::DirectTransfer);
        assert_eq!(select_strategy(true, true), Strategy::DirectTransfer);
    }
}
