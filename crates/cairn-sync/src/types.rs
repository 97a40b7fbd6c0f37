/// Counters from one chunk copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub chunks_copied: usize,
    pub bytes_copied: u64,
}

/// How a pull changed the sink's dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullStatus {
    /// The sink already had the source head.
    UpToDate,
    /// The sink's head was an ancestor of the source head.
    FastForward,
    /// The dataset did not exist in the sink.
    Created,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullResult {
    pub status: PullStatus,
    pub stats: CopyStats,
}
