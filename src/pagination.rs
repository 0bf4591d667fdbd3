use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(super) enum RangeError {
    #[error("start index must be at least 1")]
    StartBeforeFirst,
    #[error("block size must be positive")]
    EmptyBlock,
    #[error("start {start} is past the upper bound {upper_bound}")]
    PastUpperBound { start: u64, upper_bound: u64 },
}

/// Maps a start index onto the block that begins there, clipped to `upper_bound`.
pub(super) fn compute_range(
    start: u64,
    block_size: u64,
    upper_bound: u64,
) -> std::result::Result<LinkRange, RangeError> {
    if start == 0 {
        return Err(RangeError::StartBeforeFirst);
    }
    if block_size == 0 {
        return Err(RangeError::EmptyBlock);
    }
    if start > upper_bound {
        return Err(RangeError::PastUpperBound { start, upper_bound });
    }

    let end = start.saturating_add(block_size - 1).min(upper_bound);
    Ok(LinkRange {
        start,
        end,
        has_next: end < upper_bound,
        has_prev: start > 1,
        next_start: end.saturating_add(1),
        prev_start: start.saturating_sub(block_size).max(1),
    })
}

/// Parses a user-supplied start index, falling back to 1 for anything unusable.
pub(super) fn normalize_start(raw: &str) -> u64 {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|start| *start >= 1)
        .unwrap_or(1)
}

/// Walks `[1, upper_bound]` block by block via `next_start`.
pub(super) fn sweep_ranges(block_size: u64, upper_bound: u64) -> impl Iterator<Item = LinkRange> {
    let first = compute_range(1, block_size, upper_bound).ok();
    std::iter::successors(first, move |range| {
        if range.has_next {
            compute_range(range.next_start, block_size, upper_bound).ok()
        } else {
            None
        }
    })
}
