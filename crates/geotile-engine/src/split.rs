//! Host policies that can veto or force tile splits.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tile::{Tile, TileState};

/// Decides whether a tile splits this frame.
///
/// `suggestion` is the distance-based default. Any closure of the same shape
/// is a split callback. Called with the body locked, so implementations must
/// not call back into the body.
pub trait SplitCallback: Send + Sync {
    /// Final split decision for `tile`.
    fn should_split(&self, suggestion: bool, tile: &Tile) -> bool;

    /// Called once at the start of every evaluation pass.
    fn begin_frame(&self) {}
}

impl<F> SplitCallback for F
where
    F: Fn(bool, &Tile) -> bool + Send + Sync,
{
    fn should_split(&self, suggestion: bool, tile: &Tile) -> bool {
        self(suggestion, tile)
    }
}

/// Returns the suggestion unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl SplitCallback for PassThrough {
    fn should_split(&self, suggestion: bool, _tile: &Tile) -> bool {
        suggestion
    }
}

/// Never splits; already split tiles merge.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverSplit;

impl SplitCallback for NeverSplit {
    fn should_split(&self, _suggestion: bool, _tile: &Tile) -> bool {
        false
    }
}

/// Follows the suggestion but starts at most `max` new splits per frame.
///
/// Tiles that already have children drawn or pending keep them.
#[derive(Debug)]
pub struct MaxSplitsPerFrame {
    max: usize,
    started: AtomicUsize,
}

impl MaxSplitsPerFrame {
    /// Allow `max` new splits per frame.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            started: AtomicUsize::new(0),
        }
    }

    /// Splits started since the last [`SplitCallback::begin_frame`].
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }
}

impl SplitCallback for MaxSplitsPerFrame {
    fn should_split(&self, suggestion: bool, tile: &Tile) -> bool {
        if !suggestion {
            return false;
        }
        if matches!(tile.state(), TileState::Split | TileState::SplitPending) {
            return true;
        }
        self.started
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| (n < self.max).then_some(n + 1))
            .is_ok()
    }

    fn begin_frame(&self) {
        self.started.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotile_geo::{Extents, ImageSize, MeshSize};

    fn leaf() -> Tile {
        Tile::new(None, 0, Extents::GLOBAL, MeshSize::default(), ImageSize::default(), 1.0)
    }

    #[test]
    fn test_pass_through_and_never() {
        let tile = leaf();
        assert!(PassThrough.should_split(true, &tile));
        assert!(!PassThrough.should_split(false, &tile));
        assert!(!NeverSplit.should_split(true, &tile));
    }

    #[test]
    fn test_closure_is_a_callback() {
        let deep_only = |suggestion: bool, tile: &Tile| suggestion && tile.level() >= 3;
        assert!(!deep_only.should_split(true, &leaf()));
    }

    #[test]
    fn test_max_splits_per_frame() {
        let policy = MaxSplitsPerFrame::new(2);
        let tile = leaf();
        assert!(policy.should_split(true, &tile));
        assert!(policy.should_split(true, &tile));
        assert!(!policy.should_split(true, &tile));
        assert!(!policy.should_split(false, &tile));
        assert_eq!(policy.started(), 2);

        policy.begin_frame();
        assert!(policy.should_split(true, &tile));
    }

    #[test]
    fn test_max_splits_keeps_existing_splits() {
        let policy = MaxSplitsPerFrame::new(0);
        let mut tile = leaf();
        tile.children = Some([crate::tile::TileKey { slot: 1, generation: 1 }; 4]);
        tile.children_active = true;
        assert!(policy.should_split(true, &tile));
        assert!(!policy.should_split(true, &leaf()));
    }
}
