//! Dirty-flag propagation over the quadtree.

use geotile_geo::Extents;

use crate::store::TileStore;
use crate::tile::{DirtyFlags, TileKey};

/// Add `flags` to every tile under `roots` whose extents intersect `region`
/// (all tiles when `region` is `None`).
///
/// Descent stops at tiles outside the region, since children lie within their
/// parent. Cached children are included; retired tiles are skipped. Returns the
/// number of tiles visited and marked.
pub(crate) fn mark_tree(
    store: &mut TileStore,
    roots: &[TileKey],
    flags: DirtyFlags,
    region: Option<&Extents>,
) -> usize {
    let mut marked = 0;
    let mut stack = roots.to_vec();
    while let Some(key) = stack.pop() {
        let Some(tile) = store.get_mut(key) else {
            continue;
        };
        if tile.retired {
            continue;
        }
        if let Some(region) = region
            && !tile.extents.intersects(region)
        {
            continue;
        }
        tile.mark(flags);
        marked += 1;
        if let Some(children) = tile.children {
            stack.extend(children);
        }
    }
    marked
}

/// Push a split distance into a subtree, halving it at every level down.
pub(crate) fn set_split_distance(store: &mut TileStore, root: TileKey, distance: f64) {
    let mut stack = vec![(root, distance)];
    while let Some((key, distance)) = stack.pop() {
        let Some(tile) = store.get_mut(key) else {
            continue;
        };
        tile.split_distance = distance;
        if let Some(children) = tile.children {
            stack.extend(children.map(|child| (child, distance * 0.5)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Tile;
    use geotile_geo::{ImageSize, MeshSize, Quadrant};

    fn clean(extents: Extents, level: u32) -> Tile {
        let mut tile = Tile::new(None, level, extents, MeshSize::default(), ImageSize::default(), 1000.0);
        tile.flags = DirtyFlags::empty();
        tile
    }

    fn split_global(store: &mut TileStore) -> (TileKey, [TileKey; 4]) {
        let root = store.insert(clean(Extents::GLOBAL, 0));
        let quarters = Extents::GLOBAL.quarter();
        let children = Quadrant::ALL.map(|q| store.insert(clean(quarters[q.index()], 1)));
        store.get_mut(root).unwrap().children = Some(children);
        (root, children)
    }

    #[test]
    fn test_region_limits_marking() {
        let mut store = TileStore::new();
        let (root, children) = split_global(&mut store);

        // Strictly inside the upper-right quadrant.
        let region = Extents::new(10.0, 10.0, 20.0, 20.0);
        let marked = mark_tree(&mut store, &[root], DirtyFlags::IMAGE, Some(&region));
        assert_eq!(marked, 2);

        assert!(store.get(root).unwrap().dirty_flags().contains(DirtyFlags::IMAGE));
        let ur = Quadrant::UpperRight.index();
        for (i, child) in children.iter().enumerate() {
            let flags = store.get(*child).unwrap().dirty_flags();
            assert_eq!(flags.contains(DirtyFlags::IMAGE), i == ur, "child {i}");
        }
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut store = TileStore::new();
        let (root, children) = split_global(&mut store);
        let region = Extents::new(-50.0, -50.0, 50.0, 50.0);

        mark_tree(&mut store, &[root], DirtyFlags::VERTICES, Some(&region));
        let once: Vec<_> = children.iter().map(|c| store.get(*c).unwrap().dirty_flags()).collect();
        mark_tree(&mut store, &[root], DirtyFlags::VERTICES, Some(&region));
        let twice: Vec<_> = children.iter().map(|c| store.get(*c).unwrap().dirty_flags()).collect();
        assert_eq!(once, twice);
        assert!(twice.iter().all(|f| *f == DirtyFlags::VERTICES));
    }

    #[test]
    fn test_retired_subtrees_are_skipped() {
        let mut store = TileStore::new();
        let (root, children) = split_global(&mut store);
        store.retire(children[0]);
        let marked = mark_tree(&mut store, &[root], DirtyFlags::IMAGE, None);
        assert_eq!(marked, 4);
        assert!(store.get(children[0]).unwrap().dirty_flags().is_empty());
    }

    #[test]
    fn test_split_distance_halves_per_level() {
        let mut store = TileStore::new();
        let (root, children) = split_global(&mut store);
        set_split_distance(&mut store, root, 800.0);
        assert_eq!(store.get(root).unwrap().split_distance(), 800.0);
        for child in children {
            assert_eq!(store.get(child).unwrap().split_distance(), 400.0);
        }
    }
}
