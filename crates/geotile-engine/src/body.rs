//! The body: a quadtree of tiles draped over a land model.
//!
//! All tile state sits behind one mutex. Raster jobs run elsewhere and report
//! back over a channel; completed results are applied at the start of every
//! [`Body::cull`] (or explicitly via [`Body::apply_completed_jobs`]). Tiles
//! that leave the tree are retired and stay addressable until
//! [`Body::post_render`] purges them.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use geotile_config::BodyConfig;
use geotile_geo::{Extents, ImageSize, LandModel, MeshSize, Quadrant};
use glam::{DMat4, DVec3};
use image::RgbaImage;
use tracing::{debug, trace, warn};

use crate::dirty;
use crate::error::BodyError;
use crate::jobs::{BuildRaster, JobManager, JobOutcome};
use crate::layers::{ElevationGroup, RasterGroup, RasterLayer, VectorGroup, VectorLayer, layer_extents};
use crate::mesh::{TileMesh, skirt_depth};
use crate::persist::{BodySettings, PersistedBody, land_from_config};
use crate::scene::{DetachedScene, SceneAttachment};
use crate::split::{PassThrough, SplitCallback};
use crate::store::TileStore;
use crate::tile::{DirtyFlags, JobTicket, TexCoords, Tile, TileKey, TileState};

/// What one [`Body::cull`] pass did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Tiles to draw this frame, depth-first.
    pub drawn: Vec<TileKey>,
    /// Tiles that created children.
    pub splits: usize,
    /// Tiles whose drawn children were removed.
    pub merges: usize,
    /// Raster jobs handed to the job manager.
    pub jobs_submitted: usize,
    /// Job outcomes applied to tiles.
    pub outcomes_applied: usize,
    /// Job outcomes dropped as stale.
    pub outcomes_discarded: usize,
}

/// Host callback queued under the lock and delivered after it is released.
enum Notice {
    Attach(TileKey, Extents),
    Detach(TileKey),
    TileRemoved { child: TileKey, parent: TileKey },
}

struct BodyState {
    land: Arc<dyn LandModel>,
    settings: BodySettings,
    transform: DMat4,
    store: TileStore,
    top_tiles: Vec<TileKey>,
    rasters: RasterGroup,
    elevation: ElevationGroup,
    vectors: VectorGroup,
    split_callback: Arc<dyn SplitCallback>,
    job_manager: Option<Arc<dyn JobManager>>,
    scene: Arc<dyn SceneAttachment>,
    sender: Sender<JobOutcome>,
    next_ticket: u64,
    needs_redraw: bool,
    new_textures: usize,
    new_textures_last_frame: usize,
    notices: Vec<Notice>,
}

/// A planetary body made of top-level tiles that split and merge with the eye.
pub struct Body {
    state: Mutex<BodyState>,
    outcomes: Receiver<JobOutcome>,
}

impl Body {
    /// Create an empty body over `land`.
    pub fn new(land: Arc<dyn LandModel>, settings: BodySettings) -> Self {
        let (sender, outcomes) = unbounded();
        Self {
            state: Mutex::new(BodyState {
                land,
                settings,
                transform: DMat4::IDENTITY,
                store: TileStore::new(),
                top_tiles: Vec::new(),
                rasters: RasterGroup::new(),
                elevation: ElevationGroup::new(),
                vectors: VectorGroup::default(),
                split_callback: Arc::new(PassThrough),
                job_manager: None,
                scene: Arc::new(DetachedScene),
                sender,
                next_ticket: 1,
                needs_redraw: true,
                new_textures: 0,
                new_textures_last_frame: 0,
                notices: Vec::new(),
            }),
            outcomes,
        }
    }

    /// Create an empty body from configuration.
    pub fn from_config(config: &BodyConfig) -> Result<Self, BodyError> {
        let land = land_from_config(&config.land)?;
        Ok(Self::new(land, BodySettings::from(config)))
    }

    /// Rebuild a body from its saved form, re-adding every top-level tile.
    pub fn from_persisted(
        land: Arc<dyn LandModel>,
        persisted: &PersistedBody,
        job_manager: Option<Arc<dyn JobManager>>,
    ) -> Self {
        let body = Self::new(land, persisted.settings);
        body.set_job_manager(job_manager);
        for extents in &persisted.tiles {
            body.add_tile(*extents);
        }
        body
    }

    /// Load a body saved with [`Body::save_ron`].
    pub fn load_ron(
        land: Arc<dyn LandModel>,
        path: &Path,
        job_manager: Option<Arc<dyn JobManager>>,
    ) -> Result<Self, BodyError> {
        let persisted = PersistedBody::load(path)?;
        Ok(Self::from_persisted(land, &persisted, job_manager))
    }

    /// The saved form of this body.
    pub fn persisted_state(&self) -> PersistedBody {
        let state = self.lock();
        PersistedBody {
            settings: state.settings,
            tiles: state
                .top_tiles
                .iter()
                .filter_map(|key| state.store.get(*key).map(|t| t.extents))
                .collect(),
        }
    }

    /// Write the saved form to `path` as RON.
    pub fn save_ron(&self, path: &Path) -> Result<(), BodyError> {
        self.persisted_state().save(path)
    }

    fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the lock, then deliver queued notices to the scene and vector
    /// layers, which may call back into the body.
    fn unlock_and_notify(&self, mut state: MutexGuard<'_, BodyState>) {
        if state.notices.is_empty() {
            return;
        }
        let notices = std::mem::take(&mut state.notices);
        let scene = Arc::clone(&state.scene);
        let vectors = state.vectors.clone();
        drop(state);
        for notice in notices {
            match notice {
                Notice::Attach(key, extents) => scene.attach(key, &extents),
                Notice::Detach(key) => scene.detach(key),
                Notice::TileRemoved { child, parent } => vectors.tile_removed(child, parent),
            }
        }
    }

    // --- Wiring ---

    /// Attach or detach the job manager raster builds go to.
    pub fn set_job_manager(&self, manager: Option<Arc<dyn JobManager>>) {
        self.lock().job_manager = manager;
    }

    /// The attached job manager.
    pub fn job_manager(&self) -> Option<Arc<dyn JobManager>> {
        self.lock().job_manager.clone()
    }

    /// Replace the scene attachment top-level tiles are announced to.
    pub fn set_scene(&self, scene: Arc<dyn SceneAttachment>) {
        self.lock().scene = scene;
    }

    /// Install a split policy; `None` restores [`PassThrough`].
    pub fn set_split_callback(&self, callback: Option<Arc<dyn SplitCallback>>) {
        self.lock().split_callback = callback.unwrap_or_else(|| Arc::new(PassThrough));
    }

    /// The installed split policy.
    pub fn split_callback(&self) -> Arc<dyn SplitCallback> {
        Arc::clone(&self.lock().split_callback)
    }

    // --- Tiles ---

    /// Add a top-level tile and request its first raster build.
    ///
    /// A missing job manager is tolerated here: the tile stays dirty and is
    /// built once one is attached.
    pub fn add_tile(&self, extents: Extents) -> TileKey {
        let mut state = self.lock();
        let split_distance = state.settings.split_distance;
        let key = state.new_tile(None, 0, extents, split_distance);
        state.top_tiles.push(key);
        state.ensure_mesh(key);
        state.notices.push(Notice::Attach(key, extents));
        state.needs_redraw = true;
        if let Err(e) = state.submit(key, false) {
            warn!(tile = %key, error = %e, "initial raster build not submitted");
        }
        debug!(tile = %key, %extents, "added top-level tile");
        self.unlock_and_notify(state);
        key
    }

    /// Retire a tile and its subtree; it is freed by the next [`Body::purge_tiles`].
    ///
    /// Children come in sets of four, so retiring a child retires all its
    /// siblings and turns the parent back into a leaf.
    pub fn add_tile_to_be_deleted(&self, key: TileKey) -> bool {
        let mut state = self.lock();
        let parent = match state.store.get(key) {
            Some(tile) if !tile.retired => tile.parent,
            _ => return false,
        };
        state.needs_redraw = true;
        let retired = match parent {
            None => {
                state.top_tiles.retain(|k| *k != key);
                state.notices.push(Notice::Detach(key));
                state.store.retire(key)
            }
            Some(parent) => {
                let removed = state.store.get_mut(parent).and_then(|p| {
                    let were_drawn = p.children_active;
                    p.children_active = false;
                    p.wants_split = false;
                    p.children.take().map(|children| (children, were_drawn))
                });
                if let Some((children, were_drawn)) = removed {
                    state.drop_children(parent, children, were_drawn);
                }
                true
            }
        };
        self.unlock_and_notify(state);
        retired
    }

    /// Free every retired tile. Returns how many were removed.
    pub fn purge_tiles(&self) -> usize {
        self.lock().store.purge()
    }

    /// End-of-frame housekeeping; purges retired tiles.
    pub fn post_render(&self) -> usize {
        self.purge_tiles()
    }

    /// Roots of retired subtrees not yet purged.
    pub fn pending_deletion(&self) -> Vec<TileKey> {
        self.lock().store.pending().to_vec()
    }

    /// Top-level tiles in insertion order.
    pub fn top_tiles(&self) -> Vec<TileKey> {
        self.lock().top_tiles.clone()
    }

    /// Snapshot of a tile, including retired tiles awaiting purge.
    pub fn tile(&self, key: TileKey) -> Option<Tile> {
        self.lock().store.get(key).cloned()
    }

    /// Lifecycle state of a tile.
    pub fn tile_state(&self, key: TileKey) -> Option<TileState> {
        self.lock().store.get(key).map(Tile::state)
    }

    /// Number of tiles held, retired ones included.
    pub fn tile_count(&self) -> usize {
        self.lock().store.len()
    }

    /// Tiles at the bottom of the active tree, depth-first.
    ///
    /// This is the draw list of the last cull unless the tree changed since.
    pub fn leaves(&self) -> Vec<TileKey> {
        self.lock().leaves()
    }

    /// Union of the top-level tiles' extents, or `None` without tiles.
    pub fn extents(&self) -> Option<Extents> {
        let state = self.lock();
        state
            .top_tiles
            .iter()
            .filter_map(|key| state.store.get(*key).map(|t| t.extents))
            .reduce(|all, e| all.expand(&e))
    }

    /// Nearest point where the world-space segment `p0 -> p1` meets the
    /// drawn tile surfaces. Leaves without a mesh yet are skipped.
    pub fn intersect_with_tiles(&self, p0: DVec3, p1: DVec3) -> Option<DVec3> {
        let state = self.lock();
        let to_local = state.transform.inverse();
        let (a, b) = (to_local.transform_point3(p0), to_local.transform_point3(p1));
        let t = state
            .leaves()
            .into_iter()
            .filter_map(|key| state.store.get(key)?.mesh.as_ref()?.intersect_segment(a, b))
            .min_by(f64::total_cmp)?;
        Some(p0.lerp(p1, t))
    }

    /// Remove every tile and layer. Settings and the job manager are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        let top_tiles = std::mem::take(&mut state.top_tiles);
        for key in top_tiles {
            state.notices.push(Notice::Detach(key));
            state.store.retire(key);
        }
        let removed = state.store.purge();
        state.rasters.clear();
        state.elevation.clear();
        state.vectors.clear();
        state.split_callback = Arc::new(PassThrough);
        state.needs_redraw = true;
        debug!(removed, "cleared body");
        self.unlock_and_notify(state);
    }

    // --- Raster requests and dirtiness ---

    /// Submit a raster build for `key` now, superseding any build in flight.
    ///
    /// Returns the job ticket, or `None` for unknown or retired tiles.
    pub fn texture_request(&self, key: TileKey) -> Result<Option<u64>, BodyError> {
        self.lock().submit(key, true)
    }

    /// Mark imagery dirty on tiles intersecting `extents`.
    pub fn dirty_textures(&self, extents: &Extents) {
        self.lock().mark(DirtyFlags::IMAGE, Some(extents));
    }

    /// Mark heights dirty on tiles intersecting `extents`.
    pub fn dirty_elevation(&self, extents: &Extents) {
        self.lock().mark(DirtyFlags::VERTICES, Some(extents));
    }

    /// Mark heights dirty on every tile.
    pub fn dirty_vertices(&self) {
        self.lock().mark(DirtyFlags::VERTICES, None);
    }

    // --- Layers ---

    /// Add an imagery layer on top and dirty the tiles it covers.
    pub fn raster_append(&self, layer: Arc<dyn RasterLayer>) {
        let mut state = self.lock();
        let extents = layer_extents(layer.as_ref());
        debug!(layer = layer.name(), %extents, "raster layer appended");
        state.rasters.append(layer);
        state.mark(DirtyFlags::IMAGE, Some(&extents));
    }

    /// Remove an imagery layer. Returns whether it was attached.
    pub fn raster_remove(&self, layer: &Arc<dyn RasterLayer>) -> bool {
        let mut state = self.lock();
        if !state.rasters.remove(layer) {
            return false;
        }
        state.mark(DirtyFlags::IMAGE, Some(&layer_extents(layer.as_ref())));
        true
    }

    /// An imagery layer's content changed; rebuild the tiles it covers.
    pub fn raster_changed(&self, layer: &dyn RasterLayer) {
        self.lock().mark(DirtyFlags::IMAGE, Some(&layer_extents(layer)));
    }

    /// Current imagery layers.
    pub fn raster_layers(&self) -> RasterGroup {
        self.lock().rasters.clone()
    }

    /// Add an elevation layer on top and dirty the tiles it covers.
    pub fn elevation_append(&self, layer: Arc<dyn RasterLayer>) {
        let mut state = self.lock();
        let extents = layer_extents(layer.as_ref());
        debug!(layer = layer.name(), %extents, "elevation layer appended");
        state.elevation.append(layer);
        state.mark(DirtyFlags::VERTICES, Some(&extents));
    }

    /// Remove an elevation layer. Returns whether it was attached.
    pub fn elevation_remove(&self, layer: &Arc<dyn RasterLayer>) -> bool {
        let mut state = self.lock();
        if !state.elevation.remove(layer) {
            return false;
        }
        state.mark(DirtyFlags::VERTICES, Some(&layer_extents(layer.as_ref())));
        true
    }

    /// An elevation layer's content changed; resample the tiles it covers.
    pub fn elevation_changed(&self, layer: &dyn RasterLayer) {
        self.lock().mark(DirtyFlags::VERTICES, Some(&layer_extents(layer)));
    }

    /// Current elevation layers.
    pub fn elevation_layers(&self) -> ElevationGroup {
        self.lock().elevation.clone()
    }

    /// Current vector layers.
    pub fn vector_layers(&self) -> VectorGroup {
        self.lock().vectors.clone()
    }

    /// Attach a vector layer.
    pub fn vector_append(&self, layer: Arc<dyn VectorLayer>) {
        self.lock().vectors.append(layer);
    }

    /// Detach a vector layer.
    pub fn vector_remove(&self, layer: &Arc<dyn VectorLayer>) -> bool {
        self.lock().vectors.remove(layer)
    }

    /// Ask every vector layer to refresh. Layers are called without the body locked.
    pub fn update_notify(&self) {
        let vectors = self.lock().vectors.clone();
        vectors.update_notify();
    }

    /// Elevation at a point: the last elevation layer reporting a positive height, else zero.
    pub fn elevation(&self, lat: f64, lon: f64) -> f64 {
        self.lock().elevation.elevation_at(lat, lon)
    }

    /// Run the split policy for `tile`.
    ///
    /// Tiles at the maximum level never split, and nothing splits while
    /// splitting is disallowed, whatever the policy says.
    pub fn should_split(&self, suggestion: bool, tile: &Tile) -> bool {
        let callback = {
            let state = self.lock();
            if tile.level >= state.settings.max_level || !state.settings.allow_split {
                return false;
            }
            state.split_callback.clone()
        };
        callback.should_split(suggestion, tile)
    }

    // --- Coordinates ---

    /// The land model.
    pub fn land(&self) -> Arc<dyn LandModel> {
        Arc::clone(&self.lock().land)
    }

    /// Body-local cartesian position of a geographic point, scaled.
    pub fn lat_lon_height_to_xyz(&self, lat: f64, lon: f64, height: f64) -> DVec3 {
        let state = self.lock();
        state.land.lat_lon_height_to_xyz(lat, lon, height) * state.settings.scale
    }

    /// Inverse of [`Body::lat_lon_height_to_xyz`].
    pub fn xyz_to_lat_lon_height(&self, point: DVec3) -> (f64, f64, f64) {
        let state = self.lock();
        state.land.xyz_to_lat_lon_height(point / state.settings.scale)
    }

    /// [`Body::lat_lon_height_to_xyz`] taking `(lon, lat, height)`.
    pub fn convert_to_planet(&self, geo: DVec3) -> DVec3 {
        self.lat_lon_height_to_xyz(geo.y, geo.x, geo.z)
    }

    /// [`Body::xyz_to_lat_lon_height`] returning `(lon, lat, height)`.
    pub fn convert_from_planet(&self, point: DVec3) -> DVec3 {
        let (lat, lon, height) = self.xyz_to_lat_lon_height(point);
        DVec3::new(lon, lat, height)
    }

    /// Mesh resolution a tile covering `extents` would get.
    pub fn mesh_size_for(&self, extents: &Extents) -> MeshSize {
        let state = self.lock();
        state.land.mesh_size(extents, state.settings.mesh_size)
    }

    /// Local east/north/up frame at a point, rotated clockwise by `heading` degrees.
    pub fn planet_rotation_matrix(&self, lat: f64, lon: f64, elevation: f64, heading: f64) -> DMat4 {
        let state = self.lock();
        let mut frame = state.land.planet_rotation_matrix(lat, lon, elevation, heading);
        frame.w_axis = (frame.w_axis.truncate() * state.settings.scale).extend(1.0);
        frame
    }

    /// Place the body's origin in the world.
    pub fn set_center(&self, center: DVec3) {
        self.lock().transform = DMat4::from_translation(center);
    }

    /// World position of the body's origin.
    pub fn center(&self) -> DVec3 {
        self.lock().transform.w_axis.truncate()
    }

    /// Body-to-world transform.
    pub fn transform(&self) -> DMat4 {
        self.lock().transform
    }

    // --- Settings ---

    /// All scalar settings.
    pub fn settings(&self) -> BodySettings {
        self.lock().settings
    }

    /// Uniform scale on cartesian output.
    pub fn scale(&self) -> f64 {
        self.lock().settings.scale
    }

    /// Change the scale. Every tile's vertices and children are invalidated.
    pub fn set_scale(&self, scale: f64) {
        if !(scale.is_finite() && scale > 0.0) {
            warn!(scale, "ignoring invalid body scale");
            return;
        }
        let mut state = self.lock();
        state.settings.scale = scale;
        state.mark(DirtyFlags::VERTICES | DirtyFlags::CHILDREN, None);
    }

    /// Split distance for new top-level tiles.
    pub fn split_distance(&self) -> f64 {
        self.lock().settings.split_distance
    }

    /// Change the split distance; optionally push it into existing tiles,
    /// halving per level.
    pub fn set_split_distance(&self, distance: f64, apply_to_children: bool) {
        let mut state = self.lock();
        state.settings.split_distance = distance;
        if apply_to_children {
            let state = &mut *state;
            for key in &state.top_tiles {
                dirty::set_split_distance(&mut state.store, *key, distance);
            }
        }
    }

    /// Deepest level a tile may reach.
    pub fn max_level(&self) -> u32 {
        self.lock().settings.max_level
    }

    /// Change the deepest level; deeper subtrees merge on the next cull.
    pub fn set_max_level(&self, level: u32) {
        self.lock().settings.max_level = level;
    }

    /// Whether merged children are kept for reuse.
    pub fn cache_tiles(&self) -> bool {
        self.lock().settings.cache_tiles
    }

    /// Keep merged children for reuse instead of retiring them.
    pub fn set_cache_tiles(&self, cache: bool) {
        self.lock().settings.cache_tiles = cache;
    }

    /// Imagery resolution per tile.
    pub fn image_size(&self) -> ImageSize {
        self.lock().settings.image_size
    }

    /// Change the imagery resolution; every tile's image is rebuilt.
    pub fn set_image_size(&self, size: ImageSize) {
        let mut state = self.lock();
        if state.settings.image_size == size {
            return;
        }
        state.settings.image_size = size;
        let keys: Vec<TileKey> = state.store.iter().map(|(key, _)| key).collect();
        for key in keys {
            if let Some(tile) = state.store.get_mut(key) {
                tile.image_size = size;
            }
        }
        state.mark(DirtyFlags::IMAGE, None);
    }

    /// Whether meshes carry skirts.
    pub fn use_skirts(&self) -> bool {
        self.lock().settings.use_skirts
    }

    /// Toggle skirts; meshes are rebuilt on the next cull.
    pub fn set_use_skirts(&self, skirts: bool) {
        let mut state = self.lock();
        if state.settings.use_skirts == skirts {
            return;
        }
        state.settings.use_skirts = skirts;
        let keys: Vec<TileKey> = state.store.iter().map(|(key, _)| key).collect();
        for key in keys {
            if let Some(tile) = state.store.get_mut(key) {
                tile.mesh_stale = true;
            }
        }
    }

    /// Whether splitting is allowed at all.
    pub fn allow_split(&self) -> bool {
        self.lock().settings.allow_split
    }

    /// Globally allow or forbid splitting.
    pub fn set_allow_split(&self, allow: bool) {
        self.lock().settings.allow_split = allow;
    }

    /// Whether split tiles are kept split.
    pub fn keep_detail(&self) -> bool {
        self.lock().settings.keep_detail
    }

    /// Never merge split tiles while set.
    pub fn set_keep_detail(&self, keep: bool) {
        self.lock().settings.keep_detail = keep;
    }

    // --- Frame ---

    /// Apply finished raster jobs without evaluating the tree. Returns how many applied.
    pub fn apply_completed_jobs(&self) -> usize {
        let mut state = self.lock();
        let mut report = FrameReport::default();
        self.drain_outcomes(&mut state, &mut report);
        report.outcomes_applied
    }

    /// Evaluate the tree for an eye position in world space.
    ///
    /// Applies finished jobs, resolves dirty tiles, splits and merges against
    /// the eye, and returns the tiles to draw. Fails only when a raster build
    /// is needed and no job manager is attached.
    pub fn cull(&self, eye: DVec3) -> Result<FrameReport, BodyError> {
        let mut state = self.lock();
        let mut report = FrameReport::default();
        state.needs_redraw = false;
        state.new_textures = 0;
        self.drain_outcomes(&mut state, &mut report);
        state.new_textures_last_frame = state.new_textures;

        state.split_callback.begin_frame();
        let local_eye = state.transform.inverse().transform_point3(eye);
        let roots = state.top_tiles.clone();
        let evaluated = roots
            .into_iter()
            .try_for_each(|key| state.evaluate(key, local_eye, &mut report));
        self.unlock_and_notify(state);
        evaluated?;
        trace!(
            drawn = report.drawn.len(),
            splits = report.splits,
            merges = report.merges,
            submitted = report.jobs_submitted,
            "cull"
        );
        Ok(report)
    }

    fn drain_outcomes(&self, state: &mut BodyState, report: &mut FrameReport) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            if state.apply_outcome(outcome) {
                report.outcomes_applied += 1;
            } else {
                report.outcomes_discarded += 1;
            }
        }
    }

    /// Whether anything visible changed during the last cull.
    pub fn needs_redraw(&self) -> bool {
        self.lock().needs_redraw
    }

    /// Force or suppress a redraw, e.g. after the host changed the view.
    pub fn set_needs_redraw(&self, redraw: bool) {
        self.lock().needs_redraw = redraw;
    }

    /// Images applied at the start of the last cull.
    pub fn new_textures_last_frame(&self) -> usize {
        self.lock().new_textures_last_frame
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Body")
            .field("land", &state.land)
            .field("settings", &state.settings)
            .field("top_tiles", &state.top_tiles.len())
            .field("tiles", &state.store.len())
            .finish_non_exhaustive()
    }
}

impl BodyState {
    fn to_xyz(&self) -> impl Fn(f64, f64, f64) -> DVec3 + use<> {
        let land = Arc::clone(&self.land);
        let scale = self.settings.scale;
        move |lat, lon, height| land.lat_lon_height_to_xyz(lat, lon, height) * scale
    }

    fn new_tile(
        &mut self,
        parent: Option<(TileKey, Quadrant)>,
        level: u32,
        extents: Extents,
        split_distance: f64,
    ) -> TileKey {
        let mesh_size = self.land.mesh_size(&extents, self.settings.mesh_size);
        self.store.insert(Tile::new(
            parent,
            level,
            extents,
            mesh_size,
            self.settings.image_size,
            split_distance,
        ))
    }

    /// Tiles at the bottom of the active tree, depth-first.
    fn leaves(&self) -> Vec<TileKey> {
        let mut leaves = Vec::new();
        let mut stack: Vec<TileKey> = self.top_tiles.iter().rev().copied().collect();
        while let Some(key) = stack.pop() {
            let Some(tile) = self.store.get(key) else {
                continue;
            };
            match tile.children {
                Some(children) if tile.children_active => stack.extend(children.iter().rev()),
                _ => leaves.push(key),
            }
        }
        leaves
    }

    fn mark(&mut self, flags: DirtyFlags, region: Option<&Extents>) {
        let marked = dirty::mark_tree(&mut self.store, &self.top_tiles, flags, region);
        if marked > 0 {
            self.needs_redraw = true;
        }
        trace!(?flags, marked, "marked tiles dirty");
    }

    fn should_split(&self, suggestion: bool, tile: &Tile) -> bool {
        if tile.level >= self.settings.max_level || !self.settings.allow_split {
            return false;
        }
        self.split_callback.should_split(suggestion, tile)
    }

    /// Hand a raster build for `key` to the job manager.
    ///
    /// Without `force`, nothing happens when a job is already in flight or the
    /// tile has no raster work outstanding.
    fn submit(&mut self, key: TileKey, force: bool) -> Result<Option<u64>, BodyError> {
        let Some(tile) = self.store.get(key) else {
            return Ok(None);
        };
        if tile.retired || (tile.job.is_some() && !force) {
            return Ok(None);
        }
        let mut wants = tile.flags & DirtyFlags::RASTER;
        if force {
            wants |= DirtyFlags::IMAGE;
        }
        if wants.is_empty() {
            return Ok(None);
        }
        let manager = self.job_manager.clone().ok_or(BodyError::NoJobManager)?;

        let ticket = self.next_ticket;
        let revision = tile.revision;
        let job = BuildRaster {
            ticket,
            tile: key,
            revision,
            wants,
            extents: tile.extents,
            level: tile.level,
            image_size: tile.image_size,
            mesh_size: tile.mesh_size,
            rasters: self.rasters.clone(),
            elevation: self.elevation.clone(),
            sender: self.sender.clone(),
        };
        manager.add_job(Box::new(job))?;
        self.next_ticket += 1;

        if let Some(tile) = self.store.get_mut(key) {
            tile.flags.insert(wants);
            tile.job = Some(JobTicket {
                id: ticket,
                revision,
                wants,
                remarked: DirtyFlags::empty(),
            });
        }
        trace!(tile = %key, ticket, ?wants, "raster job submitted");
        Ok(Some(ticket))
    }

    /// Submit pending raster work; queue back-pressure just defers it.
    fn submit_if_dirty(&mut self, key: TileKey, report: &mut FrameReport) -> Result<(), BodyError> {
        match self.submit(key, false) {
            Ok(Some(_)) => {
                report.jobs_submitted += 1;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(BodyError::JobRejected(e)) => {
                debug!(tile = %key, error = %e, "raster job deferred");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn apply_outcome(&mut self, outcome: JobOutcome) -> bool {
        let key = outcome.tile;
        let Some(tile) = self.store.get_mut(key) else {
            trace!(tile = %key, ticket = outcome.ticket, "outcome for purged tile");
            return false;
        };
        if tile.retired {
            trace!(tile = %key, ticket = outcome.ticket, "outcome for retired tile");
            return false;
        }
        let Some(ticket) = tile.job.filter(|t| t.id == outcome.ticket) else {
            trace!(tile = %key, ticket = outcome.ticket, "superseded outcome");
            return false;
        };
        tile.job = None;
        // Flags marked again while the job ran keep the data but stay dirty.
        let stale = ticket.remarked;
        if !stale.is_empty() {
            trace!(tile = %key, ?stale, revision = tile.revision, "outcome partly stale");
        }

        let mut new_image: Option<Arc<RgbaImage>> = None;
        match outcome.image {
            Some(Ok(image)) => {
                let image = Arc::new(image);
                tile.image = Some(Arc::clone(&image));
                tile.tex_coords = TexCoords::FULL;
                tile.owns_image = true;
                tile.mesh_stale = true;
                if !stale.contains(DirtyFlags::IMAGE) {
                    tile.flags.remove(DirtyFlags::IMAGE);
                }
                new_image = Some(image);
            }
            Some(Err(e)) => {
                debug!(tile = %key, error = %e, "imagery unavailable, will retry");
            }
            None => {}
        }
        if let Some(heights) = outcome.heights {
            tile.heights = Some(Arc::new(heights));
            tile.mesh_stale = true;
            if !stale.contains(DirtyFlags::VERTICES) {
                tile.flags.remove(DirtyFlags::VERTICES);
            }
        }

        let children = tile.children;
        if let Some(image) = new_image {
            self.new_textures += 1;
            if let Some(children) = children {
                self.inherit_image(children, &image, TexCoords::FULL);
            }
        }
        self.needs_redraw = true;
        true
    }

    /// Show `image` on descendants that have no imagery of their own yet.
    fn inherit_image(&mut self, children: [TileKey; 4], image: &Arc<RgbaImage>, tex: TexCoords) {
        let mut stack: Vec<(TileKey, TexCoords)> = Quadrant::ALL
            .iter()
            .map(|q| (children[q.index()], tex.quadrant(*q)))
            .collect();
        while let Some((key, tex)) = stack.pop() {
            let Some(tile) = self.store.get_mut(key) else {
                continue;
            };
            if tile.owns_image {
                continue;
            }
            tile.image = Some(Arc::clone(image));
            tile.tex_coords = tex;
            tile.mesh_stale = true;
            if let Some(grandchildren) = tile.children {
                stack.extend(Quadrant::ALL.iter().map(|q| (grandchildren[q.index()], tex.quadrant(*q))));
            }
        }
    }

    fn ensure_mesh(&mut self, key: TileKey) {
        let to_xyz = self.to_xyz();
        let use_skirts = self.settings.use_skirts;
        let Some(tile) = self.store.get(key) else {
            return;
        };
        if tile.mesh.is_some() && !tile.mesh_stale {
            return;
        }
        let mesh = TileMesh::build(
            &to_xyz,
            &tile.extents,
            tile.mesh_size,
            tile.heights.as_deref(),
            tile.tex_coords,
            use_skirts.then(|| skirt_depth(tile.level)),
        );
        if let Some(tile) = self.store.get_mut(key) {
            tile.mesh = Some(Arc::new(mesh));
            tile.mesh_stale = false;
        }
    }

    /// Retire a set of children, telling vector layers if they were drawn.
    fn drop_children(&mut self, parent: TileKey, children: [TileKey; 4], were_drawn: bool) {
        for child in children {
            self.store.retire(child);
            if were_drawn {
                self.notices.push(Notice::TileRemoved { child, parent });
            }
        }
    }

    fn evaluate(&mut self, key: TileKey, eye: DVec3, report: &mut FrameReport) -> Result<(), BodyError> {
        let Some(tile) = self.store.get_mut(key) else {
            return Ok(());
        };
        if tile.retired {
            return Ok(());
        }

        if tile.flags.contains(DirtyFlags::CHILDREN) {
            tile.flags.remove(DirtyFlags::CHILDREN);
            let were_drawn = tile.children_active;
            tile.children_active = false;
            tile.wants_split = false;
            if let Some(children) = tile.children.take() {
                debug!(tile = %key, "children invalidated");
                self.drop_children(key, children, were_drawn);
            }
        }

        self.submit_if_dirty(key, report)?;
        self.ensure_mesh(key);

        let Some(tile) = self.store.get(key) else {
            return Ok(());
        };
        let at_max_level = tile.level >= self.settings.max_level;
        let threshold = tile.split_distance * self.settings.scale;
        let distance_sq = tile
            .mesh
            .as_ref()
            .map_or(f64::INFINITY, |mesh| mesh.smallest_distance_squared(eye));
        let suggestion = eye.is_finite() && !at_max_level && distance_sq <= threshold * threshold;
        let split = self.should_split(suggestion, tile);

        if split {
            self.split(key, eye, report)
        } else {
            self.unsplit(key, eye, report)
        }
    }

    fn split(&mut self, key: TileKey, eye: DVec3, report: &mut FrameReport) -> Result<(), BodyError> {
        let existing = match self.store.get_mut(key) {
            Some(tile) => {
                tile.wants_split = true;
                tile.children
            }
            None => return Ok(()),
        };
        let children = match existing {
            Some(children) => children,
            None => {
                let Some(children) = self.create_children(key) else {
                    return Ok(());
                };
                report.splits += 1;
                for child in children {
                    self.submit_if_dirty(child, report)?;
                }
                children
            }
        };

        let active = match self.store.get(key) {
            Some(tile) if tile.children_active => true,
            _ => {
                let ready = children
                    .iter()
                    .all(|c| self.store.get(*c).is_some_and(|t| t.owns_image));
                if ready && let Some(tile) = self.store.get_mut(key) {
                    tile.children_active = true;
                    self.needs_redraw = true;
                    debug!(tile = %key, "split complete");
                }
                ready
            }
        };

        if active {
            for child in children {
                self.evaluate(child, eye, report)?;
            }
        } else {
            // Keep pending children progressing (e.g. retry failed imagery).
            for child in children {
                self.submit_if_dirty(child, report)?;
            }
            report.drawn.push(key);
        }
        Ok(())
    }

    fn create_children(&mut self, key: TileKey) -> Option<[TileKey; 4]> {
        let parent = self.store.get(key)?;
        let level = parent.level + 1;
        let quarters = parent.extents.quarter();
        let split_distance = parent.split_distance * 0.5;
        let image = parent.image.clone();
        let tex = parent.tex_coords;

        let children = Quadrant::ALL.map(|q| {
            let child = self.new_tile(Some((key, q)), level, quarters[q.index()], split_distance);
            if let Some(tile) = self.store.get_mut(child) {
                tile.image = image.clone();
                tile.tex_coords = tex.quadrant(q);
            }
            child
        });
        if let Some(parent) = self.store.get_mut(key) {
            parent.children = Some(children);
            parent.children_active = false;
        }
        debug!(tile = %key, level, "split started");
        Some(children)
    }

    fn unsplit(&mut self, key: TileKey, eye: DVec3, report: &mut FrameReport) -> Result<(), BodyError> {
        let Some(tile) = self.store.get(key) else {
            return Ok(());
        };
        if let Some(children) = tile.children {
            let active = tile.children_active;
            if active && self.settings.keep_detail {
                for child in children {
                    self.evaluate(child, eye, report)?;
                }
                return Ok(());
            }

            let cache = self.settings.cache_tiles;
            if let Some(tile) = self.store.get_mut(key) {
                tile.wants_split = false;
                tile.children_active = false;
                if !cache {
                    tile.children = None;
                }
            }
            if active {
                report.merges += 1;
                self.needs_redraw = true;
                debug!(tile = %key, cached = cache, "merged");
            }
            if cache {
                if active {
                    self.notices
                        .extend(children.map(|child| Notice::TileRemoved { child, parent: key }));
                }
            } else {
                self.drop_children(key, children, active);
            }
        }
        report.drawn.push(key);
        Ok(())
    }
}
