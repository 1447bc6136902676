use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use catalog::{ALL_CONTINENTS, Catalog, Family, Lod};
use compute::{Clipping, SpatialAnalysis};
use formats::geojson::FeatureCollection;
use runtime::clock::Clock;
use streaming::cache::DatasetCache;
use streaming::fetch::{FetchCoordinator, FetchError};
use tracing::{debug, info, warn};

use crate::layer::{CoastLayer, CountryLayer, Layer, LayerId};
use crate::lod::{country_lod_for_zoom, land_lod_for_zoom, lod_for_zoom, stroke_width_for_zoom};
use crate::map::{LayerRef, MapWidget};
use crate::metadata::MetaResolver;
use crate::tokens::BuildTokens;

#[derive(Debug)]
pub enum LayerError {
    Fetch(FetchError),
    MissingSource { family: Family, lod: Lod },
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::Fetch(e) => write!(f, "dataset fetch failed: {e}"),
            LayerError::MissingSource { family, lod } => {
                write!(f, "no {family} source at {lod}")
            }
        }
    }
}

impl std::error::Error for LayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayerError::Fetch(e) => Some(e),
            LayerError::MissingSource { .. } => None,
        }
    }
}

impl From<FetchError> for LayerError {
    fn from(e: FetchError) -> Self {
        LayerError::Fetch(e)
    }
}

/// What a heavy update would change at a given zoom. `None` means "keep".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeavyUpdatePlan {
    pub zoom: f64,
    pub stroke: Option<f64>,
    pub coast: Option<Lod>,
    pub country: Option<Lod>,
    pub land: Option<Lod>,
}

impl HeavyUpdatePlan {
    pub fn is_noop(&self) -> bool {
        self.stroke.is_none() && self.coast.is_none() && self.country.is_none() && self.land.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeavyUpdateReport {
    pub restyled: bool,
    pub coast_swapped: bool,
    pub country_swapped: bool,
    pub land_switched: bool,
}

#[derive(Debug)]
struct ActiveState {
    continent: String,
    hide_islands: bool,
    coast: Option<Rc<CoastLayer>>,
    country: Option<Rc<CountryLayer>>,
    land: Option<(Lod, Rc<FeatureCollection>)>,
    coast_stroke: Option<f64>,
    // Most recent LOD asked for per family; a build finishing for any other
    // LOD is stale and must not be attached.
    wanted_coast: Option<(Lod, String)>,
    wanted_country: Option<Lod>,
}

/// Owns every geographic layer and keeps one active per family.
///
/// Raw datasets are fetched once per (family, LOD) and kept for the session.
/// Clipped coastlines go through a bounded [`DatasetCache`]; built layers are
/// memoized by (LOD, continent) for coasts and by LOD for countries.
///
/// All state sits behind `RefCell`s that are never held across an await, so
/// concurrent operations on the same manager interleave safely on one thread.
pub struct LayerManager {
    catalog: Rc<Catalog>,
    fetcher: Rc<FetchCoordinator>,
    map: Rc<dyn MapWidget>,
    next_layer_id: Cell<u64>,
    raw: RefCell<BTreeMap<(Family, Lod), Rc<FeatureCollection>>>,
    clipped: RefCell<DatasetCache<(Lod, String), Rc<FeatureCollection>>>,
    coast_layers: RefCell<BTreeMap<(Lod, String), Rc<CoastLayer>>>,
    country_layers: RefCell<BTreeMap<Lod, Rc<CountryLayer>>>,
    country_tokens: BuildTokens<Lod>,
    land_tokens: BuildTokens<()>,
    state: RefCell<ActiveState>,
}

impl LayerManager {
    pub fn new(
        catalog: Rc<Catalog>,
        fetcher: Rc<FetchCoordinator>,
        map: Rc<dyn MapWidget>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let tunables = catalog.tunables;
        Self {
            catalog,
            fetcher,
            map,
            next_layer_id: Cell::new(1),
            raw: RefCell::new(BTreeMap::new()),
            clipped: RefCell::new(DatasetCache::new(
                tunables.lru_capacity,
                tunables.lru_ttl_ms,
                clock,
            )),
            coast_layers: RefCell::new(BTreeMap::new()),
            country_layers: RefCell::new(BTreeMap::new()),
            country_tokens: BuildTokens::new(),
            land_tokens: BuildTokens::new(),
            state: RefCell::new(ActiveState {
                continent: ALL_CONTINENTS.to_string(),
                hide_islands: true,
                coast: None,
                country: None,
                land: None,
                coast_stroke: None,
                wanted_coast: None,
                wanted_country: None,
            }),
        }
    }

    pub fn catalog(&self) -> &Rc<Catalog> {
        &self.catalog
    }

    pub fn map(&self) -> &Rc<dyn MapWidget> {
        &self.map
    }

    pub fn continent(&self) -> String {
        self.state.borrow().continent.clone()
    }

    pub fn hide_islands(&self) -> bool {
        self.state.borrow().hide_islands
    }

    pub fn active_coast_layer(&self) -> Option<Rc<CoastLayer>> {
        self.state.borrow().coast.clone()
    }

    pub fn active_country_layer(&self) -> Option<Rc<CountryLayer>> {
        self.state.borrow().country.clone()
    }

    pub fn land_lod(&self) -> Option<Lod> {
        self.state.borrow().land.as_ref().map(|(lod, _)| *lod)
    }

    pub fn land(&self) -> Option<Rc<FeatureCollection>> {
        self.state.borrow().land.as_ref().map(|(_, fc)| fc.clone())
    }

    pub fn is_resident(&self, family: Family, lod: Lod) -> bool {
        self.raw.borrow().contains_key(&(family, lod))
    }

    pub fn clipped_cache_len(&self) -> usize {
        self.clipped.borrow().len()
    }

    fn next_id(&self) -> LayerId {
        let id = self.next_layer_id.get();
        self.next_layer_id.set(id + 1);
        LayerId(id)
    }

    fn resolver(&self) -> MetaResolver {
        MetaResolver::new(self.catalog.iso2_name_fallback.clone())
    }

    fn stroke_for_zoom(&self, zoom: f64) -> f64 {
        stroke_width_for_zoom(zoom, self.catalog.tunables.coast_stroke_scale)
    }

    /// Raw dataset for `(family, lod)`, fetched at most once per session.
    ///
    /// `Ok(None)` when a newer request for the same URL took over.
    pub async fn raw_dataset(
        &self,
        family: Family,
        lod: Lod,
    ) -> Result<Option<Rc<FeatureCollection>>, LayerError> {
        if let Some(fc) = self.raw.borrow().get(&(family, lod)) {
            return Ok(Some(fc.clone()));
        }
        let url = self
            .catalog
            .sources
            .url(family, lod)
            .map_err(|_| LayerError::MissingSource { family, lod })?
            .to_string();
        match self.fetcher.fetch_dataset(&url).await {
            Ok(fc) => {
                let fc = Rc::new(fc);
                self.raw.borrow_mut().insert((family, lod), fc.clone());
                info!(%family, %lod, features = fc.len(), "dataset resident");
                Ok(Some(fc))
            }
            Err(e) if e.is_aborted() => {
                debug!(%family, %lod, "dataset fetch superseded");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Coastline layer for `(lod, continent)`, reused when already built.
    pub async fn build_coast_layer(
        &self,
        lod: Lod,
        continent: &str,
    ) -> Result<Option<Rc<CoastLayer>>, LayerError> {
        let key = (lod, continent.to_string());
        if let Some(layer) = self.coast_layers.borrow().get(&key) {
            return Ok(Some(layer.clone()));
        }
        let Some(raw) = self.raw_dataset(Family::Coastline, lod).await? else {
            return Ok(None);
        };
        // Another build may have finished while we waited.
        if let Some(layer) = self.coast_layers.borrow().get(&key) {
            return Ok(Some(layer.clone()));
        }

        let cached = self.clipped.borrow_mut().get(&key).cloned();
        let clipped = match cached {
            Some(fc) => fc,
            None => {
                let fc = Rc::new(Clipping::clip_coastline_to_continent(
                    &raw,
                    continent,
                    &self.catalog.continents,
                ));
                if let Some(evicted) = self.clipped.borrow_mut().set(key.clone(), fc.clone()) {
                    debug!(?evicted, "clipped coastline evicted");
                }
                fc
            }
        };

        let stroke = self.stroke_for_zoom(self.map.zoom());
        let layer = Rc::new(CoastLayer::new(self.next_id(), lod, continent, clipped, stroke));
        self.coast_layers.borrow_mut().insert(key, layer.clone());
        info!(%lod, continent, features = layer.feature_count(), "coast layer built");
        Ok(Some(layer))
    }

    fn swap_coast(&self, next: Rc<CoastLayer>) -> bool {
        let (prev, stroke) = {
            let mut s = self.state.borrow_mut();
            if s.coast.as_ref().is_some_and(|c| c.id() == next.id()) {
                return false;
            }
            // The first attached coastline fixes the stroke; later ones follow it.
            let stroke = *s.coast_stroke.get_or_insert(next.stroke_weight());
            (s.coast.replace(next.clone()), stroke)
        };
        if let Some(prev) = prev {
            self.map.detach(Family::Coastline, prev.id());
        }
        next.set_stroke_weight(stroke);
        self.map.attach(LayerRef::Coast(&next));
        true
    }

    /// Makes the coastline at `lod` for the current continent the visible one.
    ///
    /// Returns whether the map changed. A failed build keeps the previous layer.
    pub async fn use_coast_lod(&self, lod: Lod) -> Result<bool, LayerError> {
        let continent = {
            let mut s = self.state.borrow_mut();
            s.wanted_coast = Some((lod, s.continent.clone()));
            s.continent.clone()
        };
        let Some(next) = self.build_coast_layer(lod, &continent).await? else {
            return Ok(false);
        };
        let still_wanted = self.state.borrow().wanted_coast.as_ref() == Some(&(lod, continent.clone()));
        if !still_wanted {
            debug!(%lod, continent = %continent, "coast layer superseded before attach");
            return Ok(false);
        }
        Ok(self.swap_coast(next))
    }

    /// Country layer for `lod`, built under a per-LOD token.
    ///
    /// `Ok(None)` when another build for the same LOD started meanwhile.
    pub async fn build_country_layer(
        &self,
        lod: Lod,
    ) -> Result<Option<Rc<CountryLayer>>, LayerError> {
        if let Some(layer) = self.country_layers.borrow().get(&lod) {
            return Ok(Some(layer.clone()));
        }
        let ticket = self.country_tokens.begin(lod);
        let raw = self.raw_dataset(Family::Country, lod).await;
        if !self.country_tokens.is_current(&ticket) {
            debug!(%lod, token = ticket.token, "country build superseded");
            return Ok(None);
        }
        let Some(raw) = raw? else {
            return Ok(None);
        };

        let hide = self.state.borrow().hide_islands;
        let source = if hide {
            Cow::Owned(SpatialAnalysis::mainland_collection(&raw))
        } else {
            Cow::Borrowed(raw.as_ref())
        };
        let layer = Rc::new(CountryLayer::new(self.next_id(), lod, hide, self.resolver(), &source));
        self.country_layers.borrow_mut().insert(lod, layer.clone());
        info!(%lod, mainland_only = hide, features = layer.feature_count(), "country layer built");
        Ok(Some(layer))
    }

    fn swap_country(&self, next: Rc<CountryLayer>) -> bool {
        let prev = {
            let mut s = self.state.borrow_mut();
            if s.country.as_ref().is_some_and(|c| c.id() == next.id()) {
                return false;
            }
            s.country.replace(next.clone())
        };
        if let Some(prev) = prev {
            self.map.detach(Family::Country, prev.id());
        }
        self.map.attach(LayerRef::Country(&next));
        true
    }

    async fn activate_country_lod(&self, lod: Lod) -> Result<bool, LayerError> {
        self.state.borrow_mut().wanted_country = Some(lod);
        let Some(next) = self.build_country_layer(lod).await? else {
            return Ok(false);
        };
        if self.state.borrow().wanted_country != Some(lod) {
            debug!(%lod, "country layer superseded before attach");
            return Ok(false);
        }
        Ok(self.swap_country(next))
    }

    /// Switches the visible country layer to `lod`; no-op when already there.
    pub async fn use_country_lod(&self, lod: Lod) -> Result<bool, LayerError> {
        let current = self.state.borrow().country.as_ref().map(|c| c.lod());
        if current == Some(lod) {
            return Ok(false);
        }
        self.activate_country_lod(lod).await
    }

    /// Loads the land dataset at `lod`. Land is never drawn, only kept for
    /// hit-testing, so a single token covers every LOD.
    pub async fn ensure_land_lod(&self, lod: Lod) -> Result<bool, LayerError> {
        if self.land_lod() == Some(lod) {
            return Ok(false);
        }
        let ticket = self.land_tokens.begin(());
        let raw = self.raw_dataset(Family::Land, lod).await;
        if !self.land_tokens.is_current(&ticket) {
            debug!(%lod, "land load superseded");
            return Ok(false);
        }
        let Some(raw) = raw? else {
            return Ok(false);
        };
        self.state.borrow_mut().land = Some((lod, raw));
        Ok(true)
    }

    /// Builds and attaches every family for the current zoom.
    pub async fn initialize(&self) -> Result<(), LayerError> {
        let zoom = self.map.zoom();
        self.use_coast_lod(lod_for_zoom(zoom)).await?;
        self.use_country_lod(country_lod_for_zoom(zoom)).await?;
        self.ensure_land_lod(land_lod_for_zoom(zoom)).await?;
        Ok(())
    }

    /// Asks the map to recompute country styles, e.g. after a guess.
    pub fn restyle_countries(&self) {
        if let Some(layer) = self.active_country_layer() {
            self.map.restyle(layer.id());
        }
    }

    /// Restyles countries for the new scope and swaps in the clipped coastline.
    pub async fn set_continent(&self, continent: &str) -> Result<bool, LayerError> {
        let lod = {
            let mut s = self.state.borrow_mut();
            s.continent = continent.to_string();
            s.coast.as_ref().map(|c| c.lod())
        };
        info!(continent, "continent changed");
        self.restyle_countries();
        let lod = lod.unwrap_or_else(|| lod_for_zoom(self.map.zoom()));
        self.use_coast_lod(lod).await
    }

    /// Toggles island removal; every country layer is rebuilt from raw data.
    pub async fn set_hide_islands(&self, hide: bool) -> Result<bool, LayerError> {
        self.state.borrow_mut().hide_islands = hide;
        self.country_layers.borrow_mut().clear();
        info!(hide, "island filter changed, rebuilding countries");
        let lod = country_lod_for_zoom(self.map.zoom());
        self.activate_country_lod(lod).await
    }

    /// Compares the current zoom against the active layers.
    pub fn plan_heavy_update(&self) -> HeavyUpdatePlan {
        let zoom = self.map.zoom();
        let s = self.state.borrow();
        let stroke = self.stroke_for_zoom(zoom);
        let coast = lod_for_zoom(zoom);
        let country = country_lod_for_zoom(zoom);
        let land = land_lod_for_zoom(zoom);
        HeavyUpdatePlan {
            zoom,
            stroke: (s.coast_stroke != Some(stroke)).then_some(stroke),
            coast: (s.coast.as_ref().map(|c| c.lod()) != Some(coast)).then_some(coast),
            country: (s.country.as_ref().map(|c| c.lod()) != Some(country)).then_some(country),
            land: (s.land.as_ref().map(|(l, _)| *l) != Some(land)).then_some(land),
        }
    }

    /// Applies a heavy update: stroke restyle, then coast, countries and land.
    ///
    /// Stops at the first failed family; whatever was already active stays.
    pub async fn run_heavy_update(&self) -> Result<HeavyUpdateReport, LayerError> {
        let plan = self.plan_heavy_update();
        let mut report = HeavyUpdateReport::default();
        if plan.is_noop() {
            return Ok(report);
        }

        if let Some(weight) = plan.stroke {
            let coast = {
                let mut s = self.state.borrow_mut();
                s.coast_stroke = Some(weight);
                s.coast.clone()
            };
            if let Some(coast) = coast {
                coast.set_stroke_weight(weight);
                self.map.restyle(coast.id());
                report.restyled = true;
            }
        }
        if let Some(lod) = plan.coast {
            report.coast_swapped = self.use_coast_lod(lod).await?;
        }
        if let Some(lod) = plan.country {
            report.country_swapped = self.use_country_lod(lod).await?;
        }
        if let Some(lod) = plan.land {
            report.land_switched = self.ensure_land_lod(lod).await?;
        }
        info!(zoom = plan.zoom, ?report, "heavy update applied");
        Ok(report)
    }

    /// Configured dataset URLs not resident yet.
    pub fn warm_urls(&self) -> Vec<String> {
        self.catalog
            .sources
            .all_urls()
            .into_iter()
            .filter(|(family, lod, _)| !self.is_resident(*family, *lod))
            .map(|(_, _, url)| url.to_string())
            .collect()
    }

    /// Best-effort direct warm-up. Returns how many URLs answered.
    pub async fn warm_directly(&self, urls: &[String]) -> usize {
        let mut ok = 0;
        for url in urls {
            match self.fetcher.prefetch(url).await {
                Ok(()) => ok += 1,
                Err(e) => warn!(url, error = %e, "warm-up fetch failed"),
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    use catalog::{Catalog, Family, Lod};
    use formats::geojson::Geometry;
    use futures_util::future::{FutureExt, LocalBoxFuture};
    use pretty_assertions::assert_eq;
    use runtime::clock::ManualClock;
    use streaming::fetch::{FetchCoordinator, FetchError, Transport};
    use tokio::sync::oneshot;

    use super::{LayerError, LayerManager};
    use crate::layer::Layer;
    use crate::map::{HeadlessMap, MapWidget};

    const COAST: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"ne_id":1},
         "geometry":{"type":"LineString","coordinates":[[2,48],[3,49]]}},
        {"type":"Feature","properties":{"ne_id":2},
         "geometry":{"type":"LineString","coordinates":[[20,0],[21,1]]}}
    ]}"#;

    const COUNTRIES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"ADM0_A3":"AAA","ISO_A2":"AA","NAME":"Alpha","CONTINENT":"Europe"},
         "geometry":{"type":"MultiPolygon","coordinates":[
            [[[0,40],[10,40],[10,50],[0,50],[0,40]]],
            [[[20,40],[21,40],[21,41],[20,41],[20,40]]]]}},
        {"type":"Feature","properties":{"ADM0_A3":"JPN","ISO_A2":"JP","NAME":"Japan","CONTINENT":"Asia"},
         "geometry":{"type":"Polygon","coordinates":[[[130,30],[140,30],[140,40],[130,40],[130,30]]]}}
    ]}"#;

    const LAND: &str = r#"{"type":"FeatureCollection","features":[]}"#;

    #[derive(Default)]
    struct Shared {
        bodies: HashMap<String, Vec<u8>>,
        gates: HashMap<String, VecDeque<oneshot::Receiver<()>>>,
        calls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct GatedTransport {
        shared: Rc<RefCell<Shared>>,
    }

    impl GatedTransport {
        fn serve(&self, url: &str, body: &str) {
            self.shared
                .borrow_mut()
                .bodies
                .insert(url.to_string(), body.as_bytes().to_vec());
        }

        fn gate(&self, url: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.shared
                .borrow_mut()
                .gates
                .entry(url.to_string())
                .or_default()
                .push_back(rx);
            tx
        }

        fn calls_to(&self, url: &str) -> usize {
            self.shared.borrow().calls.iter().filter(|c| *c == url).count()
        }
    }

    impl Transport for GatedTransport {
        fn get(&self, url: &str) -> LocalBoxFuture<'_, Result<Vec<u8>, FetchError>> {
            let url = url.to_string();
            let gate = {
                let mut shared = self.shared.borrow_mut();
                shared.calls.push(url.clone());
                shared.gates.get_mut(&url).and_then(VecDeque::pop_front)
            };
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                self.shared
                    .borrow()
                    .bodies
                    .get(&url)
                    .cloned()
                    .ok_or(FetchError::Status(404))
            }
            .boxed_local()
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        let urls = |family: &str, lods: &[Lod]| {
            lods.iter()
                .map(|lod| (*lod, format!("{family}{}", lod.as_str())))
                .collect()
        };
        catalog.sources.coastline = urls("coast", &Lod::ALL);
        catalog.sources.country = urls("country", &[Lod::Coarse, Lod::Medium]);
        catalog.sources.land = urls("land", &[Lod::Coarse, Lod::Medium]);
        catalog
    }

    fn setup(zoom: f64) -> (LayerManager, GatedTransport, Rc<HeadlessMap>) {
        let transport = GatedTransport::default();
        for lod in ["110m", "50m"] {
            transport.serve(&format!("coast{lod}"), COAST);
            transport.serve(&format!("country{lod}"), COUNTRIES);
            transport.serve(&format!("land{lod}"), LAND);
        }
        let map = Rc::new(HeadlessMap::new(46.6, 2.2, zoom));
        let manager = LayerManager::new(
            Rc::new(catalog()),
            Rc::new(FetchCoordinator::new(Box::new(transport.clone()))),
            map.clone(),
            Rc::new(ManualClock::new(0)),
        );
        (manager, transport, map)
    }

    #[tokio::test]
    async fn initialize_attaches_one_layer_per_family() {
        let (manager, transport, map) = setup(4.0);
        manager.initialize().await.expect("initialize");

        let coast = manager.active_coast_layer().expect("coast");
        let country = manager.active_country_layer().expect("country");
        assert_eq!(coast.lod(), Lod::Medium);
        assert_eq!(country.lod(), Lod::Medium);
        assert_eq!(manager.land_lod(), Some(Lod::Medium));
        assert_eq!(map.attached(Family::Coastline), Some(coast.id()));
        assert_eq!(map.attached(Family::Country), Some(country.id()));
        assert_eq!(transport.calls_to("coast50m"), 1);
        assert_eq!(coast.stroke_weight(), 1.26);
    }

    #[tokio::test]
    async fn coast_layers_are_reused_per_continent() {
        let (manager, transport, map) = setup(2.0);
        manager.initialize().await.expect("initialize");
        let world = manager.active_coast_layer().expect("world");
        assert_eq!(world.feature_count(), 2);

        assert!(manager.set_continent("Europe").await.expect("europe"));
        let europe = manager.active_coast_layer().expect("europe");
        assert_eq!(europe.continent(), "Europe");
        assert_eq!(europe.feature_count(), 1);
        assert_eq!(map.attached(Family::Coastline), Some(europe.id()));

        assert!(manager.set_continent("ALL").await.expect("all"));
        let again = manager.active_coast_layer().expect("world again");
        assert!(Rc::ptr_eq(&world, &again));

        manager.set_continent("Europe").await.expect("europe again");
        assert_eq!(manager.active_coast_layer().map(|l| l.id()), Some(europe.id()));
        assert_eq!(transport.calls_to("coast110m"), 1);
        assert_eq!(manager.clipped_cache_len(), 2);
    }

    #[tokio::test]
    async fn superseded_country_build_is_discarded() {
        let (manager, transport, _map) = setup(4.0);
        let first = transport.gate("country50m");
        let second = transport.gate("country50m");

        let release = async {
            tokio::task::yield_now().await;
            let _ = first.send(());
            let _ = second.send(());
        };
        let (a, b, ()) = tokio::join!(
            manager.build_country_layer(Lod::Medium),
            manager.build_country_layer(Lod::Medium),
            release
        );

        assert!(a.expect("first build").is_none());
        let b = b.expect("second build").expect("layer");
        let cached = manager.build_country_layer(Lod::Medium).await.expect("cached");
        assert_eq!(cached.map(|l| l.id()), Some(b.id()));
        assert!(manager.active_country_layer().is_none());
    }

    #[tokio::test]
    async fn stale_land_load_is_discarded() {
        let (manager, transport, _map) = setup(4.0);
        let coarse = transport.gate("land110m");
        let medium = transport.gate("land50m");

        // The newer load resolves first; the older one lands afterwards.
        let release = async {
            tokio::task::yield_now().await;
            let _ = medium.send(());
            tokio::task::yield_now().await;
            let _ = coarse.send(());
        };
        let (old, new, ()) = tokio::join!(
            manager.ensure_land_lod(Lod::Coarse),
            manager.ensure_land_lod(Lod::Medium),
            release
        );

        assert!(!old.expect("old load"));
        assert!(new.expect("new load"));
        assert_eq!(manager.land_lod(), Some(Lod::Medium));
    }

    #[tokio::test]
    async fn continent_change_overtakes_pending_coast_build() {
        let (manager, transport, map) = setup(2.0);
        let gate = transport.gate("coast50m");

        let overtake = async {
            let swapped = manager.set_continent("Europe").await;
            let _ = gate.send(());
            swapped
        };
        let (stale, fresh) = tokio::join!(manager.use_coast_lod(Lod::Medium), overtake);

        assert!(!stale.expect("stale build"));
        assert!(fresh.expect("continent swap"));
        let active = manager.active_coast_layer().expect("coast");
        assert_eq!((active.lod(), active.continent()), (Lod::Coarse, "Europe"));
        assert_eq!(map.attached(Family::Coastline), Some(active.id()));
        assert_eq!(map.attach_count(), 1);
    }

    #[tokio::test]
    async fn unattached_coast_build_leaves_stroke_plan_alone() {
        let (manager, _transport, map) = setup(2.0);
        manager.initialize().await.expect("initialize");

        map.set_zoom(4.0);
        let built = manager
            .build_coast_layer(Lod::Medium, "ALL")
            .await
            .expect("build")
            .expect("layer");
        assert_eq!(built.stroke_weight(), 1.26);
        assert_ne!(map.attached(Family::Coastline), Some(built.id()));
        assert_eq!(manager.plan_heavy_update().stroke, Some(1.26));
    }

    #[tokio::test]
    async fn island_toggle_during_build_wins() {
        let (manager, transport, map) = setup(4.0);
        let first = transport.gate("country50m");
        let second = transport.gate("country50m");

        let release = async {
            tokio::task::yield_now().await;
            let _ = first.send(());
            let _ = second.send(());
        };
        let (stale, fresh, ()) = tokio::join!(
            manager.use_country_lod(Lod::Medium),
            manager.set_hide_islands(false),
            release
        );

        assert!(!stale.expect("stale"));
        assert!(fresh.expect("fresh"));
        let layer = manager.active_country_layer().expect("layer");
        assert!(!layer.mainland_only());
        assert_eq!(map.attached(Family::Country), Some(layer.id()));
    }

    #[tokio::test]
    async fn hiding_islands_rebuilds_with_mainland_geometry() {
        let (manager, _transport, map) = setup(4.0);
        manager.initialize().await.expect("initialize");
        let hidden = manager.active_country_layer().expect("layer");
        let alpha = hidden.find_by_iso("AA").expect("alpha");
        assert!(matches!(alpha.feature().geometry, Some(Geometry::Polygon(_))));

        assert!(manager.set_hide_islands(false).await.expect("toggle"));
        let full = manager.active_country_layer().expect("layer");
        assert_ne!(full.id(), hidden.id());
        let alpha = full.find_by_iso("AA").expect("alpha");
        assert!(matches!(alpha.feature().geometry, Some(Geometry::MultiPolygon(_))));
        assert_eq!(map.attached(Family::Country), Some(full.id()));
    }

    #[tokio::test]
    async fn heavy_update_swaps_only_what_changed() {
        let (manager, _transport, map) = setup(2.0);
        manager.initialize().await.expect("initialize");
        assert!(manager.plan_heavy_update().is_noop());

        map.set_zoom(4.0);
        let plan = manager.plan_heavy_update();
        assert_eq!(plan.stroke, Some(1.26));
        assert_eq!(plan.coast, Some(Lod::Medium));
        assert_eq!(plan.country, Some(Lod::Medium));
        assert_eq!(plan.land, Some(Lod::Medium));

        let report = manager.run_heavy_update().await.expect("update");
        assert!(report.restyled && report.coast_swapped && report.country_swapped);
        assert!(report.land_switched);
        assert!(manager.plan_heavy_update().is_noop());

        // Same stroke tier, same country tier: only the coastline moves.
        map.set_zoom(5.5);
        let plan = manager.plan_heavy_update();
        assert_eq!(plan.stroke, None);
        assert_eq!(plan.coast, Some(Lod::Fine));
        assert_eq!(plan.country, None);
    }

    #[tokio::test]
    async fn failed_build_keeps_previous_layer() {
        let (manager, _transport, map) = setup(2.0);
        manager.initialize().await.expect("initialize");
        let before = manager.active_coast_layer().expect("coast");

        // No body is served for the fine coastline.
        map.set_zoom(6.0);
        let err = manager.run_heavy_update().await.expect_err("404");
        assert!(matches!(err, LayerError::Fetch(FetchError::Status(404))));
        assert_eq!(manager.active_coast_layer().map(|l| l.id()), Some(before.id()));
        assert_eq!(map.attached(Family::Coastline), Some(before.id()));
        assert_eq!(map.restyle_count(before.id()), 1);
    }

    #[tokio::test]
    async fn warm_urls_skip_resident_datasets() {
        let (manager, transport, _map) = setup(2.0);
        manager.initialize().await.expect("initialize");
        let urls = manager.warm_urls();
        assert_eq!(urls, vec!["coast50m", "coast10m", "country50m", "land50m"]);

        let ok = manager.warm_directly(&urls).await;
        assert_eq!(ok, 3);
        assert_eq!(transport.calls_to("coast10m"), 1);
        // Warming does not make anything resident.
        assert!(!manager.is_resident(Family::Coastline, Lod::Medium));
    }
}
