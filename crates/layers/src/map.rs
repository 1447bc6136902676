use std::cell::RefCell;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use catalog::Family;
use foundation::bounds::GeoBox;

use crate::layer::{CoastLayer, CountryLayer, Layer, LayerId};

/// Tile size of the Web Mercator pixel grid at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

/// Borrowed view of a layer handed to the widget on attach.
#[derive(Debug, Copy, Clone)]
pub enum LayerRef<'a> {
    Coast(&'a CoastLayer),
    Country(&'a CountryLayer),
}

impl LayerRef<'_> {
    pub fn id(&self) -> LayerId {
        match self {
            LayerRef::Coast(l) => l.id(),
            LayerRef::Country(l) => l.id(),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            LayerRef::Coast(l) => l.family(),
            LayerRef::Country(l) => l.family(),
        }
    }
}

/// The map surface the layer manager drives.
///
/// Methods take `&self`; implementations keep their own interior state since
/// the widget is shared with event handlers on the same thread.
pub trait MapWidget {
    fn zoom(&self) -> f64;
    /// Visible box; `None` before the first render.
    fn bounds(&self) -> Option<GeoBox>;
    fn attach(&self, layer: LayerRef<'_>);
    fn detach(&self, family: Family, layer: LayerId);
    /// Re-run the style callback for every feature of `layer`.
    fn restyle(&self, layer: LayerId);
    fn pan_to(&self, lat: f64, lng: f64);
    fn set_zoom(&self, zoom: f64);
    /// Lat/lng to world pixels at the current zoom.
    fn project(&self, lat: f64, lng: f64) -> (f64, f64);
}

/// Web Mercator world pixel coordinates at `zoom`.
pub fn project_world(lat: f64, lng: f64, zoom: f64) -> (f64, f64) {
    let size = TILE_SIZE * 2f64.powf(zoom);
    let lat = lat.clamp(-85.051_128_78, 85.051_128_78);
    let x = (lng + 180.0) / 360.0 * size;
    let sin = lat.to_radians().sin();
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;
    (x, y)
}

/// Inverse of [`project_world`].
pub fn unproject_world(x: f64, y: f64, zoom: f64) -> (f64, f64) {
    let size = TILE_SIZE * 2f64.powf(zoom);
    let lng = x / size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / size;
    let lat = n.sinh().atan().to_degrees();
    (lat, lng)
}

#[derive(Debug, Clone)]
struct HeadlessState {
    center: (f64, f64),
    zoom: f64,
    viewport_px: (f64, f64),
    attached: BTreeMap<Family, LayerId>,
    attach_count: usize,
    restyles: BTreeMap<LayerId, usize>,
}

/// In-memory map widget for terminals and tests.
///
/// Tracks what is attached and how often layers were restyled; bounds are
/// derived from centre, zoom and a fixed viewport size.
#[derive(Debug)]
pub struct HeadlessMap {
    state: RefCell<HeadlessState>,
}

impl HeadlessMap {
    pub fn new(lat: f64, lng: f64, zoom: f64) -> Self {
        Self {
            state: RefCell::new(HeadlessState {
                center: (lat, lng),
                zoom,
                viewport_px: (1024.0, 768.0),
                attached: BTreeMap::new(),
                attach_count: 0,
                restyles: BTreeMap::new(),
            }),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.state.borrow().center
    }

    pub fn attached(&self, family: Family) -> Option<LayerId> {
        self.state.borrow().attached.get(&family).copied()
    }

    pub fn attach_count(&self) -> usize {
        self.state.borrow().attach_count
    }

    pub fn restyle_count(&self, layer: LayerId) -> usize {
        self.state.borrow().restyles.get(&layer).copied().unwrap_or(0)
    }
}

impl MapWidget for HeadlessMap {
    fn zoom(&self) -> f64 {
        self.state.borrow().zoom
    }

    fn bounds(&self) -> Option<GeoBox> {
        let s = self.state.borrow();
        let (cx, cy) = project_world(s.center.0, s.center.1, s.zoom);
        let (hw, hh) = (s.viewport_px.0 / 2.0, s.viewport_px.1 / 2.0);
        let (north, west) = unproject_world(cx - hw, cy - hh, s.zoom);
        let (south, east) = unproject_world(cx + hw, cy + hh, s.zoom);
        let wrap = |lng: f64| ((lng + 180.0).rem_euclid(360.0)) - 180.0;
        if east - west >= 360.0 {
            return Some(GeoBox::new(south, -180.0, north, 180.0));
        }
        Some(GeoBox::new(south, wrap(west), north, wrap(east)))
    }

    fn attach(&self, layer: LayerRef<'_>) {
        let mut s = self.state.borrow_mut();
        s.attached.insert(layer.family(), layer.id());
        s.attach_count += 1;
    }

    fn detach(&self, family: Family, layer: LayerId) {
        let mut s = self.state.borrow_mut();
        if s.attached.get(&family) == Some(&layer) {
            s.attached.remove(&family);
        }
    }

    fn restyle(&self, layer: LayerId) {
        *self.state.borrow_mut().restyles.entry(layer).or_insert(0) += 1;
    }

    fn pan_to(&self, lat: f64, lng: f64) {
        self.state.borrow_mut().center = (lat, lng);
    }

    fn set_zoom(&self, zoom: f64) {
        self.state.borrow_mut().zoom = zoom;
    }

    fn project(&self, lat: f64, lng: f64) -> (f64, f64) {
        project_world(lat, lng, self.zoom())
    }
}
