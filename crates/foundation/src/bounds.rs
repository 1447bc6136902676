/// Geographic bounding box in degrees.
///
/// Stored as `(south, west, north, east)`, the order used by the continent
/// tables. A box whose `west` is greater than its `east` wraps the antimeridian.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBox {
    pub const WORLD: GeoBox = GeoBox {
        south: -90.0,
        west: -180.0,
        north: 90.0,
        east: 180.0,
    };

    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    pub const fn from_swne(swne: [f64; 4]) -> Self {
        Self::new(swne[0], swne[1], swne[2], swne[3])
    }

    pub fn to_swne(&self) -> [f64; 4] {
        [self.south, self.west, self.north, self.east]
    }

    pub fn wraps_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Inclusive containment test.
    ///
    /// For a wrapping box the longitude test becomes `lng >= west || lng <= east`.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        if lat < self.south || lat > self.north {
            return false;
        }
        if self.wraps_antimeridian() {
            lng >= self.west || lng <= self.east
        } else {
            lng >= self.west && lng <= self.east
        }
    }

    /// Returns `(lat, lng)` of the box centre, honouring antimeridian wrap.
    pub fn center(&self) -> (f64, f64) {
        let lat = (self.south + self.north) / 2.0;
        if !self.wraps_antimeridian() {
            return (lat, (self.west + self.east) / 2.0);
        }
        let mut lng = (self.west + self.east + 360.0) / 2.0;
        if lng > 180.0 {
            lng -= 360.0;
        }
        (lat, lng)
    }
}

/// Overlap test between a feature box and the current view.
///
/// Missing data on either side counts as overlapping so callers never hide
/// something they cannot reason about. The view may wrap the antimeridian; the
/// feature box is assumed not to.
pub fn bbox_intersects(bbox: Option<&GeoBox>, view: Option<&GeoBox>) -> bool {
    let (Some(b), Some(v)) = (bbox, view) else {
        return true;
    };
    if b.north < v.south || b.south > v.north {
        return false;
    }
    if v.west <= v.east {
        return !(b.east < v.west || b.west > v.east);
    }
    b.west <= v.east || b.east >= v.west
}

/// Incrementally grows a box around visited coordinates.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundsBuilder {
    acc: Option<GeoBox>,
}

impl BoundsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, lat: f64, lng: f64) {
        match &mut self.acc {
            None => self.acc = Some(GeoBox::new(lat, lng, lat, lng)),
            Some(b) => {
                b.south = b.south.min(lat);
                b.north = b.north.max(lat);
                b.west = b.west.min(lng);
                b.east = b.east.max(lng);
            }
        }
    }

    /// `None` when nothing was visited.
    pub fn finish(self) -> Option<GeoBox> {
        self.acc
    }
}
