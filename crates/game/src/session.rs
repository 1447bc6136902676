use std::collections::BTreeSet;
use std::rc::Rc;

use catalog::{ALL_CONTINENTS, Catalog, City, Lod};
use foundation::bounds::GeoBox;
use foundation::math::haversine_km;
use layers::metadata::CountryFeature;
use layers::symbology::CountryStyleInput;
use layers::{CountryLayer, Layer, LayerId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use runtime::clock::Clock;
use tracing::{debug, info};

use crate::effect::{GameEffect, GuessOutcome, Turn};
use crate::target::{CountryTarget, Mode, Prompt, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PoolKey {
    layer: LayerId,
    lod: Lod,
    continent: String,
    found: usize,
    failed: usize,
    hide_islands: bool,
}

#[derive(Debug)]
struct PoolMemo {
    key: PoolKey,
    built_at_ms: u64,
    /// Indices into the layer's features.
    members: Vec<usize>,
}

/// Progress over the current scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStats {
    pub label: String,
    pub cities: bool,
    pub done: usize,
    pub total: usize,
}

impl std::fmt::Display for ScopeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.cities { "Cities" } else { "Countries" };
        write!(f, "{}: {kind} {} / {}", self.label, self.done, self.total)
    }
}

/// Quiz session: target, attempts, progress sets and the candidate pool.
///
/// Every operation is synchronous and returns the effects the driver has to
/// perform (timers, camera moves, restyles). Operations that depend on the
/// country features take the active layer explicitly.
pub struct Game {
    catalog: Rc<Catalog>,
    clock: Rc<dyn Clock>,
    rng: StdRng,
    mode: Mode,
    continent: String,
    hide_islands: bool,
    target: Option<Target>,
    attempts_left: u32,
    locked: bool,
    found_countries: BTreeSet<String>,
    failed_countries: BTreeSet<String>,
    found_cities: BTreeSet<String>,
    failed_cities: BTreeSet<String>,
    pool: Option<PoolMemo>,
    pool_rebuilds: u64,
    preloaded_flags: BTreeSet<String>,
}

impl Game {
    pub fn new(catalog: Rc<Catalog>, clock: Rc<dyn Clock>) -> Self {
        Self::with_rng(catalog, clock, StdRng::from_os_rng())
    }

    /// Deterministic picks, for replays and tests.
    pub fn with_seed(catalog: Rc<Catalog>, clock: Rc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(catalog, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Rc<Catalog>, clock: Rc<dyn Clock>, rng: StdRng) -> Self {
        let attempts_left = catalog.tunables.max_attempts;
        Self {
            catalog,
            clock,
            rng,
            mode: Mode::default(),
            continent: ALL_CONTINENTS.to_string(),
            hide_islands: true,
            target: None,
            attempts_left,
            locked: false,
            found_countries: BTreeSet::new(),
            failed_countries: BTreeSet::new(),
            found_cities: BTreeSet::new(),
            failed_cities: BTreeSet::new(),
            pool: None,
            pool_rebuilds: 0,
            preloaded_flags: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn continent(&self) -> &str {
        &self.continent
    }

    pub fn hide_islands(&self) -> bool {
        self.hide_islands
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn found_countries(&self) -> &BTreeSet<String> {
        &self.found_countries
    }

    pub fn failed_countries(&self) -> &BTreeSet<String> {
        &self.failed_countries
    }

    pub fn found_cities(&self) -> &BTreeSet<String> {
        &self.found_cities
    }

    pub fn failed_cities(&self) -> &BTreeSet<String> {
        &self.failed_cities
    }

    /// Found count for the current mode.
    pub fn correct_count(&self) -> usize {
        if self.mode.is_city() {
            self.found_cities.len()
        } else {
            self.found_countries.len()
        }
    }

    /// How many times the country pool was rescanned.
    pub fn pool_rebuilds(&self) -> u64 {
        self.pool_rebuilds
    }

    fn in_scope(&self, continent: &str) -> bool {
        self.continent == ALL_CONTINENTS || self.continent == continent
    }

    fn country_resolved(&self, iso2: &str) -> Option<bool> {
        if self.found_countries.contains(iso2) {
            Some(true)
        } else if self.failed_countries.contains(iso2) {
            Some(false)
        } else {
            None
        }
    }

    fn pool_key(&self, layer: &CountryLayer) -> PoolKey {
        PoolKey {
            layer: layer.id(),
            lod: layer.lod(),
            continent: self.continent.clone(),
            found: self.found_countries.len(),
            failed: self.failed_countries.len(),
            hide_islands: self.hide_islands,
        }
    }

    /// Unresolved in-scope countries with an ISO code, islands removed when
    /// hiding them. Memoized per key for `pool_ttl_ms`.
    fn country_pool(&mut self, layer: &CountryLayer) -> Vec<usize> {
        let key = self.pool_key(layer);
        let now = self.clock.now_ms();
        let ttl = self.catalog.tunables.pool_ttl_ms;
        if let Some(memo) = &self.pool {
            if memo.key == key && now.saturating_sub(memo.built_at_ms) < ttl {
                return memo.members.clone();
            }
        }

        let members: Vec<usize> = layer
            .features()
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                let meta = layer.meta(f);
                let Some(iso) = meta.iso2.as_deref() else {
                    return false;
                };
                self.in_scope(&meta.continent)
                    && !(self.hide_islands && self.catalog.is_island(iso))
                    && self.country_resolved(iso).is_none()
            })
            .map(|(i, _)| i)
            .collect();
        self.pool_rebuilds += 1;
        debug!(size = members.len(), continent = %self.continent, "country pool rebuilt");
        self.pool = Some(PoolMemo {
            key,
            built_at_ms: now,
            members: members.clone(),
        });
        members
    }

    fn unresolved_cities(&self) -> Vec<City> {
        self.catalog
            .cities_in(&self.continent)
            .into_iter()
            .filter(|c| !self.found_cities.contains(&c.id) && !self.failed_cities.contains(&c.id))
            .cloned()
            .collect()
    }

    fn preload_flag(&mut self, iso2: &str) -> Option<GameEffect> {
        let url = self.catalog.flag_url(iso2);
        self.preloaded_flags
            .insert(url.clone())
            .then_some(GameEffect::PreloadFlag { url })
    }

    /// Draws the next target uniformly from the pool and unlocks guessing.
    pub fn next(&mut self, countries: Option<&CountryLayer>) -> Vec<GameEffect> {
        self.locked = false;
        let mut effects = Vec::new();

        let picked = if self.mode.is_city() {
            let pool = self.unresolved_cities();
            if pool.is_empty() {
                None
            } else {
                let i = self.rng.random_range(0..pool.len());
                pool.into_iter().nth(i).map(Target::City)
            }
        } else {
            countries.and_then(|layer| {
                let pool = self.country_pool(layer);
                if pool.is_empty() {
                    return None;
                }
                let i = pool[self.rng.random_range(0..pool.len())];
                CountryTarget::from_feature(layer, &layer.features()[i]).map(Target::Country)
            })
        };

        match picked {
            None => {
                info!(mode = %self.mode, continent = %self.continent, "nothing left to pick");
                self.target = None;
                effects.push(GameEffect::Done);
            }
            Some(target) => {
                if let Target::Country(c) = &target {
                    effects.extend(self.preload_flag(&c.iso2));
                }
                debug!(name = target.name(), "new target");
                self.attempts_left = self.catalog.tunables.max_attempts;
                self.target = Some(target);
            }
        }
        effects
    }

    /// Centre on a revealed country and bring the zoom into the focus range.
    fn focus_effects(&self, bbox: &GeoBox, zoom: f64) -> Vec<GameEffect> {
        let (lat, lng) = bbox.center();
        let mut effects = vec![GameEffect::PanTo { lat, lng }];
        let t = &self.catalog.tunables;
        if zoom < t.focus_zoom_min {
            effects.push(GameEffect::SetZoom {
                zoom: t.focus_zoom_min,
            });
        } else if zoom > t.max_focus_zoom {
            effects.push(GameEffect::SetZoom {
                zoom: t.max_focus_zoom,
            });
        }
        effects
    }

    /// A click on a country feature in name or flag mode.
    pub fn guess_country(
        &mut self,
        layer: &CountryLayer,
        feature: &CountryFeature,
        zoom: f64,
    ) -> Turn {
        if self.mode.is_city() || self.locked {
            return Turn::ignored();
        }
        let meta = layer.meta(feature);
        if !self.in_scope(&meta.continent) {
            return Turn::ignored();
        }
        let Some(iso) = meta.iso2.clone() else {
            return Turn::ignored();
        };
        if self.country_resolved(&iso).is_some() {
            return Turn::ignored();
        }

        let delays = self.catalog.tunables.delays;
        let target = match &self.target {
            Some(Target::Country(t)) => Some(t.clone()),
            _ => None,
        };

        if target.as_ref().is_some_and(|t| t.iso2 == iso) {
            self.locked = true;
            self.found_countries.insert(iso.clone());
            info!(iso = %iso, "country found");
            return Turn {
                outcome: GuessOutcome::Correct { distance_km: None },
                effects: vec![
                    GameEffect::RestyleCountries,
                    GameEffect::ScheduleNextPick {
                        after_ms: delays.country_correct_ms,
                    },
                ],
            };
        }

        self.attempts_left = self.attempts_left.saturating_sub(1);
        let mut effects = vec![GameEffect::FlashWrong {
            feature_id: feature.id().map(str::to_string),
            duration_ms: delays.wrong_flash_ms,
        }];
        debug!(clicked = %iso, attempts_left = self.attempts_left, "wrong country");

        match target {
            Some(t) if self.attempts_left == 0 => {
                self.locked = true;
                self.failed_countries.insert(t.iso2.clone());
                info!(iso = %t.iso2, "country failed");
                effects.push(GameEffect::RestyleCountries);
                if let Some(bbox) = &t.bbox {
                    effects.extend(self.focus_effects(bbox, zoom));
                }
                effects.push(GameEffect::ScheduleNextPick {
                    after_ms: delays.country_failed_ms,
                });
                Turn {
                    outcome: GuessOutcome::Failed { distance_km: None },
                    effects,
                }
            }
            _ => Turn {
                outcome: GuessOutcome::Wrong {
                    attempts_left: self.attempts_left,
                    distance_km: None,
                },
                effects,
            },
        }
    }

    /// A map click in city mode. Distance is rounded to whole kilometers
    /// before the threshold test.
    pub fn guess_city(&mut self, lat: f64, lng: f64, zoom: f64) -> Turn {
        if !self.mode.is_city() || self.locked {
            return Turn::ignored();
        }
        let Some(Target::City(city)) = self.target.clone() else {
            return Turn::ignored();
        };

        let t = self.catalog.tunables;
        let km = haversine_km(lat, lng, city.lat, city.lon).round();
        let distance_km = Some(km as u64);

        if km <= t.city_success_km {
            self.locked = true;
            self.found_cities.insert(city.id.clone());
            info!(city = %city.id, km, "city found");
            return Turn {
                outcome: GuessOutcome::Correct { distance_km },
                effects: vec![GameEffect::ScheduleNextPick {
                    after_ms: t.delays.city_correct_ms,
                }],
            };
        }

        self.attempts_left = self.attempts_left.saturating_sub(1);
        debug!(city = %city.id, km, attempts_left = self.attempts_left, "city missed");
        if self.attempts_left > 0 {
            return Turn {
                outcome: GuessOutcome::Wrong {
                    attempts_left: self.attempts_left,
                    distance_km,
                },
                effects: Vec::new(),
            };
        }

        self.locked = true;
        self.failed_cities.insert(city.id.clone());
        info!(city = %city.id, "city failed");
        let mut effects = vec![GameEffect::PanTo {
            lat: city.lat,
            lng: city.lon,
        }];
        if zoom < t.max_focus_zoom {
            effects.push(GameEffect::SetZoom {
                zoom: t.max_focus_zoom,
            });
        }
        effects.push(GameEffect::ScheduleNextPick {
            after_ms: t.delays.city_failed_ms,
        });
        Turn {
            outcome: GuessOutcome::Failed { distance_km },
            effects,
        }
    }

    pub fn set_mode(&mut self, mode: Mode, countries: Option<&CountryLayer>) -> Vec<GameEffect> {
        self.mode = mode;
        let mut effects = vec![GameEffect::RestyleCountries];
        effects.extend(self.next(countries));
        effects
    }

    pub fn set_continent(
        &mut self,
        continent: &str,
        countries: Option<&CountryLayer>,
    ) -> Vec<GameEffect> {
        self.continent = continent.to_string();
        self.pool = None;
        let mut effects = vec![GameEffect::RestyleCountries];
        effects.extend(self.next(countries));
        effects
    }

    /// Re-picks only when islands become hidden while one is the target.
    pub fn set_hide_islands(
        &mut self,
        hide: bool,
        countries: Option<&CountryLayer>,
    ) -> Vec<GameEffect> {
        self.hide_islands = hide;
        self.pool = None;
        let target_is_island = self
            .target
            .as_ref()
            .and_then(Target::country_iso)
            .is_some_and(|iso| self.catalog.is_island(iso));
        if hide && target_is_island {
            return self.next(countries);
        }
        Vec::new()
    }

    /// Clears all progress, returns to the start view and picks again.
    pub fn reset(&mut self, countries: Option<&CountryLayer>) -> Vec<GameEffect> {
        self.found_countries.clear();
        self.failed_countries.clear();
        self.found_cities.clear();
        self.failed_cities.clear();
        self.pool = None;
        self.attempts_left = self.catalog.tunables.max_attempts;
        info!("progress reset");

        let start = self.catalog.start;
        let mut effects = vec![
            GameEffect::RestyleCountries,
            GameEffect::PanTo {
                lat: start.lat,
                lng: start.lng,
            },
            GameEffect::SetZoom { zoom: start.zoom },
        ];
        effects.extend(self.next(countries));
        effects
    }

    pub fn prompt(&self) -> Prompt {
        match &self.target {
            None => Prompt::Done,
            Some(Target::Country(c)) if self.mode == Mode::Flag => Prompt::Flag {
                url: self.catalog.flag_url(&c.iso2),
                name: c.name.clone(),
            },
            Some(target) => Prompt::Name(target.name().to_string()),
        }
    }

    pub fn scope_stats(&self, countries: Option<&CountryLayer>) -> ScopeStats {
        let label = if self.continent == ALL_CONTINENTS {
            "World".to_string()
        } else {
            self.continent.clone()
        };

        if self.mode.is_city() {
            let pool = self.catalog.cities_in(&self.continent);
            let done = pool
                .iter()
                .filter(|c| self.found_cities.contains(&c.id) || self.failed_cities.contains(&c.id))
                .count();
            return ScopeStats {
                label,
                cities: true,
                done,
                total: pool.len(),
            };
        }

        let (mut done, mut total) = (0, 0);
        if let Some(layer) = countries {
            for f in layer.features() {
                let meta = layer.meta(f);
                let Some(iso) = meta.iso2.as_deref() else {
                    continue;
                };
                if !self.in_scope(&meta.continent)
                    || (self.hide_islands && self.catalog.is_island(iso))
                {
                    continue;
                }
                total += 1;
                if self.country_resolved(iso).is_some() {
                    done += 1;
                }
            }
        }
        ScopeStats {
            label,
            cities: false,
            done,
            total,
        }
    }

    /// Style facts for one country feature.
    pub fn style_input(
        &self,
        layer: &CountryLayer,
        feature: &CountryFeature,
        zoom: f64,
        hovered: bool,
        hover_suspended: bool,
    ) -> CountryStyleInput {
        let meta = layer.meta(feature);
        CountryStyleInput {
            zoom,
            resolved: meta.iso2.as_deref().and_then(|iso| self.country_resolved(iso)),
            hovered,
            hover_suspended,
            in_scope: self.in_scope(&meta.continent),
            city_mode: self.mode.is_city(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use catalog::{Catalog, City, Lod};
    use formats::geojson::FeatureCollection;
    use foundation::math::km_per_degree_lat;
    use layers::{CountryLayer, LayerId};
    use pretty_assertions::assert_eq;
    use runtime::clock::ManualClock;

    use super::Game;
    use crate::effect::{GameEffect, GuessOutcome};
    use crate::target::{Mode, Prompt, Target};

    const COUNTRIES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"ADM0_A3":"AAA","ISO_A2":"AA","NAME":"Alpha","CONTINENT":"Europe"},
         "geometry":{"type":"Polygon","coordinates":[[[0,40],[10,40],[10,50],[0,50],[0,40]]]}},
        {"type":"Feature","properties":{"ADM0_A3":"DEU","ISO_A2":"DE","NAME":"Beta","CONTINENT":"Europe"},
         "geometry":{"type":"Polygon","coordinates":[[[10,40],[20,40],[20,50],[10,50],[10,40]]]}},
        {"type":"Feature","properties":{"ADM0_A3":"JPN","ISO_A2":"JP","NAME":"Japan","CONTINENT":"Asia"},
         "geometry":{"type":"Polygon","coordinates":[[[130,30],[140,30],[140,40],[130,40],[130,30]]]}},
        {"type":"Feature","properties":{"ADM0_A3":"ZZZ","ISO_A2":"-99","NAME":"Nowhere","CONTINENT":"Europe"},
         "geometry":{"type":"Polygon","coordinates":[[[30,40],[31,40],[31,41],[30,41],[30,40]]]}}
    ]}"#;

    fn layer() -> CountryLayer {
        let fc = FeatureCollection::from_geojson_str(COUNTRIES).expect("parse");
        CountryLayer::new(LayerId(7), Lod::Medium, false, Default::default(), &fc)
    }

    fn game_with(catalog: Catalog) -> (Game, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        (Game::with_seed(Rc::new(catalog), clock.clone(), 42), clock)
    }

    fn target_iso(game: &Game) -> String {
        game.target()
            .and_then(Target::country_iso)
            .expect("country target")
            .to_string()
    }

    #[test]
    fn hidden_islands_are_never_drawn() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        assert!(game.hide_islands());
        for _ in 0..50 {
            game.next(Some(&layer));
            let iso = target_iso(&game);
            assert!(iso == "AA" || iso == "DE", "drew {iso}");
        }
    }

    #[test]
    fn three_wrong_guesses_fail_the_target() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        game.set_continent("Europe", Some(&layer));
        let target = target_iso(&game);
        let wrong_iso = if target == "AA" { "DE" } else { "AA" };
        let wrong = layer.find_by_iso(wrong_iso).expect("wrong feature");

        let turn = game.guess_country(&layer, wrong, 4.0);
        assert_eq!(
            turn.outcome,
            GuessOutcome::Wrong {
                attempts_left: 2,
                distance_km: None
            }
        );
        assert_eq!(
            turn.effects,
            vec![GameEffect::FlashWrong {
                feature_id: wrong.id().map(str::to_string),
                duration_ms: 180
            }]
        );
        game.guess_country(&layer, wrong, 4.0);
        let last = game.guess_country(&layer, wrong, 2.0);

        assert_eq!(last.outcome, GuessOutcome::Failed { distance_km: None });
        assert_eq!(game.attempts_left(), 0);
        assert!(game.failed_countries().contains(&target));
        assert!(game.is_locked());
        let (lat, lng) = layer
            .meta(layer.find_by_iso(&target).expect("target"))
            .bbox
            .expect("bbox")
            .center();
        assert!(last.effects.contains(&GameEffect::PanTo { lat, lng }));
        assert!(last.effects.contains(&GameEffect::SetZoom { zoom: 3.0 }));
        assert_eq!(
            last.effects.last(),
            Some(&GameEffect::ScheduleNextPick { after_ms: 1100 })
        );

        // Locked until the next pick.
        assert_eq!(game.guess_country(&layer, wrong, 4.0).outcome, GuessOutcome::Ignored);

        game.next(Some(&layer));
        assert_eq!(target_iso(&game), wrong_iso);
        assert_eq!(game.attempts_left(), 3);
        assert!(!game.is_locked());
    }

    #[test]
    fn correct_guess_and_ignored_clicks() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        game.set_continent("Europe", Some(&layer));
        let target = target_iso(&game);
        let feature = layer.find_by_iso(&target).expect("target");

        // Out of scope and code-less features do not cost an attempt.
        let japan = layer.find_by_iso("JP").expect("japan");
        assert_eq!(game.guess_country(&layer, japan, 4.0).outcome, GuessOutcome::Ignored);
        let nowhere = layer.find_by_id("ZZZ").expect("nowhere");
        assert_eq!(game.guess_country(&layer, nowhere, 4.0).outcome, GuessOutcome::Ignored);
        assert_eq!(game.attempts_left(), 3);

        let turn = game.guess_country(&layer, feature, 4.0);
        assert_eq!(turn.outcome, GuessOutcome::Correct { distance_km: None });
        assert_eq!(
            turn.effects,
            vec![
                GameEffect::RestyleCountries,
                GameEffect::ScheduleNextPick { after_ms: 450 }
            ]
        );
        assert_eq!(game.correct_count(), 1);

        game.next(Some(&layer));
        assert_eq!(game.guess_country(&layer, feature, 4.0).outcome, GuessOutcome::Ignored);
        let style = game.style_input(&layer, feature, 4.0, false, false);
        assert_eq!(style.resolved, Some(true));
    }

    fn one_city_catalog() -> Catalog {
        Catalog {
            cities: vec![City {
                id: "equator".to_string(),
                name: "Equator Town".to_string(),
                lat: 0.0,
                lon: 10.0,
                continent: "Africa".to_string(),
            }],
            ..Catalog::default()
        }
    }

    #[test]
    fn city_threshold_is_inclusive_at_fifty_km() {
        let (mut game, _clock) = game_with(one_city_catalog());
        game.set_mode(Mode::City, None);
        assert_eq!(game.prompt(), Prompt::Name("Equator Town".to_string()));

        let deg = |km: f64| km / km_per_degree_lat();
        let miss = game.guess_city(deg(51.0), 10.0, 4.0);
        assert_eq!(
            miss.outcome,
            GuessOutcome::Wrong {
                attempts_left: 2,
                distance_km: Some(51)
            }
        );

        let hit = game.guess_city(deg(50.0), 10.0, 4.0);
        assert_eq!(hit.outcome, GuessOutcome::Correct { distance_km: Some(50) });
        assert_eq!(hit.effects, vec![GameEffect::ScheduleNextPick { after_ms: 600 }]);
        assert!(game.found_cities().contains("equator"));

        assert_eq!(game.next(None), vec![GameEffect::Done]);
        assert_eq!(game.prompt(), Prompt::Done);
        assert_eq!(game.scope_stats(None).to_string(), "World: Cities 1 / 1");
    }

    #[test]
    fn city_failure_reveals_the_answer() {
        let (mut game, _clock) = game_with(one_city_catalog());
        game.set_mode(Mode::City, None);
        game.guess_city(20.0, 10.0, 2.0);
        game.guess_city(20.0, 10.0, 2.0);
        let last = game.guess_city(20.0, 10.0, 2.0);

        assert!(matches!(last.outcome, GuessOutcome::Failed { .. }));
        assert_eq!(
            last.effects,
            vec![
                GameEffect::PanTo { lat: 0.0, lng: 10.0 },
                GameEffect::SetZoom { zoom: 5.0 },
                GameEffect::ScheduleNextPick { after_ms: 900 },
            ]
        );
        assert!(game.failed_cities().contains("equator"));
        assert_eq!(game.guess_city(0.0, 10.0, 5.0).outcome, GuessOutcome::Ignored);
    }

    #[test]
    fn hiding_islands_repicks_an_island_target() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        assert!(game.set_hide_islands(false, Some(&layer)).is_empty());
        game.set_continent("Asia", Some(&layer));
        assert_eq!(target_iso(&game), "JP");

        let effects = game.set_hide_islands(true, Some(&layer));
        assert_eq!(effects, vec![GameEffect::Done]);
        assert!(game.target().is_none());
    }

    #[test]
    fn scope_stats_skip_islands_when_hidden() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        let stats = game.scope_stats(Some(&layer));
        assert_eq!((stats.label.as_str(), stats.done, stats.total), ("World", 0, 2));

        game.next(Some(&layer));
        let target = target_iso(&game);
        let feature = layer.find_by_iso(&target).expect("target");
        game.guess_country(&layer, feature, 4.0);
        assert_eq!(game.scope_stats(Some(&layer)).done, 1);

        game.set_hide_islands(false, Some(&layer));
        assert_eq!(game.scope_stats(Some(&layer)).total, 3);
    }

    #[test]
    fn pool_is_memoized_within_its_ttl() {
        let layer = layer();
        let (mut game, clock) = game_with(Catalog::default());
        game.next(Some(&layer));
        game.next(Some(&layer));
        assert_eq!(game.pool_rebuilds(), 1);

        clock.advance(30_000);
        game.next(Some(&layer));
        assert_eq!(game.pool_rebuilds(), 2);
    }

    #[test]
    fn flag_mode_prompts_with_the_flag_and_preloads_once() {
        let layer = layer();
        let (mut game, _clock) = game_with(Catalog::default());
        let effects = game.set_mode(Mode::Flag, Some(&layer));
        let iso = target_iso(&game).to_lowercase();
        let url = format!("https://flagcdn.com/w320/{iso}.png");
        assert!(effects.contains(&GameEffect::PreloadFlag { url: url.clone() }));
        match game.prompt() {
            Prompt::Flag { url: got, .. } => assert_eq!(got, url),
            other => panic!("expected flag prompt, got {other:?}"),
        }

        let reset = game.reset(Some(&layer));
        assert_eq!(reset[0], GameEffect::RestyleCountries);
        assert_eq!(
            reset[1],
            GameEffect::PanTo {
                lat: 46.6,
                lng: 2.2
            }
        );
        assert_eq!(game.attempts_left(), 3);
    }
}
