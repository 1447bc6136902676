use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use catalog::Catalog;
use compute::{trace_rings, PathCommand};
use formats::geojson::Geometry;
use game::{Game, GameEffect, GuessOutcome, Prompt, Turn};
use layers::symbology::country_style;
use layers::{HeadlessMap, LayerError, LayerManager, MapWidget};
use runtime::viewport::{ViewportEffect, ViewportEvent, ViewportReactor};
use tracing::{debug, info, warn};

use crate::command::Command;

/// Wires the headless map, layer manager, viewport reactor and game together.
pub struct Session {
    pub catalog: Rc<Catalog>,
    pub map: Rc<HeadlessMap>,
    pub manager: Rc<LayerManager>,
    pub reactor: ViewportReactor,
    pub game: Game,
    pub http: reqwest::Client,
}

/// Whether the read loop keeps going.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl Session {
    pub async fn start(&mut self) -> Result<(), LayerError> {
        self.manager.initialize().await?;
        let layer = self.manager.active_country_layer();
        let effects = self.game.next(layer.as_deref());
        self.apply(effects).await;
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Click { lat, lng } => self.click(lat, lng).await,
            Command::Guess { iso } => {
                let Some(layer) = self.manager.active_country_layer() else {
                    println!("countries are not loaded yet");
                    return Flow::Continue;
                };
                match layer.find_by_iso(&iso.to_ascii_uppercase()) {
                    Some(feature) => {
                        let turn = self.game.guess_country(&layer, feature, self.map.zoom());
                        self.report(turn).await;
                    }
                    None => println!("no country with code {iso}"),
                }
            }
            Command::Hover { lat, lng } => self.hover(lat, lng),
            Command::Zoom { level } => {
                self.viewport(ViewportEvent::ZoomChanged).await;
                self.map.set_zoom(level);
                self.viewport(ViewportEvent::Idle).await;
            }
            Command::Pan { lat, lng } => {
                self.viewport(ViewportEvent::DragStart).await;
                self.map.pan_to(lat, lng);
                self.viewport(ViewportEvent::DragEnd).await;
                self.viewport(ViewportEvent::Idle).await;
            }
            Command::Background => self.viewport(ViewportEvent::Visibility { hidden: true }).await,
            Command::Foreground => {
                self.viewport(ViewportEvent::Visibility { hidden: false }).await
            }
            Command::Continent { name } => {
                let continent = name.join(" ");
                if let Err(err) = self.manager.set_continent(&continent).await {
                    warn!(%err, continent = %continent, "coastline swap failed");
                }
                let layer = self.manager.active_country_layer();
                let effects = self.game.set_continent(&continent, layer.as_deref());
                self.apply(effects).await;
            }
            Command::Mode { mode } => {
                let layer = self.manager.active_country_layer();
                let effects = self.game.set_mode(mode, layer.as_deref());
                self.apply(effects).await;
            }
            Command::Islands { state } => {
                let hide = state == "hide";
                if let Err(err) = self.manager.set_hide_islands(hide).await {
                    warn!(%err, "country rebuild failed");
                }
                let layer = self.manager.active_country_layer();
                let effects = self.game.set_hide_islands(hide, layer.as_deref());
                self.apply(effects).await;
            }
            Command::Outline { iso } => self.outline(&iso.to_ascii_uppercase()),
            Command::Visible => {
                let count = self
                    .manager
                    .active_country_layer()
                    .map(|l| l.count_visible(self.map.bounds().as_ref()))
                    .unwrap_or(0);
                println!("{count} countries in view");
            }
            Command::Stats => {
                let layer = self.manager.active_country_layer();
                println!("{}", self.game.scope_stats(layer.as_deref()));
            }
            Command::Next => {
                let layer = self.manager.active_country_layer();
                let effects = self.game.next(layer.as_deref());
                self.apply(effects).await;
            }
            Command::Reset => {
                let layer = self.manager.active_country_layer();
                let effects = self.game.reset(layer.as_deref());
                self.apply(effects).await;
            }
            Command::Help => print_help(),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    async fn click(&mut self, lat: f64, lng: f64) {
        let zoom = self.map.zoom();
        if self.game.mode().is_city() {
            let turn = self.game.guess_city(lat, lng, zoom);
            self.report(turn).await;
            return;
        }
        let Some(layer) = self.manager.active_country_layer() else {
            println!("countries are not loaded yet");
            return;
        };
        match layer.hit_test(lat, lng) {
            Some(feature) => {
                let turn = self.game.guess_country(&layer, feature, zoom);
                self.report(turn).await;
            }
            None => println!("no country there"),
        }
    }

    fn hover(&self, lat: f64, lng: f64) {
        let Some(layer) = self.manager.active_country_layer() else {
            return;
        };
        let Some(feature) = layer.hit_test(lat, lng) else {
            println!("open water");
            return;
        };
        let input = self.game.style_input(
            &layer,
            feature,
            self.map.zoom(),
            true,
            self.reactor.hover_suspended(),
        );
        let style = country_style(&input);
        println!(
            "{} fill {} @ {:.2}, stroke {} @ {:.2}",
            layer.meta(feature).name,
            style.fill_color,
            style.fill_opacity,
            style.stroke_color,
            style.stroke_opacity
        );
    }

    fn outline(&self, iso: &str) {
        let Some(layer) = self.manager.active_country_layer() else {
            return;
        };
        let Some(feature) = layer.find_by_iso(iso) else {
            println!("no country with code {iso}");
            return;
        };
        let rings: Vec<_> = match &feature.feature().geometry {
            Some(Geometry::Polygon(rings)) => rings.clone(),
            Some(Geometry::MultiPolygon(polys)) => polys.iter().flatten().cloned().collect(),
            _ => Vec::new(),
        };
        let Some(bbox) = layer.meta(feature).bbox else {
            return;
        };
        let origin = self.map.project(bbox.north, bbox.west);
        let step = if self.map.zoom() < 3.0 { 4 } else { 1 };
        let path = trace_rings(
            &rings,
            |p| self.map.project(p.lat_deg, p.lon_deg),
            step,
            origin,
        );
        let d: Vec<String> = path
            .iter()
            .map(|c| match c {
                PathCommand::MoveTo(x, y) => format!("M{x:.1} {y:.1}"),
                PathCommand::LineTo(x, y) => format!("L{x:.1} {y:.1}"),
            })
            .collect();
        println!("{}", d.join(" "));
    }

    async fn viewport(&mut self, event: ViewportEvent) {
        for effect in self.reactor.handle(event) {
            match effect {
                ViewportEffect::SuspendHover => debug!("hover suspended"),
                ViewportEffect::ResumeHover => debug!("hover resumed"),
                ViewportEffect::RunHeavyUpdate => {
                    if let Err(err) = self.manager.run_heavy_update().await {
                        warn!(%err, "heavy update failed, keeping previous layers");
                    }
                }
            }
        }
    }

    async fn report(&mut self, turn: Turn) {
        let name = self
            .game
            .target()
            .map(|t| t.name().to_string())
            .unwrap_or_default();
        match turn.outcome {
            GuessOutcome::Ignored => return,
            GuessOutcome::Correct { distance_km } => match distance_km {
                Some(km) => println!("{name} correct (±{km} km)"),
                None => println!("{name} correct"),
            },
            GuessOutcome::Wrong {
                attempts_left,
                distance_km,
            } => match distance_km {
                Some(km) => println!("{name}: {km} km away, {attempts_left} attempts left"),
                None => println!("wrong, {attempts_left} attempts left"),
            },
            GuessOutcome::Failed { .. } => println!("out of attempts, it was {name}"),
        }
        self.apply(turn.effects).await;
    }

    /// Runs game effects in order. A scheduled pick sleeps, then feeds the
    /// effects of the pick back into the queue.
    pub async fn apply(&mut self, effects: Vec<GameEffect>) {
        let mut queue: VecDeque<GameEffect> = effects.into();
        let mut camera_moved = false;
        while let Some(effect) = queue.pop_front() {
            match effect {
                GameEffect::ScheduleNextPick { after_ms } => {
                    tokio::time::sleep(Duration::from_millis(after_ms)).await;
                    let layer = self.manager.active_country_layer();
                    queue.extend(self.game.next(layer.as_deref()));
                }
                GameEffect::FlashWrong {
                    feature_id,
                    duration_ms,
                } => debug!(?feature_id, duration_ms, "wrong guess flash"),
                GameEffect::RestyleCountries => self.manager.restyle_countries(),
                GameEffect::PanTo { lat, lng } => {
                    self.map.pan_to(lat, lng);
                    camera_moved = true;
                }
                GameEffect::SetZoom { zoom } => {
                    self.viewport(ViewportEvent::ZoomChanged).await;
                    self.map.set_zoom(zoom);
                    camera_moved = true;
                }
                GameEffect::PreloadFlag { url } => {
                    let request = self.http.get(url.as_str());
                    tokio::task::spawn_local(async move {
                        if let Err(err) = request.send().await {
                            debug!(url = %url, %err, "flag preload failed");
                        }
                    });
                }
                GameEffect::Done => println!("Done ✔"),
            }
        }
        if camera_moved {
            self.viewport(ViewportEvent::Idle).await;
        }
        self.print_status();
    }

    pub fn print_status(&self) {
        let layer = self.manager.active_country_layer();
        let prompt = match self.game.prompt() {
            Prompt::Name(name) => name,
            Prompt::Flag { url, .. } => format!("flag {url}"),
            Prompt::Done => "nothing left".to_string(),
        };
        println!(
            "[{}] find: {prompt} | attempts {} | correct {} | {}",
            self.game.mode(),
            self.game.attempts_left(),
            self.game.correct_count(),
            self.game.scope_stats(layer.as_deref())
        );
    }
}

/// Best-effort cache warm-up once the session is idle.
///
/// Asks the cache proxy first and falls back to fetching directly.
pub async fn warm_up(manager: Rc<LayerManager>, http: reqwest::Client, proxy: Option<String>) {
    tokio::time::sleep(Duration::from_millis(500)).await;
    let urls = manager.warm_urls();
    if urls.is_empty() {
        return;
    }

    if let Some(origin) = proxy {
        let message = streaming::ProxyMessage::PrecacheUrls { urls: urls.clone() };
        let endpoint = format!("{}/messages", origin.trim_end_matches('/'));
        match http.post(&endpoint).json(&message).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(count = urls.len(), "precache request handed to cache proxy");
                return;
            }
            Ok(resp) => warn!(status = resp.status().as_u16(), "cache proxy refused precache"),
            Err(err) => warn!(%err, "cache proxy unreachable"),
        }
    }

    let ok = manager.warm_directly(&urls).await;
    info!(ok, total = urls.len(), "datasets warmed directly");
}

fn print_help() {
    println!(
        "commands: click LAT LNG | guess ISO | hover LAT LNG | zoom Z | pan LAT LNG\n\
         \x20         continent NAME | mode name|flag|city | islands hide|show\n\
         \x20         outline ISO | visible | stats | next | reset | background | foreground | quit"
    );
}
