/// Side effects requested by the game; the driver performs them.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEffect {
    /// Call [`crate::Game::next`] after the feedback pause.
    ScheduleNextPick { after_ms: u64 },
    /// Briefly paint a wrongly clicked feature.
    FlashWrong {
        feature_id: Option<String>,
        duration_ms: u64,
    },
    /// Found or failed sets changed; country styles are stale.
    RestyleCountries,
    PanTo { lat: f64, lng: f64 },
    SetZoom { zoom: f64 },
    /// Warm the browser cache for an upcoming flag prompt.
    PreloadFlag { url: String },
    /// Nothing left to pick in the current scope.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Locked, out of scope, already resolved, or wrong mode.
    Ignored,
    Correct { distance_km: Option<u64> },
    Wrong {
        attempts_left: u32,
        distance_km: Option<u64>,
    },
    /// Last attempt spent; the answer is revealed.
    Failed { distance_km: Option<u64> },
}

/// Result of one guess.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub outcome: GuessOutcome,
    pub effects: Vec<GameEffect>,
}

impl Turn {
    pub fn ignored() -> Self {
        Self {
            outcome: GuessOutcome::Ignored,
            effects: Vec::new(),
        }
    }
}
