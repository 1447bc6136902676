use tracing::debug;

/// What the user is doing to the map right now.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ViewportPhase {
    #[default]
    Idle,
    Dragging,
    Zooming,
}

/// Events delivered by the map widget and the host page.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewportEvent {
    DragStart,
    DragEnd,
    ZoomChanged,
    /// The map settled after a gesture or programmatic move.
    Idle,
    /// Tab/document visibility changed.
    Visibility { hidden: bool },
}

/// Side effects the caller must perform after a transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewportEffect {
    SuspendHover,
    ResumeHover,
    /// Recompute stroke width and per-family LODs, then rebuild what changed.
    RunHeavyUpdate,
}

/// Coalesces drag and zoom bursts into one heavy update per settle.
///
/// Gestures only mark the update as pending; it runs on the next `Idle`. While
/// the document is hidden the pending flag is kept and the update runs on the
/// next foreground transition instead.
#[derive(Debug, Default, Clone)]
pub struct ViewportReactor {
    phase: ViewportPhase,
    hover_suspended: bool,
    heavy_pending: bool,
    hidden: bool,
}

impl ViewportReactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ViewportPhase {
        self.phase
    }

    pub fn hover_suspended(&self) -> bool {
        self.hover_suspended
    }

    pub fn heavy_update_pending(&self) -> bool {
        self.heavy_pending
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Marks a heavy update as needed without a gesture (e.g. continent change).
    pub fn request_heavy_update(&mut self) {
        self.heavy_pending = true;
    }

    pub fn handle(&mut self, event: ViewportEvent) -> Vec<ViewportEffect> {
        let mut effects = Vec::new();
        match event {
            ViewportEvent::DragStart => {
                self.phase = ViewportPhase::Dragging;
                self.set_hover_suspended(true, &mut effects);
            }
            ViewportEvent::DragEnd => {
                self.phase = ViewportPhase::Idle;
                self.set_hover_suspended(false, &mut effects);
                self.heavy_pending = true;
            }
            ViewportEvent::ZoomChanged => {
                self.phase = ViewportPhase::Zooming;
                self.set_hover_suspended(true, &mut effects);
                self.heavy_pending = true;
            }
            ViewportEvent::Idle => {
                self.phase = ViewportPhase::Idle;
                self.set_hover_suspended(false, &mut effects);
                self.flush_pending(&mut effects);
            }
            ViewportEvent::Visibility { hidden } => {
                self.hidden = hidden;
                if !hidden && self.phase == ViewportPhase::Idle {
                    self.flush_pending(&mut effects);
                }
            }
        }
        effects
    }

    fn set_hover_suspended(&mut self, suspended: bool, effects: &mut Vec<ViewportEffect>) {
        if self.hover_suspended == suspended {
            return;
        }
        self.hover_suspended = suspended;
        effects.push(if suspended {
            ViewportEffect::SuspendHover
        } else {
            ViewportEffect::ResumeHover
        });
    }

    fn flush_pending(&mut self, effects: &mut Vec<ViewportEffect>) {
        if !self.heavy_pending {
            return;
        }
        if self.hidden {
            debug!("heavy update deferred: document hidden");
            return;
        }
        self.heavy_pending = false;
        debug!("heavy update scheduled");
        effects.push(ViewportEffect::RunHeavyUpdate);
    }
}
