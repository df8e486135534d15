//! Panel visibility and position.

use std::sync::Arc;

use config::Storage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Storage key for the panel position.
pub const POSITION_KEY: &str = "ntr-panel-position";

/// Margin kept between the panel and the viewport edges.
pub const EDGE_MARGIN: f64 = 20.0;
/// Panel width used for clamping.
pub const PANEL_WIDTH: f64 = 300.0;
/// Upper bound on the panel height.
pub const PANEL_MAX_HEIGHT: f64 = 500.0;

/// Top-left corner of the panel in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Distance from the left edge.
    pub x: f64,
    /// Distance from the top edge.
    pub y: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self { x: 20.0, y: 70.0 }
    }
}

/// Viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Position {
    /// Clamp so the whole panel stays inside `viewport` with a margin.
    pub fn clamped(self, viewport: Viewport) -> Self {
        let panel_height = PANEL_MAX_HEIGHT.min(viewport.height - 2.0 * EDGE_MARGIN);
        let max_x = (viewport.width - PANEL_WIDTH - EDGE_MARGIN).max(EDGE_MARGIN);
        let max_y = (viewport.height - panel_height - EDGE_MARGIN).max(EDGE_MARGIN);
        Self {
            x: self.x.clamp(EDGE_MARGIN, max_x),
            y: self.y.clamp(EDGE_MARGIN, max_y),
        }
    }
}

struct Inner {
    visible: bool,
    position: Position,
}

/// Visibility flag plus persisted panel position.
#[derive(Clone)]
pub struct UiState {
    inner: Arc<Mutex<Inner>>,
    storage: Arc<dyn Storage>,
}

impl UiState {
    /// Load the stored position; the panel starts visible.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let position = storage
            .get(POSITION_KEY)
            .and_then(|raw| match serde_json::from_str::<Position>(&raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(key = POSITION_KEY, error = %e, "stored panel position is malformed");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                visible: true,
                position,
            })),
            storage,
        }
    }

    /// True when the panel is shown.
    pub fn visible(&self) -> bool {
        self.inner.lock().visible
    }

    /// Flip visibility. Returns the new state.
    pub fn toggle(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.visible = !inner.visible;
        debug!(visible = inner.visible, "ui visibility toggled");
        inner.visible
    }

    /// Current panel position.
    pub fn position(&self) -> Position {
        self.inner.lock().position
    }

    /// Move the panel, clamped to `viewport`, and persist the result.
    pub fn move_panel(&self, to: Position, viewport: Viewport) -> Position {
        let clamped = to.clamped(viewport);
        self.inner.lock().position = clamped;
        match serde_json::to_string(&clamped) {
            Ok(json) => {
                if let Err(e) = self.storage.set(POSITION_KEY, &json) {
                    warn!(error = %e, "failed to persist panel position");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode panel position"),
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use config::MemoryStorage;

    use super::*;

    const SCREEN: Viewport = Viewport {
        width: 1280.0,
        height: 800.0,
    };

    #[test]
    fn clamps_inside_margins() {
        let p = Position { x: -50.0, y: 5000.0 }.clamped(SCREEN);
        assert_eq!(p, Position { x: 20.0, y: 280.0 });
        let p = Position { x: 5000.0, y: 0.0 }.clamped(SCREEN);
        assert_eq!(p, Position { x: 960.0, y: 20.0 });
    }

    #[test]
    fn short_viewport_shrinks_panel() {
        let tiny = Viewport {
            width: 200.0,
            height: 300.0,
        };
        // Panel height 260 fills the viewport; both axes pin to the margin.
        let p = Position { x: 100.0, y: 100.0 }.clamped(tiny);
        assert_eq!(p, Position { x: 20.0, y: 20.0 });
    }

    #[test]
    fn position_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let ui = UiState::load(storage.clone());
        assert_eq!(ui.position(), Position::default());
        ui.move_panel(Position { x: 100.0, y: 120.0 }, SCREEN);
        let again = UiState::load(storage);
        assert_eq!(again.position(), Position { x: 100.0, y: 120.0 });
    }

    #[test]
    fn toggle_flips_visibility() {
        let ui = UiState::load(Arc::new(MemoryStorage::new()));
        assert!(ui.visible());
        assert!(!ui.toggle());
        assert!(ui.toggle());
    }
}
