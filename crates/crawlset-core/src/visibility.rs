//! Visibility predicate used before annotating an element.

use crate::driver::{ElementState, Viewport};

/// An element is visible when it is rendered, not hidden, not fully
/// transparent and at least partly inside the viewport.
pub fn is_visible(state: &ElementState, viewport: &Viewport) -> bool {
    if state.display.trim() == "none" {
        return false;
    }
    if state.visibility.trim() == "hidden" {
        return false;
    }
    if is_transparent(&state.opacity) {
        return false;
    }
    state.rect.intersects(viewport)
}

fn is_transparent(opacity: &str) -> bool {
    let opacity = opacity.trim();
    opacity == "0" || opacity.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
}
