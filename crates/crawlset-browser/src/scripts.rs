//! Function declarations run in the page through `Runtime.callFunctionOn`.
//!
//! `this` is the target node; documents, shadow roots and elements are all
//! accepted where a root is expected.

/// Body fragment computing `this`'s bounding rect in top-level viewport
/// coordinates by walking up same-origin frame elements.
macro_rules! top_rect {
    () => {
        "const r = this.getBoundingClientRect();
        let x = r.left, y = r.top;
        let win = this.ownerDocument.defaultView;
        while (win && win.frameElement) {
            const frame = win.frameElement;
            const fr = frame.getBoundingClientRect();
            const fs = frame.ownerDocument.defaultView.getComputedStyle(frame);
            x += fr.left + (parseFloat(fs.borderLeftWidth) || 0) + (parseFloat(fs.paddingLeft) || 0);
            y += fr.top + (parseFloat(fs.borderTopWidth) || 0) + (parseFloat(fs.paddingTop) || 0);
            win = frame.ownerDocument.defaultView;
        }
        const rect = { x: x, y: y, width: r.width, height: r.height };"
    };
}

pub const SELECT_ALL: &str = "function(selector) {
    return Array.from(this.querySelectorAll(selector));
}";

/// Open shadow roots of `this` and of every element below it.
pub const SHADOW_ROOTS: &str = "function() {
    const out = [];
    if (this.shadowRoot) out.push(this.shadowRoot);
    for (const el of this.querySelectorAll('*')) {
        if (el.shadowRoot) out.push(el.shadowRoot);
    }
    return out;
}";

/// Documents of frames whose content is reachable from this origin.
pub const FRAME_DOCUMENTS: &str = "function() {
    const out = [];
    for (const frame of this.querySelectorAll('iframe, frame')) {
        try {
            const doc = frame.contentDocument;
            if (doc && doc.documentElement) out.push(doc);
        } catch (e) {}
    }
    return out;
}";

pub const MATCHES: &str = "function(selector) {
    return this.matches(selector);
}";

pub const ELEMENT_STATE: &str = concat!(
    "function() {\n",
    top_rect!(),
    "
    const style = this.ownerDocument.defaultView.getComputedStyle(this);
    return {
        display: style.display,
        visibility: style.visibility,
        opacity: style.opacity,
        rect: rect,
    };
}"
);

pub const BOUNDING_RECT: &str = concat!("function() {\n", top_rect!(), "\n    return rect;\n}");

pub const VIEWPORT: &str = "({
    width: window.innerWidth,
    height: window.innerHeight,
    dpr: window.devicePixelRatio || 1,
})";

/// Returns the previous inline outline.
pub const SET_OUTLINE: &str = "function(value) {
    const previous = this.style.outline;
    this.style.outline = value;
    return previous;
}";

pub const SET_ATTRIBUTE: &str = "function(name, value) {
    if (value === null) this.removeAttribute(name);
    else this.setAttribute(name, value);
}";

/// Forces layout, then resolves after the next animation frame. The timeout
/// covers background tabs where rAF never fires.
pub const FLUSH_RENDER: &str = "new Promise(resolve => {
    if (document.body) void document.body.offsetHeight;
    let done = false;
    const finish = () => { if (!done) { done = true; resolve(true); } };
    requestAnimationFrame(() => finish());
    setTimeout(finish, 100);
})";

pub const SCROLL_TO_CENTER: &str = "function() {
    this.scrollIntoView({ block: 'center', inline: 'nearest', behavior: 'instant' });
}";

pub const CLICK: &str = "function() {
    this.click();
}";

/// Resolved `href` of an HTML anchor, `null` otherwise.
pub const HREF: &str = "function() {
    return typeof this.href === 'string' && this.href ? this.href : null;
}";

pub fn scroll_by(dy: f64) -> String {
    format!("window.scrollBy(0, {})", dy)
}
