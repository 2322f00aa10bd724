//! In-page JavaScript used by discovery, activation and capture.
//!
//! Every script starts with a `/*cwcot:...*/` marker naming its purpose so
//! that page logs and scripted test pages can tell them apart.

/// Script markers.
pub mod marker {
    pub const LIST_TILES: &str = "/*cwcot:list-tiles*/";
    pub const ACTIVATE_TILE: &str = "/*cwcot:activate-tile*/";
    pub const CLICKABLES: &str = "/*cwcot:clickables*/";
    pub const CLICK_INDEX: &str = "/*cwcot:click-index*/";
    pub const OPEN_PANEL: &str = "/*cwcot:open-panel*/";
    pub const PANEL_HTML: &str = "/*cwcot:panel-html*/";
    pub const FIRST_TARGET: &str = "/*cwcot:first-target*/";
    pub const TIMELINE: &str = "/*cwcot:timeline*/";
    pub const CAPTURE_INSTALL: &str = "/*cwcot:capture-install*/";
    pub const CAPTURE_READ: &str = "/*cwcot:capture-read*/";
    pub const CAPTURE_RESET: &str = "/*cwcot:capture-reset*/";
    pub const FETCH_ARTIFACT: &str = "/*cwcot:fetch-artifact*/";
    pub const PING: &str = "/*cwcot:ping*/";
}

/// Selector for elements treated as clickable in the external snapshot.
const CLICKABLE_SELECTOR: &str = r#"a, button, [role="button"], [onclick], [tabindex]"#;

/// Shared helpers: document-region scopes and tile enumeration.
///
/// Tiles are deduplicated by element identity; nested matches collapse into
/// the first element taken. Ordinals count per lowercased label.
const TILE_HELPERS: &str = r#"
function __cwcotNorm(t) {
  return (t || '').replace(/\u00AD/g, '').replace(/[\u2010-\u2015\u2212]/g, '-').replace(/\s+/g, ' ').trim();
}
function __cwcotScopes() {
  const SCOPES = [
    '[data-testid*="document" i]',
    '[data-elm-id*="document" i]',
    '[id*="document" i]',
    '[class*="document" i]',
    '[aria-label*="document" i]',
  ];
  let scopes = [];
  for (const sel of SCOPES) {
    for (const el of document.querySelectorAll(sel)) {
      if (scopes.length >= 6) break;
      if (scopes.some(s => s === el || s.contains(el))) continue;
      scopes = scopes.filter(s => !el.contains(s));
      scopes.push(el);
    }
  }
  return scopes;
}
function __cwcotTiles() {
  const ITEMS = [
    '[data-testid*="document-tile" i]',
    '[data-testid*="document-item" i]',
    '[class*="document-tile" i]',
    '[class*="document-item" i]',
    '[class*="DocumentTile"]',
    'li',
    'a[href]',
    'button',
    '[role="button"]',
  ];
  let scopes = __cwcotScopes();
  if (!scopes.length && document.body) scopes = [document.body];
  const taken = [];
  const counts = {};
  const out = [];
  for (const scope of scopes) {
    for (const sel of ITEMS) {
      for (const el of scope.querySelectorAll(sel)) {
        if (taken.some(t => t === el || t.contains(el) || el.contains(t))) continue;
        const label = __cwcotNorm(el.innerText || el.textContent);
        if (!label || label.length > 160) continue;
        taken.push(el);
        const key = label.toLowerCase();
        const ordinal = counts[key] || 0;
        counts[key] = ordinal + 1;
        const link = el.matches('a[href]') ? el : el.querySelector('a[href]');
        out.push({
          el,
          label,
          key,
          ordinal,
          href: link ? link.getAttribute('href') || '' : '',
          sourceId: el.id || el.getAttribute('data-testid') || '',
        });
      }
    }
  }
  return out;
}
function __cwcotActivate(el) {
  const target = el.matches('a[href], button, [role="button"]')
    ? el
    : (el.querySelector('a[href], button, [role="button"]') || el);
  target.scrollIntoView({ block: 'center', inline: 'center' });
  target.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));
}
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Enumerate document tiles as `[{label, href, ordinal, sourceId}]`.
pub fn list_tiles() -> String {
    format!(
        "{}(() => {{ {TILE_HELPERS}\n return __cwcotTiles().map(t => ({{ label: t.label, href: t.href, ordinal: t.ordinal, sourceId: t.sourceId }})); }})()",
        marker::LIST_TILES
    )
}

/// Activate the tile with the given normalized label and ordinal.
pub fn activate_tile(key: &str, ordinal: u32) -> String {
    format!(
        "{}(() => {{ {TILE_HELPERS}\n const hit = __cwcotTiles().find(t => t.key === {} && t.ordinal === {ordinal}); if (!hit) return {{ clicked: false }}; __cwcotActivate(hit.el); return {{ clicked: true }}; }})()",
        marker::ACTIVATE_TILE,
        js_string(key),
    )
}

/// Labels of every clickable element, in document order.
pub fn clickables() -> String {
    format!(
        "{}Array.from(document.querySelectorAll({})).map(el => (el.innerText || el.textContent || '').replace(/\\s+/g, ' ').trim())",
        marker::CLICKABLES,
        js_string(CLICKABLE_SELECTOR),
    )
}

/// Click the clickable element at `index` of the snapshot order.
pub fn click_index(index: usize) -> String {
    format!(
        "{}(() => {{ const el = document.querySelectorAll({})[{index}]; if (!el) return {{ clicked: false }}; el.scrollIntoView({{ block: 'center' }}); el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }})); return {{ clicked: true }}; }})()",
        marker::CLICK_INDEX,
        js_string(CLICKABLE_SELECTOR),
    )
}

/// Open the page's "Documents" tab or section, if one exists.
pub fn open_panel() -> String {
    format!(
        r#"{}(() => {{
  const re = /^\s*(property\s+)?documents?\b/i;
  const el = Array.from(document.querySelectorAll('button, [role="tab"], [role="button"], summary, a'))
    .filter(e => !(e.tagName === 'A' && (e.getAttribute('href') || '#').charAt(0) !== '#'))
    .find(e => re.test((e.innerText || e.textContent || '').trim()));
  if (!el) return false;
  if (el.getAttribute('aria-expanded') === 'true' || el.getAttribute('aria-selected') === 'true') return true;
  el.scrollIntoView({{ block: 'center' }});
  el.click();
  return true;
}})()"#,
        marker::OPEN_PANEL
    )
}

/// Rendered markup of the document scopes, or an empty string.
pub fn panel_html() -> String {
    format!(
        "{}(() => {{ {TILE_HELPERS}\n return __cwcotScopes().map(s => s.outerHTML).join('\\n'); }})()",
        marker::PANEL_HTML
    )
}

/// Find the first control naming the target addendum; optionally activate it.
///
/// Returns `{found, label, href}`.
pub fn first_target(activate: bool) -> String {
    format!(
        r#"{}(() => {{ {TILE_HELPERS}
  const target = /purchase\s+agreement\s+addendum|addendum\s+to\s+(the\s+)?purchase\s+agreement/i;
  const prohibited = /prohibited\s+sales?\s+addendum/i;
  const el = Array.from(document.querySelectorAll('a, button, [role="button"], [onclick], li'))
    .find(e => {{
      const t = __cwcotNorm(e.innerText || e.textContent);
      return t.length <= 160 && target.test(t) && !prohibited.test(t);
    }});
  if (!el) return {{ found: false, label: '', href: '' }};
  const link = el.closest('a[href]') || el.querySelector('a[href]');
  const result = {{ found: true, label: __cwcotNorm(el.innerText || el.textContent), href: link ? link.getAttribute('href') || '' : '' }};
  if ({activate}) __cwcotActivate(el);
  return result;
}})()"#,
        marker::FIRST_TARGET
    )
}

/// Names of every resource-timing entry recorded by the page.
pub fn timeline() -> String {
    format!(
        "{}performance.getEntriesByType('resource').map(e => e.name)",
        marker::TIMELINE
    )
}

/// Install the runtime capture object. Idempotent; also registered as an
/// init script so it is present on every new document.
pub fn capture_install() -> String {
    format!(
        r#"{}(() => {{
  if (window.__cwcotCapture) return true;
  const cap = {{ log: [] }};
  const record = (kind, value) => {{ try {{ cap.log.push({{ kind, value: String(value || '') }}); }} catch (_) {{}} }};
  Object.defineProperty(window, '__cwcotCapture', {{ value: cap, configurable: false, enumerable: false }});
  const origOpen = window.open;
  window.open = function (url, ...rest) {{
    try {{ record('open', url ? new URL(String(url), location.href).href : ''); }} catch (_) {{ record('open', url); }}
    return origOpen.call(this, url, ...rest);
  }};
  document.addEventListener('click', ev => {{
    const a = ev.target && ev.target.closest ? ev.target.closest('a[href]') : null;
    if (a) record('click', a.href);
  }}, true);
  if (window.URL && URL.createObjectURL) {{
    const origCreate = URL.createObjectURL.bind(URL);
    URL.createObjectURL = function (obj) {{
      const href = origCreate(obj);
      try {{ if (obj && /pdf/i.test(obj.type || '')) record('object_url', href); }} catch (_) {{}}
      return href;
    }};
  }}
  return true;
}})()"#,
        marker::CAPTURE_INSTALL
    )
}

/// Snapshot of the capture log as `[{kind, value}]`.
pub fn capture_read() -> String {
    format!(
        "{}(window.__cwcotCapture ? window.__cwcotCapture.log.slice() : [])",
        marker::CAPTURE_READ
    )
}

/// Clear the capture log.
pub fn capture_reset() -> String {
    format!(
        "{}(() => {{ if (window.__cwcotCapture) window.__cwcotCapture.log.length = 0; return true; }})()",
        marker::CAPTURE_RESET
    )
}

/// Fetch `url` with the page's credentials and return its bytes as base64.
///
/// Returns `{ok, status, contentType, data}`.
pub fn fetch_artifact(url: &str) -> String {
    format!(
        r#"{}(async () => {{
  const res = await fetch({}, {{ credentials: 'include' }});
  if (!res.ok) return {{ ok: false, status: res.status, contentType: '', data: '' }};
  const bytes = new Uint8Array(await res.arrayBuffer());
  let binary = '';
  for (let i = 0; i < bytes.length; i += 0x8000) {{
    binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
  }}
  return {{ ok: true, status: res.status, contentType: res.headers.get('content-type') || '', data: btoa(binary) }};
}})()"#,
        marker::FETCH_ARTIFACT,
        js_string(url),
    )
}

/// Liveness probe.
pub fn ping() -> String {
    format!("{}1", marker::PING)
}
