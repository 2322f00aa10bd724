//! In-memory page and renderer for driving the resolver without a browser.
//!
//! `ScriptedPage` answers each in-page script by its marker (see
//! [`crate::scripts::marker`]) using registered responders, and lets a
//! responder emit popup/network signals or change the page address the way
//! a real page would after a click.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::renderer::{NavigationResult, PageSignal, RenderContext, Renderer, SignalStream};
use crate::scripts::marker;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Responder = Arc<dyn Fn(&ScriptedPage, &str) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct PageState {
    url: Mutex<String>,
    html: Mutex<String>,
    responders: Mutex<HashMap<&'static str, Responder>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PageSignal>>>,
    calls: Mutex<Vec<&'static str>>,
    navigations: Mutex<Vec<String>>,
    init_scripts: Mutex<Vec<String>>,
    closed: AtomicBool,
}

/// A scripted, in-memory [`RenderContext`]. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<PageState>,
}

const ALL_MARKERS: &[&str] = &[
    marker::LIST_TILES,
    marker::ACTIVATE_TILE,
    marker::CLICKABLES,
    marker::CLICK_INDEX,
    marker::OPEN_PANEL,
    marker::PANEL_HTML,
    marker::FIRST_TARGET,
    marker::TIMELINE,
    marker::CAPTURE_INSTALL,
    marker::CAPTURE_READ,
    marker::CAPTURE_RESET,
    marker::FETCH_ARTIFACT,
    marker::PING,
];

fn default_reply(marker: &str) -> Value {
    match marker {
        m if m == marker::LIST_TILES
            || m == marker::CLICKABLES
            || m == marker::TIMELINE
            || m == marker::CAPTURE_READ =>
        {
            json!([])
        }
        m if m == marker::ACTIVATE_TILE || m == marker::CLICK_INDEX => json!({ "clicked": false }),
        m if m == marker::FIRST_TARGET => json!({ "found": false, "label": "", "href": "" }),
        m if m == marker::PANEL_HTML => json!(""),
        m if m == marker::OPEN_PANEL => json!(false),
        m if m == marker::PING => json!(1),
        m if m == marker::FETCH_ARTIFACT => json!({ "ok": false, "status": 404 }),
        _ => json!(true),
    }
}

impl ScriptedPage {
    pub fn new(url: &str) -> Self {
        let page = Self::default();
        *lock(&page.state.url) = url.to_string();
        page
    }

    /// Set the markup returned by `get_html`.
    pub fn with_html(self, html: &str) -> Self {
        *lock(&self.state.html) = html.to_string();
        self
    }

    /// Answer scripts carrying `marker` with `responder`.
    pub fn on<F>(&self, marker: &'static str, responder: F)
    where
        F: Fn(&ScriptedPage, &str) -> Result<Value> + Send + Sync + 'static,
    {
        lock(&self.state.responders).insert(marker, Arc::new(responder));
    }

    /// Answer scripts carrying `marker` with a fixed value.
    pub fn respond(&self, marker: &'static str, value: Value) {
        self.on(marker, move |_, _| Ok(value.clone()));
    }

    /// Deliver a signal to every live observer.
    pub fn emit(&self, signal: PageSignal) {
        lock(&self.state.subscribers).retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn set_url(&self, url: &str) {
        *lock(&self.state.url) = url.to_string();
    }

    /// Number of scripts evaluated carrying `marker`.
    pub fn calls(&self, marker: &str) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|m| **m == marker)
            .count()
    }

    /// Addresses passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.state.navigations).clone()
    }

    /// Scripts registered with `add_init_script`.
    pub fn init_scripts(&self) -> Vec<String> {
        lock(&self.state.init_scripts).clone()
    }

    /// Number of observers still attached.
    pub fn live_observers(&self) -> usize {
        let mut subs = lock(&self.state.subscribers);
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }
}

#[async_trait]
impl RenderContext for ScriptedPage {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        if self.is_closed() {
            return Err(anyhow!("Target closed"));
        }
        lock(&self.state.navigations).push(url.to_string());
        self.set_url(url);
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        if self.is_closed() {
            return Err(anyhow!("Target closed"));
        }
        let Some(marker) = ALL_MARKERS.iter().copied().find(|m| script.starts_with(m)) else {
            return Ok(Value::Null);
        };
        lock(&self.state.calls).push(marker);
        let responder = lock(&self.state.responders).get(marker).cloned();
        match responder {
            Some(responder) => (responder.as_ref())(self, script),
            None => Ok(default_reply(marker)),
        }
    }

    async fn get_html(&self) -> Result<String> {
        Ok(lock(&self.state.html).clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(lock(&self.state.url).clone())
    }

    async fn add_init_script(&self, script: &str) -> Result<()> {
        lock(&self.state.init_scripts).push(script.to_string());
        Ok(())
    }

    async fn observe(&self, _popup_wait_ms: u64) -> Result<SignalStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state.subscribers).push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Renderer handing out [`ScriptedPage`]s built by a factory.
pub struct ScriptedRenderer {
    factory: Box<dyn Fn() -> ScriptedPage + Send + Sync>,
    created: Mutex<Vec<ScriptedPage>>,
    active: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ScriptedPage + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            created: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// Every page created so far, oldest first.
    pub fn created(&self) -> Vec<ScriptedPage> {
        lock(&self.created).clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = (self.factory)();
        lock(&self.created).push(page.clone());
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(page))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
