//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, NetworkChannel, PageSignal, RenderContext, Renderer, SignalStream};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{EventTargetCreated, TargetId};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CWCOT_SCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CWCOT_SCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.cwcot-scout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".cwcot-scout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".cwcot-scout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".cwcot-scout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".cwcot-scout/chromium/chrome-linux64/chrome"),
                home.join(".cwcot-scout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance. `headless = false` shows the window,
    /// which helps when a listing site needs a manual sign-in first.
    pub async fn new(headless: bool) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set CWCOT_SCOUT_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.execute(NetworkEnableParams::default())
            .await
            .context("failed to enable network domain")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
            active_count: Arc::clone(&self.active_count),
            closed: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Browser>,
    active_count: Arc<AtomicUsize>,
    closed: AtomicBool,
}

/// Run a popup follow-up on its own task. Dropping the returned future does
/// not cancel the follow-up, so the popup is still closed when the observer
/// stream is torn down mid-wait.
fn detached_popup<F>(follow: F) -> impl Future<Output = Option<PageSignal>> + Send
where
    F: Future<Output = Option<String>> + Send + 'static,
{
    let handle = tokio::spawn(follow);
    async move {
        let url = handle.await.ok().flatten()?;
        Some(PageSignal::Popup { url })
    }
}

/// Wait for a popup target to load, read its address, then close it.
async fn follow_popup(browser: Arc<Browser>, target_id: TargetId, wait_ms: u64) -> Option<String> {
    let settle = async {
        let page = loop {
            match browser.get_page(target_id.clone()).await {
                Ok(page) => break page,
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        };
        let _ = page.wait_for_navigation().await;
        let url = page.url().await.ok().flatten();
        let _ = page.close().await;
        url
    };

    let settled = tokio::time::timeout(Duration::from_millis(wait_ms), settle).await;
    match settled {
        Ok(url) => url.filter(|u| u != "about:blank"),
        Err(_) => {
            tracing::debug!("popup did not settle within {wait_ms}ms");
            if let Ok(page) = browser.get_page(target_id.clone()).await {
                let _ = page.close().await;
            }
            None
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation failed: timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build evaluate params: {e}"))?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("JS execution failed")?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn add_init_script(&self, script: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .context("failed to register init script")?;
        Ok(())
    }

    async fn observe(&self, popup_wait_ms: u64) -> Result<SignalStream> {
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to network responses")?
            .map(|ev| PageSignal::Network {
                channel: NetworkChannel::Response,
                url: ev.response.url.clone(),
                mime_type: Some(ev.response.mime_type.clone()),
            });

        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to subscribe to network requests")?
            .map(|ev| PageSignal::Network {
                channel: NetworkChannel::Request,
                url: ev.request.url.clone(),
                mime_type: None,
            });

        let opener = self.page.target_id().clone();
        let browser = Arc::clone(&self.browser);
        let popups = self
            .browser
            .event_listener::<EventTargetCreated>()
            .await
            .context("failed to subscribe to target creation")?
            .filter_map(move |ev| {
                let info = &ev.target_info;
                let follow = (info.r#type == "page" && info.opener_id.as_ref() == Some(&opener))
                    .then(|| {
                        detached_popup(follow_popup(
                            Arc::clone(&browser),
                            info.target_id.clone(),
                            popup_wait_ms,
                        ))
                    });
                async move {
                    match follow {
                        Some(follow) => follow.await,
                        None => None,
                    }
                }
            });

        Ok(futures::stream::select_all(vec![
            responses.boxed(),
            requests.boxed(),
            popups.boxed(),
        ])
        .boxed())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.clone().close().await;
        Ok(())
    }
}
