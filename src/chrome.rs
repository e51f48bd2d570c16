//! Lazily launched headless Chrome, owned by exactly one backend.
//!
//! ## Why a slot instead of a global?
//!
//! Launching Chrome costs around a second, so a run launches it once and
//! reuses it for every diagram (or every print). A process-wide static would
//! leak the browser between runs and couple concurrent runs together.
//! A [`BrowserSlot`] is a plain field of its backend: launched on first
//! [`acquire`](BrowserSlot::acquire), dropped by
//! [`release`](BrowserSlot::release) or when the backend itself is dropped.
//! `headless_chrome` kills the child process when the last `Browser` handle
//! goes away.
//!
//! `headless_chrome` is a blocking API; launching and every tab operation
//! run inside `tokio::task::spawn_blocking`.

use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Launch parameters for one browser.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Executable; `None` lets headless_chrome search the usual locations.
    pub path: Option<PathBuf>,
    /// Window size in CSS pixels.
    pub window: (u32, u32),
    /// Chrome is shut down by headless_chrome after this long without a command.
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            path: None,
            window: (1200, 800),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Exclusively owned, lazily launched browser handle.
pub struct BrowserSlot {
    options: ChromeOptions,
    browser: Option<Arc<Browser>>,
}

impl BrowserSlot {
    pub fn new(options: ChromeOptions) -> Self {
        Self {
            options,
            browser: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    /// The running browser, launching it first if needed.
    pub async fn acquire(&mut self) -> Result<Arc<Browser>, String> {
        if let Some(browser) = &self.browser {
            return Ok(Arc::clone(browser));
        }
        let options = self.options.clone();
        let browser = tokio::task::spawn_blocking(move || launch(&options))
            .await
            .map_err(|e| format!("browser launch task panicked: {e}"))??;
        let browser = Arc::new(browser);
        self.browser = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Drop the browser handle. Returns whether one was running.
    pub fn release(&mut self) -> bool {
        match self.browser.take() {
            Some(_) => {
                debug!("Headless browser released");
                true
            }
            None => false,
        }
    }
}

fn launch(options: &ChromeOptions) -> Result<Browser, String> {
    debug!("Launching headless browser...");
    let args: Vec<&OsStr> = [
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--no-first-run",
        "--hide-scrollbars",
        "--allow-file-access-from-files",
    ]
    .iter()
    .map(OsStr::new)
    .collect();

    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .window_size(Some(options.window))
        .idle_browser_timeout(options.idle_timeout)
        .path(options.path.clone())
        .args(args)
        .build()
        .map_err(|e| format!("invalid browser launch options: {e}"))?;

    let browser = Browser::new(launch_options).map_err(|e| e.to_string())?;
    info!("Headless browser launched");
    Ok(browser)
}

/// Locate a Chrome/Chromium executable without launching it.
pub fn locate_chrome(configured: Option<&PathBuf>) -> Result<PathBuf, String> {
    match configured {
        Some(path) if path.is_file() => Ok(path.clone()),
        Some(path) => Err(format!("configured browser not found: {}", path.display())),
        None => headless_chrome::browser::default_executable().inspect_err(|e| {
            warn!("No Chrome/Chromium executable found: {}", e);
        }),
    }
}
