//! Chrome process management and the [`Browser`] implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crawlset_config::BrowserConfig;
use crawlset_core::{Browser, DriverError, PageDriver};

use crate::cdp::{CdpClient, CdpError};
use crate::page::CdpPage;

const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const STARTUP_ATTEMPTS: u32 = 30;

/// Environment variable overriding the Chrome executable.
pub const CHROME_PATH_ENV: &str = "CRAWLSET_CHROME";

/// Chrome launch and connection settings.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub debug_port: u16,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Profile directory for persistent login state.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self::from(&BrowserConfig::default())
    }
}

impl From<&BrowserConfig> for ChromeConfig {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            debug_port: config.debug_port,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            profile_dir: config.profile_dir.clone(),
            headless: config.headless,
        }
    }
}

impl ChromeConfig {
    /// The profile directory, defaulting to `~/.crawlset/browser-profile`.
    pub fn get_profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".crawlset")
                .join("browser-profile")
        })
    }

    /// The CDP HTTP endpoint.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.debug_port)
    }

    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.get_profile_dir().display()),
            format!("--window-size={},{}", self.viewport_width, self.viewport_height),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-sync".to_string(),
            "--disable-translate".to_string(),
            "--metrics-recording-only".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args
    }
}

/// Find a Chrome or Chromium executable.
pub fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CHROME_PATH_ENV).map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
        warn!("{} points at missing {}", CHROME_PATH_ENV, path.display());
    }

    #[cfg(target_os = "macos")]
    let paths: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ];

    #[cfg(target_os = "linux")]
    let paths: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ];

    #[cfg(target_os = "windows")]
    let paths: &[&str] = &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let paths: &[&str] = &[];

    paths.iter().map(PathBuf::from).find(|p| p.exists())
}

/// A Chrome instance reached over its remote debugging port.
///
/// Each [`Browser::open_page`] creates a new tab.
pub struct ChromeBrowser {
    config: ChromeConfig,
    client: CdpClient,
    /// Chrome process handle, if we launched it.
    process: tokio::sync::Mutex<Option<Child>>,
    /// Session ids by target id, for routing cleanup on close.
    sessions: Mutex<HashMap<String, String>>,
}

impl ChromeBrowser {
    /// Connect to Chrome on the configured port, launching it first when
    /// nothing is listening.
    pub async fn connect(config: ChromeConfig) -> Result<Self, CdpError> {
        let mut process = None;
        if is_chrome_running(&config).await {
            info!("Chrome already running on port {}", config.debug_port);
        } else {
            info!("Chrome not running on port {}, launching...", config.debug_port);
            let mut child = launch_chrome(&config)?;

            let mut ready = false;
            for _ in 0..STARTUP_ATTEMPTS {
                tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
                if is_chrome_running(&config).await {
                    ready = true;
                    break;
                }
            }
            if !ready {
                let _ = child.kill().await;
                return Err(CdpError::LaunchFailed(
                    "Chrome failed to start within timeout".to_string(),
                ));
            }
            process = Some(child);
        }

        let client = CdpClient::connect(&config.endpoint()).await?;
        info!("Connected to Chrome at {}", client.browser_ws_url());

        Ok(Self {
            config,
            client,
            process: tokio::sync::Mutex::new(process),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Stop Chrome if this process launched it.
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.process.lock().await.take() {
            info!("Shutting down Chrome...");
            if let Err(e) = child.kill().await {
                warn!("Failed to stop Chrome: {}", e);
            }
        }
    }
}

async fn is_chrome_running(config: &ChromeConfig) -> bool {
    reqwest::get(&format!("{}/json/version", config.endpoint()))
        .await
        .is_ok()
}

fn launch_chrome(config: &ChromeConfig) -> Result<Child, CdpError> {
    let chrome_path = find_chrome().ok_or(CdpError::ChromeNotFound)?;
    let profile_dir = config.get_profile_dir();

    if let Err(e) = std::fs::create_dir_all(&profile_dir) {
        warn!("Failed to create profile directory: {}", e);
    }

    info!("Launching Chrome with profile at: {}", profile_dir.display());

    let child = Command::new(&chrome_path)
        .args(config.launch_args())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CdpError::LaunchFailed(e.to_string()))?;

    info!("Chrome launched with PID: {:?}", child.id());
    Ok(child)
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let session = self.client.new_page(None).await?;
        session
            .set_viewport(self.config.viewport_width, self.config.viewport_height)
            .await?;
        self.sessions
            .lock()
            .insert(session.target_id().to_string(), session.session_id().to_string());
        debug!("Opened page {}", session.target_id());
        Ok(Box::new(CdpPage::new(session)))
    }

    async fn close_page(&self, page: Box<dyn PageDriver>) -> Result<(), DriverError> {
        let target_id = page.page_id().to_string();
        drop(page);
        let session_id = self.sessions.lock().remove(&target_id);
        if let Some(session_id) = session_id {
            self.client.forget_session(&session_id).await;
        }
        self.client.close_page(&target_id).await?;
        debug!("Closed page {}", target_id);
        Ok(())
    }
}
