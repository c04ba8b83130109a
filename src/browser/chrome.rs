use crate::config::APP_DIR_NAME;
use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

const DEBUG_PORT_START: u16 = 9300;
const DEBUG_PORT_END: u16 = 9800;
const READY_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct CdpTarget {
    #[serde(rename = "type")]
    target_type: String,
    #[serde(default)]
    url: String,
}

/// How the injector got hold of a debuggable Chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeSessionMode {
    Attached,
    ReusedProfile,
    LaunchedNew,
}

#[derive(Debug)]
pub struct ChromeSession {
    pub port: u16,
    pub mode: ChromeSessionMode,
    /// Set when this process launched Chrome itself.
    pub child: Option<Child>,
}

/// Allocate an available debugging port by probing localhost listeners.
pub fn allocate_port() -> Result<u16> {
    for port in DEBUG_PORT_START..=DEBUG_PORT_END {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }

    bail!(
        "No available Chrome debugging port in range {}-{}",
        DEBUG_PORT_START,
        DEBUG_PORT_END
    )
}

/// Use the configured binary if given, else look in the usual places for this OS.
pub fn detect_chrome(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        bail!("Configured Chrome binary does not exist: {}", path.display());
    }

    #[cfg(target_os = "macos")]
    {
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        if let Some(path) = paths.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "windows")]
    {
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        if let Some(path) = paths.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Ok(path);
        }
    }

    let names = [
        "google-chrome",
        "google-chrome-stable",
        "chromium-browser",
        "chromium",
        "chrome",
    ];
    for name in &names {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    bail!("Could not find Chrome browser. Install Google Chrome or set chrome_path.")
}

/// `~/.doc-upload-injector/profile`, created on demand.
pub fn default_profile_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot find home directory")?;
    let dir = home.join(format!(".{}", APP_DIR_NAME)).join("profile");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Launch Chrome on `url` with a fresh debugging port.
pub fn launch_chrome_with_debug(chrome_path: &Path, profile_dir: &Path, url: &str) -> Result<(Child, u16)> {
    let port = allocate_port()?;
    info!(
        "[Chrome launch] profile={} port={} url={}",
        profile_dir.display(),
        port,
        url
    );

    let child = Command::new(chrome_path)
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--remote-debugging-port={}", port))
        .arg("--new-window")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg(url)
        .spawn()
        .context("Failed to launch Chrome")?;

    info!("[Chrome launch] pid={} port={}", child.id(), port);
    Ok((child, port))
}

/// Attach to the configured port, reuse a debuggable Chrome already running on the profile,
/// or launch a new one.
pub async fn prepare_session(
    debug_port: Option<u16>,
    chrome_path: Option<&Path>,
    profile_dir: &Path,
    url: &str,
) -> Result<ChromeSession> {
    if let Some(port) = debug_port {
        info!("[Chrome session] attaching to port {}", port);
        return Ok(ChromeSession {
            port,
            mode: ChromeSessionMode::Attached,
            child: None,
        });
    }

    if let Some(port) = read_devtools_active_port(profile_dir) {
        if is_port_version_ready(port).await {
            info!(
                "[Chrome session] reusing debuggable session profile={} port={}",
                profile_dir.display(),
                port
            );
            return Ok(ChromeSession {
                port,
                mode: ChromeSessionMode::ReusedProfile,
                child: None,
            });
        }
    }

    let chrome = detect_chrome(chrome_path)?;
    let (child, port) = launch_chrome_with_debug(&chrome, profile_dir, url)?;
    Ok(ChromeSession {
        port,
        mode: ChromeSessionMode::LaunchedNew,
        child: Some(child),
    })
}

/// Wait until the debugging endpoint answers and has at least one page target.
pub async fn wait_for_chrome_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if is_port_version_ready(port).await {
            match page_targets(port).await {
                Ok(urls) if !urls.is_empty() => {
                    info!("Chrome is ready on port {} ({} page(s))", port, urls.len());
                    return Ok(());
                }
                Ok(_) => info!("Chrome on port {} has no page yet, waiting...", port),
                Err(e) => info!("Chrome on port {} page check failed: {}", port, e),
            }
        }

        if start.elapsed() > timeout {
            bail!(
                "CHROME_NOT_READY: Chrome was not ready within {}s on port {}",
                timeout.as_secs(),
                port
            );
        }
        tokio::time::sleep(Duration::from_millis(READY_POLL_INTERVAL_MS)).await;
    }
}

fn read_devtools_active_port(profile_dir: &Path) -> Option<u16> {
    let body = std::fs::read_to_string(profile_dir.join("DevToolsActivePort")).ok()?;
    parse_active_port(&body)
}

fn parse_active_port(body: &str) -> Option<u16> {
    body.lines().next()?.trim().parse::<u16>().ok()
}

async fn is_port_version_ready(port: u16) -> bool {
    let version_url = format!("http://127.0.0.1:{}/json/version", port);
    match reqwest::get(&version_url).await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// URLs of the page targets Chrome currently exposes.
async fn page_targets(port: u16) -> Result<Vec<String>> {
    let list_url = format!("http://127.0.0.1:{}/json/list", port);
    let resp = reqwest::get(&list_url)
        .await
        .context("Chrome json/list request failed")?;

    if !resp.status().is_success() {
        return Ok(Vec::new());
    }

    let body = resp.text().await.unwrap_or_default();
    Ok(parse_page_targets(&body))
}

fn parse_page_targets(body: &str) -> Vec<String> {
    let targets: Vec<CdpTarget> = serde_json::from_str(body).unwrap_or_default();
    targets
        .into_iter()
        .filter(|t| t.target_type == "page")
        .map(|t| t.url)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_port_file_first_line() {
        assert_eq!(parse_active_port("9333\n/devtools/browser/abc\n"), Some(9333));
        assert_eq!(parse_active_port("garbage"), None);
        assert_eq!(parse_active_port(""), None);
    }

    #[test]
    fn only_page_targets_are_listed() {
        let body = r#"[
            {"type": "service_worker", "url": "chrome://sw"},
            {"type": "page", "url": "http://localhost:8000/"},
            {"type": "iframe"}
        ]"#;
        assert_eq!(parse_page_targets(body), vec!["http://localhost:8000/"]);
        assert!(parse_page_targets("not json").is_empty());
    }

    #[test]
    fn missing_configured_binary_is_reported() {
        let err = detect_chrome(Some(Path::new("/nonexistent/chrome"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/chrome"));
    }

    #[tokio::test]
    async fn explicit_port_attaches_without_launching() {
        let session = prepare_session(Some(9444), None, Path::new("/nonexistent"), "http://x/")
            .await
            .unwrap();
        assert_eq!(session.port, 9444);
        assert_eq!(session.mode, ChromeSessionMode::Attached);
        assert!(session.child.is_none());
    }
}
