//! Chromium-family browser driven over the Chrome DevTools Protocol
//!
//! The browser runs with its own profile directory so an SSO login does not touch
//! the user's everyday profile, and with `--remote-debugging-port=0` so the OS picks
//! a free port that the browser then reports on stderr.

use crate::auth::sso::{BrowserCookie, BrowserLauncher, BrowserSession};
use crate::error::{ChipError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(target_os = "macos")]
const BROWSER_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const BROWSER_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const BROWSER_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "microsoft-edge",
    "brave-browser",
];

/// Launches a local Chromium-family browser for SSO
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    browser_path: Option<PathBuf>,
    profile_dir: PathBuf,
}

impl ChromeLauncher {
    pub fn new(browser_path: Option<PathBuf>) -> Self {
        Self {
            browser_path,
            profile_dir: Self::default_profile_dir(),
        }
    }

    pub fn with_profile_dir(mut self, profile_dir: PathBuf) -> Self {
        self.profile_dir = profile_dir;
        self
    }

    /// `<cache dir>/collibra/sso-browser-profile`
    pub fn default_profile_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("collibra")
            .join("sso-browser-profile")
    }

    /// Resolve the browser executable: the configured one, else the first installed candidate
    pub fn find_browser(&self) -> Result<PathBuf> {
        if let Some(path) = &self.browser_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(ChipError::browser_launch(format!(
                "configured browser {} does not exist",
                path.display()
            )));
        }

        BROWSER_CANDIDATES
            .iter()
            .find_map(|candidate| resolve_executable(Path::new(candidate)))
            .ok_or_else(|| {
                ChipError::browser_launch(
                    "no Chrome, Chromium or Edge installation found; set browser-path",
                )
            })
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Absolute candidates are checked directly; bare names are searched on `PATH`
fn resolve_executable(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(candidate))
        .find(|path| path.is_file())
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let executable = self.find_browser()?;
        std::fs::create_dir_all(&self.profile_dir).map_err(|e| {
            ChipError::browser_launch(format!(
                "cannot create browser profile {}: {}",
                self.profile_dir.display(),
                e
            ))
        })?;

        info!("Launching browser {} for SSO", executable.display());
        let mut child = Command::new(&executable)
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", self.profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChipError::browser_launch(format!("{}: {}", executable.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ChipError::browser_launch("browser stderr was not captured"))?;

        let ws_url = match timeout(LAUNCH_TIMEOUT, read_devtools_url(stderr)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(ChipError::browser_launch(format!(
                    "browser did not report a DevTools endpoint within {}s",
                    LAUNCH_TIMEOUT.as_secs()
                )));
            }
        };
        debug!("DevTools endpoint: {}", ws_url);

        let (socket, _) = match connect_async(ws_url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                let _ = child.kill().await;
                return Err(ChipError::browser_launch(format!(
                    "DevTools connection failed: {}",
                    e
                )));
            }
        };

        let mut session = ChromeSession {
            child: Some(child),
            cdp: CdpConnection::new(socket),
            page_target: String::new(),
            page_session: String::new(),
        };
        if let Err(e) = session.open_page().await {
            let _ = session.close().await;
            return Err(ChipError::browser_launch(e.to_string()));
        }
        Ok(Box::new(session))
    }
}

/// Read stderr until the DevTools URL appears, then keep draining it in the background
async fn read_devtools_url(stderr: ChildStderr) -> Result<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = line.trim().strip_prefix(DEVTOOLS_PREFIX) {
            let url = url.trim().to_string();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(target: "chip::browser", "{}", line);
                }
            });
            return Ok(url);
        }
        trace!(target: "chip::browser", "{}", line);
    }
    Err(ChipError::browser_launch(
        "browser exited before reporting a DevTools endpoint",
    ))
}

type CdpSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sequential request/response client over one DevTools WebSocket
struct CdpConnection {
    socket: CdpSocket,
    next_id: u64,
}

impl CdpConnection {
    fn new(socket: CdpSocket) -> Self {
        Self { socket, next_id: 0 }
    }

    /// Send one command and wait for its reply; events in between are skipped
    async fn call(&mut self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            message["sessionId"] = json!(session_id);
        }

        self.socket
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| ChipError::browser(format!("{}: send failed: {}", method, e)))?;

        match timeout(COMMAND_TIMEOUT, self.wait_for_reply(id, method)).await {
            Ok(reply) => reply,
            Err(_) => Err(ChipError::browser(format!(
                "{}: no reply within {}s",
                method,
                COMMAND_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn wait_for_reply(&mut self, id: u64, method: &str) -> Result<Value> {
        while let Some(frame) = self.socket.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    return Err(ChipError::browser(format!("{}: receive failed: {}", method, e)))
                }
            };

            let reply: Value = serde_json::from_str(&text)?;
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = reply.get("error") {
                return Err(ChipError::browser(format!("{}: {}", method, error)));
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
        Err(ChipError::browser(format!(
            "{}: DevTools connection closed",
            method
        )))
    }
}

/// A launched browser with one attached page
struct ChromeSession {
    child: Option<Child>,
    cdp: CdpConnection,
    page_target: String,
    page_session: String,
}

impl ChromeSession {
    async fn open_page(&mut self) -> Result<()> {
        let created = self
            .cdp
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        self.page_target = string_field(&created, "targetId")?;

        let attached = self
            .cdp
            .call(
                "Target.attachToTarget",
                json!({ "targetId": self.page_target, "flatten": true }),
                None,
            )
            .await?;
        self.page_session = string_field(&attached, "sessionId")?;
        Ok(())
    }
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChipError::browser(format!("DevTools reply is missing '{}'", field)))
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &Url) -> Result<()> {
        let reply = self
            .cdp
            .call(
                "Page.navigate",
                json!({ "url": url.as_str() }),
                Some(self.page_session.as_str()),
            )
            .await?;
        if let Some(error) = reply.get("errorText").and_then(Value::as_str) {
            return Err(ChipError::browser(format!("navigation to {} failed: {}", url, error)));
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Url> {
        let reply = self
            .cdp
            .call(
                "Target.getTargetInfo",
                json!({ "targetId": self.page_target }),
                None,
            )
            .await?;
        let location = reply
            .pointer("/targetInfo/url")
            .and_then(Value::as_str)
            .ok_or_else(|| ChipError::browser("target info has no url"))?;
        Url::parse(location)
            .map_err(|e| ChipError::browser(format!("unparsable page location '{}': {}", location, e)))
    }

    async fn cookies(&mut self, url: &Url) -> Result<Vec<BrowserCookie>> {
        let reply = self
            .cdp
            .call(
                "Network.getCookies",
                json!({ "urls": [url.as_str()] }),
                Some(self.page_session.as_str()),
            )
            .await?;
        Ok(parse_cookies(&reply))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Err(e) = self.cdp.call("Browser.close", json!({}), None).await {
            debug!("Browser.close failed, killing browser: {}", e);
        }
        match timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Browser exited with {}", status);
                Ok(())
            }
            _ => {
                warn!("Browser did not exit after Browser.close, killing it");
                child.kill().await.map_err(ChipError::from)
            }
        }
    }
}

fn parse_cookies(reply: &Value) -> Vec<BrowserCookie> {
    reply
        .get("cookies")
        .and_then(Value::as_array)
        .map(|cookies| {
            cookies
                .iter()
                .filter_map(|c| {
                    Some(BrowserCookie {
                        name: c.get("name")?.as_str()?.to_string(),
                        value: c.get("value")?.as_str()?.to_string(),
                        domain: c.get("domain").and_then(Value::as_str).unwrap_or_default().to_string(),
                        expires: c.get("expires").and_then(Value::as_f64),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies() {
        let reply = json!({
            "cookies": [
                { "name": "JSESSIONID", "value": "abc123", "domain": "acme.collibra.com", "expires": -1 },
                { "name": "other", "value": "x", "domain": ".collibra.com", "expires": 1893456000.5 },
                { "value": "nameless" }
            ]
        });
        let cookies = parse_cookies(&reply);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "JSESSIONID");
        assert_eq!(cookies[0].expires, Some(-1.0));
        assert_eq!(cookies[1].domain, ".collibra.com");
    }

    #[test]
    fn test_missing_configured_browser() {
        let launcher = ChromeLauncher::new(Some(PathBuf::from("/nonexistent/chrome")));
        assert!(matches!(
            launcher.find_browser(),
            Err(ChipError::BrowserLaunch { .. })
        ));
    }

    #[test]
    fn test_default_profile_dir() {
        let dir = ChromeLauncher::default_profile_dir();
        assert!(dir.ends_with("collibra/sso-browser-profile"));
    }
}
