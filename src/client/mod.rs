// Query server client
// Blocking HTTP client, backend supervision and the terminal chat loop

pub mod chat;


use std::fs::File;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ServerConfig;
use crate::sessions::Turn;
use crate::{RagError, Result};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply to a question, as returned by the query server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AskReply {
    pub answer: String,
    pub history: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SessionHistory {
    history: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct DeleteReply {
    deleted: bool,
}

/// Blocking client for the query server
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    agent: ureq::Agent,
    ping_agent: ureq::Agent,
}

impl BackendClient {
    #[inline]
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            base_url,
            agent: build_agent(timeout),
            ping_agent: build_agent(PING_TIMEOUT),
        }
    }

    #[inline]
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let base_url = config
            .server_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Ok(Self::new(
            base_url,
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the server answers its readiness route
    #[inline]
    pub fn ping(&self) -> bool {
        let Ok(url) = self.endpoint("/") else {
            return false;
        };

        match self.ping_agent.get(url.as_str()).call() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ping to {} failed: {}", url, e);
                false
            }
        }
    }

    #[inline]
    pub fn ask(&self, session_id: &str, question: &str) -> Result<AskReply> {
        let url = self.endpoint("/ask")?;
        let body = json!({ "session_id": session_id, "question": question }).to_string();

        let response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body);
        let text = read_response(&url, response)?;
        parse_body(&text)
    }

    #[inline]
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let url = self.session_url(session_id, None)?;
        let text = read_response(&url, self.agent.get(url.as_str()).call())?;
        Ok(parse_body::<SessionHistory>(&text)?.history)
    }

    #[inline]
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/sessions")?;
        let text = read_response(&url, self.agent.get(url.as_str()).call())?;
        Ok(parse_body::<SessionList>(&text)?.sessions)
    }

    #[inline]
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let url = self.session_url(session_id, None)?;
        let text = read_response(&url, self.agent.delete(url.as_str()).call())?;
        Ok(parse_body::<DeleteReply>(&text)?.deleted)
    }

    #[inline]
    pub fn transcript(&self, session_id: &str) -> Result<String> {
        let url = self.session_url(session_id, Some("transcript"))?;
        read_response(&url, self.agent.get(url.as_str()).call())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn session_url(&self, session_id: &str, suffix: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RagError::Config(format!("Invalid server URL: {}", self.base_url)))?
            .pop_if_empty()
            .push("sessions")
            .push(session_id)
            .extend(suffix);
        Ok(url)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn read_response(
    url: &Url,
    response: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<String> {
    let mut response = response.map_err(|e| {
        RagError::BackendUnavailable(format!("Could not reach query server at {}: {}", url, e))
    })?;

    let status = response.status();
    let text = response.body_mut().read_to_string().map_err(|e| {
        RagError::BackendUnavailable(format!("Failed to read response from {}: {}", url, e))
    })?;

    if status.is_success() {
        return Ok(text);
    }

    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    if status.is_client_error() {
        Err(RagError::Validation(message))
    } else {
        Err(RagError::BackendUnavailable(format!(
            "Query server returned {}: {}",
            status.as_u16(),
            message
        )))
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| {
        RagError::BackendUnavailable(format!("Unexpected response from query server: {}", e))
    })
}

/// How a running backend was obtained
#[derive(Debug)]
pub enum BackendStatus {
    AlreadyRunning,
    Started(Child),
}

/// Starts the query server when it is not already reachable
#[derive(Debug, Clone)]
pub struct BackendSupervisor {
    program: PathBuf,
    args: Vec<String>,
    log_path: Option<PathBuf>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl BackendSupervisor {
    #[inline]
    pub fn new(program: PathBuf, args: Vec<String>, startup_timeout: Duration) -> Self {
        Self {
            program,
            args,
            log_path: None,
            startup_timeout,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Supervise `<current executable> serve`
    #[inline]
    pub fn for_current_exe(config: &ServerConfig) -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(
            program,
            vec!["serve".to_string()],
            Duration::from_secs(config.startup_timeout_secs),
        ))
    }

    /// Append the server's output to `path` instead of discarding it
    #[inline]
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    #[inline]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Ping the server, spawning it and polling until ready when it is down
    #[inline]
    pub fn ensure_running(&self, client: &BackendClient) -> Result<BackendStatus> {
        if client.ping() {
            debug!("Query server already running at {}", client.base_url());
            return Ok(BackendStatus::AlreadyRunning);
        }

        info!("Starting query server: {}", self.program.display());
        let mut child = self.spawn()?;

        let deadline = Instant::now() + self.startup_timeout;
        while Instant::now() < deadline {
            if client.ping() {
                info!("Query server started at {}", client.base_url());
                return Ok(BackendStatus::Started(child));
            }

            if let Some(status) = child.try_wait()? {
                return Err(RagError::BackendUnavailable(format!(
                    "Query server exited during startup ({})",
                    status
                )));
            }

            std::thread::sleep(self.poll_interval);
        }

        warn!(
            "Query server did not become ready within {:?}",
            self.startup_timeout
        );
        if let Err(e) = child.kill() {
            debug!("Failed to stop unresponsive query server: {}", e);
        }
        if let Err(e) = child.wait() {
            debug!("Failed to reap unresponsive query server: {}", e);
        }
        Err(RagError::BackendUnavailable(format!(
            "Query server failed to start within {} seconds",
            self.startup_timeout.as_secs()
        )))
    }

    fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());

        match &self.log_path {
            Some(path) => {
                let log = File::options().create(true).append(true).open(path)?;
                command.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        command.spawn().map_err(|e| {
            RagError::BackendUnavailable(format!(
                "Failed to launch {}: {}",
                self.program.display(),
                e
            ))
        })
    }
}
