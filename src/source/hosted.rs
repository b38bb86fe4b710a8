//! Hosted-events change source.
//!
//! Polls a GitHub-style events feed. Each request carries the cache
//! validator returned previously (`If-None-Match`): 200 processes the new
//! events and remembers the new token, 304 means nothing new and nothing
//! mutates, 400 means the feed is unavailable (logged, never fatal).
//! A server-provided `X-Poll-Interval` hint replaces the configured
//! interval after every request. Priming fetches the branch and tag
//! listings once and is fatal on failure, since incremental diffing needs
//! an initial snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{PollError, Result};

use super::changeset::ChangeManager;
use super::{sleep_or_shutdown, ChangeSource};

/// Default polling interval in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default API endpoint.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Cache-bust key for deployment events.
const DEPLOYMENTS_KEY: &str = "deployments";

#[derive(Debug, Deserialize)]
struct BranchListing {
    name: String,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TagListing {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FeedEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Poller watching a hosted repository's events feed.
#[derive(Debug)]
pub struct HostedEventsSource {
    name: String,
    repository: String,
    api_base: String,
    client: reqwest::Client,
    interval: Duration,
    etag: Option<String>,
    branches: BTreeMap<String, String>,
    tags: Vec<String>,
}

impl HostedEventsSource {
    /// Creates a source for `owner/repo`.
    #[must_use]
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            api_base: String::from(DEFAULT_API_BASE),
            client: reqwest::Client::new(),
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            etag: None,
            branches: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Overrides the API endpoint, for self-hosted installations.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The remembered cache validator, if any.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// The current branch snapshot.
    #[must_use]
    pub const fn branches(&self) -> &BTreeMap<String, String> {
        &self.branches
    }

    /// The current polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{suffix}", self.api_base, self.repository)
    }

    async fn fetch_listing<T: for<'de> Deserialize<'de>>(&self, suffix: &str) -> Result<Vec<T>> {
        let url = self.url(suffix);
        let response = self
            .client
            .get(&url)
            .header(header::USER_AGENT, "converge")
            .send()
            .await
            .map_err(|e| PollError::unavailable(&self.name, e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(PollError::unavailable(
                &self.name,
                format!("{url} returned {}", response.status()),
            )
            .into());
        }

        response.json().await.map_err(|e| {
            PollError::InvalidResponse {
                source_name: self.name.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// One polling cycle against the events feed.
    ///
    /// # Errors
    ///
    /// Network and decode failures are returned for the loop to log;
    /// they never mutate the validator or the snapshot.
    pub async fn poll_events_once(&mut self, manager: &ChangeManager) -> Result<()> {
        let mut request = self
            .client
            .get(self.url("events"))
            .header(header::USER_AGENT, "converge");

        // Provide the validator so unchanged feeds answer 304.
        if let Some(etag) = &self.etag {
            request = request.header(header::IF_NONE_MATCH, etag.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PollError::unavailable(&self.name, e.to_string()))?;

        // Adaptive throttling: the server hint overrides the configured
        // interval whenever present.
        if let Some(hint) = response
            .headers()
            .get("X-Poll-Interval")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.interval = Duration::from_secs(hint);
        }

        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                let events: Vec<FeedEvent> = response.json().await.map_err(|e| {
                    PollError::InvalidResponse {
                        source_name: self.name.clone(),
                        message: e.to_string(),
                    }
                })?;

                self.process_events(manager, &events);
                self.etag = etag;
            }
            StatusCode::NOT_MODIFIED => {
                debug!("'{}': no new events", self.name);
            }
            StatusCode::BAD_REQUEST => {
                // The feed is unavailable; keep polling regardless.
                warn!("'{}': events feed unavailable", self.name);
            }
            status => {
                warn!("'{}': unexpected events feed status {status}", self.name);
            }
        }

        Ok(())
    }

    fn process_events(&self, manager: &ChangeManager, events: &[FeedEvent]) {
        let mut changeset = manager.changeset(&self.name);

        for event in events {
            match event.kind.as_str() {
                "PushEvent" => {
                    if let Some(branch) = event
                        .payload
                        .get("ref")
                        .and_then(|v| v.as_str())
                        .and_then(|r| r.strip_prefix("refs/heads/"))
                    {
                        changeset.bust(branch);
                    }
                }
                "DeploymentEvent" => changeset.bust(DEPLOYMENTS_KEY),
                _ => {}
            }
        }

        let _ = changeset.commit();
    }
}

#[async_trait]
impl ChangeSource for HostedEventsSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prime(&mut self) -> Result<()> {
        // Both listings must succeed; nothing can be diffed without an
        // initial snapshot.
        let branches: Vec<BranchListing> =
            self.fetch_listing("branches").await.map_err(|e| {
                PollError::InitialFetch {
                    source_name: self.name.clone(),
                    message: e.to_string(),
                }
            })?;
        let tags: Vec<TagListing> = self.fetch_listing("tags").await.map_err(|e| {
            PollError::InitialFetch {
                source_name: self.name.clone(),
                message: e.to_string(),
            }
        })?;

        self.branches = branches
            .into_iter()
            .map(|b| (b.name, b.commit.sha))
            .collect();
        self.tags = tags.into_iter().map(|t| t.name).collect();

        debug!(
            "Primed '{}': {} branches, {} tags",
            self.name,
            self.branches.len(),
            self.tags.len()
        );
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        self.fetch_listing::<BranchListing>("branches")
            .await
            .map(|_| ())
    }

    async fn run(
        &mut self,
        manager: ChangeManager,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if let Err(e) = self.poll_events_once(&manager).await {
                // Transient; the next cycle retries.
                warn!("{e}");
            }

            if sleep_or_shutdown(self.interval, &mut shutdown).await {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn primed_source(server: &MockServer) -> HostedEventsSource {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/branches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "master", "commit": {"sha": "sha1"}}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "v1.0", "commit": {"sha": "sha1"}}
            ])))
            .mount(server)
            .await;

        let mut source =
            HostedEventsSource::new("hosted", "acme/widgets").with_api_base(server.uri());
        source.prime().await.expect("prime");
        source
    }

    #[tokio::test]
    async fn test_prime_fetches_branches_and_tags() {
        let server = MockServer::start().await;
        let source = primed_source(&server).await;

        assert_eq!(source.branches().get("master"), Some(&String::from("sha1")));
    }

    #[tokio::test]
    async fn test_prime_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/branches"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut source =
            HostedEventsSource::new("hosted", "acme/widgets").with_api_base(server.uri());
        let err = source.prime().await.expect_err("listing failed");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Poll(PollError::InitialFetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_200_emits_busts_and_remembers_etag() {
        let server = MockServer::start().await;
        let mut source = primed_source(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"tok-1\"")
                    .set_body_json(json!([
                        {"type": "PushEvent", "payload": {"ref": "refs/heads/master"}},
                        {"type": "WatchEvent", "payload": {}}
                    ])),
            )
            .mount(&server)
            .await;

        let (manager, mut rx) = ChangeManager::channel();
        source.poll_events_once(&manager).await.expect("poll");

        assert_eq!(source.etag(), Some("\"tok-1\""));
        assert_eq!(rx.try_recv().expect("bust").key, "master");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_304_mutates_nothing_and_emits_no_events() {
        let server = MockServer::start().await;
        let mut source = primed_source(&server).await;
        source.etag = Some(String::from("\"tok-1\""));
        let branches_before = source.branches().clone();

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/events"))
            .and(header("If-None-Match", "\"tok-1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let (manager, mut rx) = ChangeManager::channel();
        source.poll_events_once(&manager).await.expect("poll");

        // Token and all derived state unchanged; no events emitted.
        assert_eq!(source.etag(), Some("\"tok-1\""));
        assert_eq!(source.branches(), &branches_before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_400_keeps_polling_state_intact() {
        let server = MockServer::start().await;
        let mut source = primed_source(&server).await;
        source.etag = Some(String::from("\"tok-1\""));

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/events"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let (manager, mut rx) = ChangeManager::channel();
        // Not an error: the loop must never terminate on this condition.
        source.poll_events_once(&manager).await.expect("poll");

        assert_eq!(source.etag(), Some("\"tok-1\""));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poll_interval_hint_replaces_configured_interval() {
        let server = MockServer::start().await;
        let mut source = primed_source(&server).await;
        assert_eq!(source.interval(), Duration::from_secs(60));

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/events"))
            .respond_with(
                ResponseTemplate::new(304).insert_header("X-Poll-Interval", "120"),
            )
            .mount(&server)
            .await;

        let (manager, _rx) = ChangeManager::channel();
        source.poll_events_once(&manager).await.expect("poll");

        assert_eq!(source.interval(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_deployment_event_busts_deployments() {
        let server = MockServer::start().await;
        let mut source = primed_source(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"type": "DeploymentEvent", "payload": {}}
            ])))
            .mount(&server)
            .await;

        let (manager, mut rx) = ChangeManager::channel();
        source.poll_events_once(&manager).await.expect("poll");

        assert_eq!(rx.try_recv().expect("bust").key, "deployments");
    }
}
