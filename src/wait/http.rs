//! HTTP readiness.

use crate::resource::ContainerHandle;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

type StatusPredicate = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Waits until an HTTP request against the mapped container port matches the
/// configured status criteria.
///
/// Status matching: with neither explicit codes nor a predicate configured,
/// exactly `200 OK` passes. With only codes, membership passes. With only a
/// predicate, the predicate decides. With both, either passing suffices —
/// the set and the predicate are a union, not an intersection.
#[derive(Clone)]
pub struct HttpWait {
    method: reqwest::Method,
    path: String,
    container_port: u16,
    tls: bool,
    headers: Vec<(String, String)>,
    status_codes: HashSet<u16>,
    status_predicate: Option<StatusPredicate>,
    client: reqwest::Client,
}

impl HttpWait {
    /// Probe the given path with GET on container port 80.
    pub fn new<P: Into<String>>(path: P) -> Self {
        Self {
            method: reqwest::Method::GET,
            path: path.into(),
            container_port: 80,
            tls: false,
            headers: Vec::new(),
            status_codes: HashSet::new(),
            status_predicate: None,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .danger_accept_invalid_certs(true)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Probe the given container port instead of 80.
    pub fn for_port(mut self, container_port: u16) -> Self {
        self.container_port = container_port;
        self
    }

    /// Use the given HTTP method instead of GET.
    pub fn with_method(mut self, method: reqwest::Method) -> Self {
        self.method = method;
        self
    }

    /// Probe over HTTPS. Certificate validation is disabled; the target is a
    /// throwaway container.
    pub fn using_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Add a request header.
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Accept the given status code. May be called repeatedly to build a
    /// set.
    pub fn for_status_code(mut self, status: u16) -> Self {
        self.status_codes.insert(status);
        self
    }

    /// Accept any status code passing the predicate.
    pub fn for_status_matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.status_predicate = Some(Arc::new(predicate));
        self
    }

    /// Decide whether a response status satisfies the configured criteria.
    pub fn status_matches(&self, status: u16) -> bool {
        match (self.status_codes.is_empty(), &self.status_predicate) {
            (true, None) => status == 200,
            (false, None) => self.status_codes.contains(&status),
            (false, Some(predicate)) => self.status_codes.contains(&status) || predicate(status),
            (true, Some(predicate)) => predicate(status),
        }
    }

    /// Probe a concrete host/port pair once; `None` means unreachable.
    pub async fn probe(&self, host: &str, port: u16) -> Option<u16> {
        let scheme = if self.tls { "https" } else { "http" };
        let path = self.path.trim_start_matches('/');
        let url = format!("{scheme}://{host}:{port}/{path}");

        let mut request = self.client.request(self.method.clone(), url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl crate::wait::WaitStrategy for HttpWait {
    async fn ready(&self, container: &ContainerHandle) -> Result<bool> {
        let host = container.host().await?;
        let port = container.mapped_port(self.container_port).await?;

        match self.probe(&host, port).await {
            Some(status) => Ok(self.status_matches(status)),
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        format!(
            "http {} on container port {} returns an accepted status",
            self.path, self.container_port
        )
    }
}

impl std::fmt::Debug for HttpWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWait")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("container_port", &self.container_port)
            .field("tls", &self.tls)
            .field("status_codes", &self.status_codes)
            .field("has_predicate", &self.status_predicate.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_only_200() {
        let wait = HttpWait::new("/health");
        assert!(wait.status_matches(200));
        assert!(!wait.status_matches(201));
        assert!(!wait.status_matches(404));
    }

    #[test]
    fn explicit_codes_are_a_membership_test() {
        let wait = HttpWait::new("/health")
            .for_status_code(201)
            .for_status_code(202);
        assert!(wait.status_matches(201));
        assert!(wait.status_matches(202));
        assert!(!wait.status_matches(200));
    }

    #[test]
    fn predicate_alone_decides() {
        let wait = HttpWait::new("/health").for_status_matching(|status| status < 500);
        assert!(wait.status_matches(404));
        assert!(!wait.status_matches(503));
    }

    #[test]
    fn codes_and_predicate_are_a_union() {
        let wait = HttpWait::new("/health")
            .for_status_code(200)
            .for_status_matching(|status| status == 418);
        assert!(wait.status_matches(200));
        assert!(wait.status_matches(418));
        assert!(!wait.status_matches(404));
    }
}
