//! Plugin registry HTTP client.
//!
//! Fetches version catalogs and builds archive download URLs. Every request
//! carries headers identifying the host version, OS, and architecture so the
//! registry can redirect to the right build.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::catalog::PluginCatalogEntry;
use crate::error::{InstallError, InstallResult};
use crate::options::InstallerOptions;

/// Header carrying the host application version.
pub const HOST_VERSION_HEADER: &str = "x-plinth-version";

/// Header carrying the host operating system.
pub const HOST_OS_HEADER: &str = "x-plinth-os";

/// Header carrying the host CPU architecture.
pub const HOST_ARCH_HEADER: &str = "x-plinth-arch";

/// Longest error body (in characters) kept in an HTTP error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Build the shared HTTP client.
///
/// No overall request timeout is set: archive downloads may legitimately take
/// a long time. Catalog lookups set their own per-request timeout.
///
/// # Errors
///
/// Returns [`InstallError::Registry`] if a header value is not valid ASCII or
/// the TLS backend cannot be initialized.
pub fn build_http_client(options: &InstallerOptions) -> InstallResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (HOST_VERSION_HEADER, options.host_version.as_str()),
        (HOST_OS_HEADER, options.platform.os()),
        (HOST_ARCH_HEADER, options.platform.arch()),
    ] {
        let value = HeaderValue::from_str(value).map_err(|e| InstallError::Registry {
            message: format!("invalid value for header {name}: {e}"),
        })?;
        headers.insert(HeaderName::from_static(name), value);
    }

    reqwest::Client::builder()
        .user_agent(format!("plinth/{}", options.host_version))
        .default_headers(headers)
        .connect_timeout(options.connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
        .build()
        .map_err(|e| InstallError::Registry {
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Client for the plugin registry API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: Url,
    catalog_timeout: Duration,
}

impl RegistryClient {
    /// Create a client rooted at `registry_url`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Registry`] if the URL does not parse or is not
    /// `http`/`https`.
    pub fn new(
        client: reqwest::Client,
        registry_url: &str,
        catalog_timeout: Duration,
    ) -> InstallResult<Self> {
        let base_url = Url::parse(registry_url).map_err(|e| InstallError::Registry {
            message: format!("invalid registry URL {registry_url}: {e}"),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(InstallError::Registry {
                message: format!("registry URL must be http(s): {registry_url}"),
            });
        }
        Ok(Self {
            client,
            base_url,
            catalog_timeout,
        })
    }

    /// `<registry>/repo/<plugin-id>`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Registry`] if the base URL cannot take path segments.
    pub fn catalog_url(&self, plugin_id: &str) -> InstallResult<Url> {
        join_segments(&self.base_url, &["repo", plugin_id])
    }

    /// `<registry>/<plugin-id>/versions/<version>/download`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Registry`] if the base URL cannot take path segments.
    pub fn download_url(&self, plugin_id: &str, version: &str) -> InstallResult<Url> {
        join_segments(
            &self.base_url,
            &[plugin_id, "versions", version, "download"],
        )
    }

    /// Fetch the version catalog for `plugin_id`.
    ///
    /// Bounded by the configured catalog timeout.
    ///
    /// # Errors
    ///
    /// - [`InstallError::Transport`] if no response arrives (including timeout)
    /// - [`InstallError::HttpClient`] / [`InstallError::HttpServer`] on non-2xx
    /// - [`InstallError::Registry`] if the body is not a catalog
    /// - [`InstallError::Cancelled`] if `cancel` fires
    pub async fn fetch_catalog(
        &self,
        plugin_id: &str,
        cancel: &CancellationToken,
    ) -> InstallResult<PluginCatalogEntry> {
        let url = self.catalog_url(plugin_id)?;
        debug!(url = %url, "fetching plugin catalog");

        let request = self
            .client
            .get(url.clone())
            .timeout(self.catalog_timeout)
            .send();
        let response = cancellable(cancel, request)
            .await?
            .map_err(|e| transport_error(url.as_str(), &e))?;
        let response = error_for_status(response).await?;

        let body = cancellable(cancel, response.bytes())
            .await?
            .map_err(|e| InstallError::Registry {
                message: format!("failed to read catalog for {plugin_id}: {e}"),
            })?;
        let entry: PluginCatalogEntry =
            serde_json::from_slice(&body).map_err(|e| InstallError::Registry {
                message: format!("failed to parse catalog for {plugin_id}: {e}"),
            })?;

        if entry.id != plugin_id {
            warn!(
                requested = plugin_id,
                returned = %entry.id,
                "registry returned a catalog for a different plugin id"
            );
        }
        debug!(
            plugin_id,
            versions = entry.versions.len(),
            "catalog fetched"
        );
        Ok(entry)
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> InstallResult<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(InstallError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Pass 2xx responses through; translate everything else.
///
/// 4xx becomes [`InstallError::HttpClient`], anything else
/// [`InstallError::HttpServer`]. The message is the JSON body's `message`
/// field when present, otherwise the truncated body text.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> InstallResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    debug!(status = status.as_u16(), %message, "registry returned an error status");

    if status.is_client_error() {
        Err(InstallError::HttpClient {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(InstallError::HttpServer {
            status: status.as_u16(),
            message,
        })
    }
}

pub(crate) fn transport_error(url: &str, err: &reqwest::Error) -> InstallError {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    InstallError::Transport {
        url: url.to_owned(),
        message,
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    if let Ok(api) = serde_json::from_str::<ApiError>(body)
        && !api.message.is_empty()
    {
        return api.message;
    }
    body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn join_segments(base: &Url, segments: &[&str]) -> InstallResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| InstallError::Registry {
            message: format!("registry URL cannot take a path: {base}"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ErrorKind;
    use crate::platform::Platform;

    fn options(registry_url: &str) -> InstallerOptions {
        InstallerOptions {
            registry_url: registry_url.to_owned(),
            catalog_timeout: Duration::from_millis(500),
            host_version: "9.9.9".to_owned(),
            platform: Platform::new("linux", "arm64"),
            ..InstallerOptions::default()
        }
    }

    fn client_for(server: &MockServer) -> RegistryClient {
        let opts = options(&server.uri());
        RegistryClient::new(
            build_http_client(&opts).unwrap(),
            &opts.registry_url,
            opts.catalog_timeout,
        )
        .unwrap()
    }

    #[test]
    fn urls_are_built_from_segments() {
        let opts = options("https://registry.example.com/api/plugins/");
        let client = RegistryClient::new(
            build_http_client(&opts).unwrap(),
            &opts.registry_url,
            opts.catalog_timeout,
        )
        .unwrap();

        assert_eq!(
            client.catalog_url("clock-panel").unwrap().as_str(),
            "https://registry.example.com/api/plugins/repo/clock-panel"
        );
        assert_eq!(
            client.download_url("clock-panel", "1.2.0").unwrap().as_str(),
            "https://registry.example.com/api/plugins/clock-panel/versions/1.2.0/download"
        );
    }

    #[test]
    fn url_segments_are_escaped() {
        let opts = options("https://registry.example.com");
        let client = RegistryClient::new(
            build_http_client(&opts).unwrap(),
            &opts.registry_url,
            opts.catalog_timeout,
        )
        .unwrap();
        let url = client.download_url("a/b", "1 0").unwrap();
        assert_eq!(url.path(), "/a%2Fb/versions/1%200/download");
    }

    #[test]
    fn rejects_non_http_registry() {
        let opts = options("ftp://registry.example.com");
        let err = RegistryClient::new(
            build_http_client(&opts).unwrap(),
            &opts.registry_url,
            opts.catalog_timeout,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"message":"plugin not found","code":4}"#),
            "plugin not found"
        );
        assert_eq!(error_message("  plain text  "), "plain text");
        assert_eq!(error_message(&"x".repeat(1000)).len(), MAX_ERROR_BODY_CHARS);
        assert_eq!(error_message(r#"{"message":""}"#), r#"{"message":""}"#);
    }

    #[tokio::test]
    async fn fetch_catalog_sends_identity_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repo/clock-panel"))
            .and(header(HOST_VERSION_HEADER, "9.9.9"))
            .and(header(HOST_OS_HEADER, "linux"))
            .and(header(HOST_ARCH_HEADER, "arm64"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "clock-panel",
                "versions": [{ "version": "1.0.0" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let entry = client_for(&server)
            .fetch_catalog("clock-panel", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(entry.versions[0].version, "1.0.0");
    }

    #[tokio::test]
    async fn client_error_uses_json_message() {
        let server = MockServer::start().await;
        Mock::given(path("/repo/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "message": "plugin not found" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_catalog("missing", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            InstallError::HttpClient { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "plugin not found");
            },
            other => panic!("expected HttpClient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_error_falls_back_to_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(path("/repo/forbidden"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied ".repeat(100)))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_catalog("forbidden", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            InstallError::HttpClient { status, message } => {
                assert_eq!(status, 403);
                assert!(message.starts_with("denied"));
                assert_eq!(message.chars().count(), MAX_ERROR_BODY_CHARS);
            },
            other => panic!("expected HttpClient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(path("/repo/flaky"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_catalog("flaky", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HttpServer);
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn malformed_catalog_is_registry_error() {
        let server = MockServer::start().await;
        Mock::given(path("/repo/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_catalog("broken", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
    }

    #[tokio::test]
    async fn catalog_lookup_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(path("/repo/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "slow" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_catalog("slow", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn cancelled_before_request() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client_for(&server)
            .fetch_catalog("anything", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
