//! Mock plugin registry.

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{catalog_json, sha256_hex, version_json};

/// API root under the mock server.
const API_PREFIX: &str = "/api/plugins";

/// A wiremock server answering catalog and download requests.
pub struct MockRegistry {
    server: MockServer,
}

impl MockRegistry {
    /// Start an empty registry.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Registry root to configure the installer with.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{API_PREFIX}", self.server.uri())
    }

    /// Underlying server, for custom mocks.
    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `catalog` at `GET <registry>/repo/<plugin_id>`.
    pub async fn publish_catalog(&self, plugin_id: &str, catalog: Value) {
        Mock::given(method("GET"))
            .and(path(catalog_path(plugin_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
            .mount(&self.server)
            .await;
    }

    /// Serve `archive` at `GET <registry>/<plugin_id>/versions/<version>/download`.
    pub async fn publish_archive(&self, plugin_id: &str, version: &str, archive: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(download_path(plugin_id, version)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/zip")
                    .set_body_bytes(archive),
            )
            .mount(&self.server)
            .await;
    }

    /// Publish a single platform-independent version with its checksum.
    pub async fn publish_plugin(&self, plugin_id: &str, version: &str, archive: Vec<u8>) {
        let checksum = sha256_hex(&archive);
        let catalog = catalog_json(
            plugin_id,
            vec![version_json(version, &[("any", Some(checksum.as_str()))])],
        );
        self.publish_catalog(plugin_id, catalog).await;
        self.publish_archive(plugin_id, version, archive).await;
    }

    /// Respond to the catalog request for `plugin_id` with `status` and `body`.
    pub async fn fail_catalog(&self, plugin_id: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(catalog_path(plugin_id)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Number of archive downloads received for `plugin_id`, any version.
    pub async fn download_count(&self, plugin_id: &str) -> usize {
        let prefix = format!("{API_PREFIX}/{plugin_id}/versions/");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| {
                let path = request.url.path();
                path.starts_with(&prefix) && path.ends_with("/download")
            })
            .count()
    }
}

fn catalog_path(plugin_id: &str) -> String {
    format!("{API_PREFIX}/repo/{plugin_id}")
}

fn download_path(plugin_id: &str, version: &str) -> String {
    format!("{API_PREFIX}/{plugin_id}/versions/{version}/download")
}
