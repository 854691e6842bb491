//! Mod portal API integration.
//!
//! This module provides the [`CatalogSource`] collaborator used by the update
//! pipeline and the lookup commands, and its HTTP implementation against the
//! mod portal API.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::catalog::{Item, ItemDetail};
use crate::error::{ModwatchError, Result};

/// Upper bound on followed pagination links, against a misbehaving API.
const MAX_PAGES: usize = 1000;

/// Source of catalog data.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every mod in the catalog.
    async fn fetch_catalog(&self) -> Result<Vec<Item>>;

    /// Fetch one mod's detail. `full` includes release dependencies and the changelog.
    async fn fetch_item_detail(&self, name: &str, full: bool) -> Result<ItemDetail>;
}

#[derive(Deserialize, Debug)]
struct CatalogPage {
    #[serde(default)]
    pagination: Option<Pagination>,
    results: Vec<Item>,
}

#[derive(Deserialize, Debug)]
struct Pagination {
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Deserialize, Debug)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

/// HTTP client for the mod portal API.
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    api_url: Url,
}

impl PortalClient {
    /// Create a client for the API rooted at `api_url` (e.g. `https://mods.factorio.com/api`).
    ///
    /// # Errors
    ///
    /// Returns an error if `api_url` is not a valid base URL.
    pub fn new(http: reqwest::Client, api_url: &str) -> Result<Self> {
        let mut api_url = Url::parse(api_url)
            .map_err(|e| ModwatchError::Config(format!("Invalid portal API URL '{}': {}", api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(ModwatchError::Config(format!("Portal API URL cannot be a base: '{}'", api_url)));
        }
        // Make relative joins append instead of replacing the last segment
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Ok(Self { http, api_url })
    }

    fn mods_url(&self) -> Result<Url> {
        self.api_url
            .join("mods")
            .map_err(|e| ModwatchError::PortalApi(format!("Cannot build catalog URL: {}", e)))
    }

    fn detail_url(&self, name: &str, full: bool) -> Result<Url> {
        let mut url = self.mods_url()?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ModwatchError::PortalApi("Catalog URL cannot be a base".to_string()))?;
            segments.push(name);
            if full {
                segments.push("full");
            }
        }
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ModwatchError::Network(format!("Request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ModwatchError::PortalApi(format!("{} returned {}", url, status)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ModwatchError::PortalApi(format!("Invalid response from {}: {}", url, e)))
    }
}

#[async_trait]
impl CatalogSource for PortalClient {
    /// Fetch the catalog, following pagination links when the API pages results.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use modwatch::portal::{CatalogSource, PortalClient};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = PortalClient::new(reqwest::Client::new(), "https://mods.factorio.com/api")?;
    /// let items = client.fetch_catalog().await?;
    /// println!("{} mods", items.len());
    /// # Ok(())
    /// # }
    /// ```
    async fn fetch_catalog(&self) -> Result<Vec<Item>> {
        let mut url = self.mods_url()?;
        url.query_pairs_mut().append_pair("page_size", "max");

        let mut items = Vec::new();
        for _ in 0..MAX_PAGES {
            let page: CatalogPage = self.get_json(url.clone()).await?;
            items.extend(page.results);

            let next = page
                .pagination
                .and_then(|p| p.links)
                .and_then(|l| l.next);
            match next {
                Some(next) => {
                    url = url
                        .join(&next)
                        .map_err(|e| ModwatchError::PortalApi(format!("Invalid next page link '{}': {}", next, e)))?;
                }
                None => return Ok(items),
            }
        }
        Err(ModwatchError::PortalApi(format!(
            "Catalog did not finish within {} pages",
            MAX_PAGES
        )))
    }

    async fn fetch_item_detail(&self, name: &str, full: bool) -> Result<ItemDetail> {
        let url = self.detail_url(name, full)?;
        self.get_json(url).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const PAGE: &str = r#"{
        "pagination": {"count": 2, "links": {"first": null, "next": null, "prev": null, "last": null}, "page": 1, "page_count": 1, "page_size": 2},
        "results": [
            {"name": "alpha", "title": "Alpha", "owner": "acme", "downloads_count": 10,
             "latest_release": {"version": "1.0.0", "released_at": "2024-01-01T00:00:00.000000Z", "info_json": {"factorio_version": "2.0"}}},
            {"name": "beta", "title": "Beta", "owner": "zed", "downloads_count": 3}
        ]
    }"#;

    #[tokio::test]
    async fn test_fetch_catalog_single_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/mods")
            .match_query(Matcher::UrlEncoded("page_size".into(), "max".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PAGE)
            .create_async()
            .await;

        let client = PortalClient::new(reqwest::Client::new(), &format!("{}/api", server.url())).unwrap();
        let items = client.fetch_catalog().await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "alpha");
        assert_eq!(items[0].runtime_version().as_deref(), Some("2.0"));
        assert!(items[1].latest_release.is_none());
    }

    #[tokio::test]
    async fn test_fetch_catalog_follows_next_link() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/api/mods?page=2&page_size=max", server.url());
        let first = format!(
            r#"{{"pagination": {{"links": {{"next": "{}"}}}}, "results": [{{"name": "one", "title": "One", "owner": "a"}}]}}"#,
            next
        );
        let second = r#"{"pagination": {"links": {"next": null}}, "results": [{"name": "two", "title": "Two", "owner": "b"}]}"#;

        let page_one = server
            .mock("GET", "/api/mods")
            .match_query(Matcher::UrlEncoded("page_size".into(), "max".into()))
            .with_body(first)
            .expect(1)
            .create_async()
            .await;
        let page_two = server
            .mock("GET", "/api/mods")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(second)
            .expect(1)
            .create_async()
            .await;

        let client = PortalClient::new(reqwest::Client::new(), &format!("{}/api/", server.url())).unwrap();
        let items = client.fetch_catalog().await.unwrap();

        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        page_two.assert_async().await;
        page_one.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_item_detail_full() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "name": "Bob Mods", "title": "Bob's Mods", "owner": "bob", "downloads_count": 5,
            "created_at": "2020-01-01T00:00:00.000000Z",
            "thumbnail": "/assets/abc.thumb.png",
            "changelog": "---\nVersion: 1.0.0\n",
            "source_url": "https://github.com/bob/mods",
            "releases": [
                {"version": "0.9.0", "released_at": "2023-01-01T00:00:00.000000Z", "info_json": {"factorio_version": "1.1", "dependencies": ["base >= 1.1"]}},
                {"version": "1.0.0", "released_at": "2024-01-01T00:00:00.000000Z", "info_json": {"factorio_version": "2.0"}}
            ]
        }"#;
        let mock = server
            .mock("GET", "/api/mods/Bob%20Mods/full")
            .with_body(body)
            .create_async()
            .await;

        let client = PortalClient::new(reqwest::Client::new(), &format!("{}/api", server.url())).unwrap();
        let detail = client.fetch_item_detail("Bob Mods", true).await.unwrap();

        mock.assert_async().await;
        assert_eq!(detail.item.name, "Bob Mods");
        assert_eq!(detail.item.created_at.as_deref(), Some("2020-01-01T00:00:00.000000Z"));
        assert_eq!(detail.releases.len(), 2);
        assert_eq!(detail.release("0.9.0").unwrap().info_json.dependencies, vec!["base >= 1.1"]);
        assert_eq!(detail.source_url.as_deref(), Some("https://github.com/bob/mods"));
    }

    #[tokio::test]
    async fn test_fetch_item_detail_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/mods/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = PortalClient::new(reqwest::Client::new(), &format!("{}/api", server.url())).unwrap();
        let err = client.fetch_item_detail("missing", false).await.unwrap_err();
        assert!(matches!(err, ModwatchError::PortalApi(_)));
    }

    #[test]
    fn test_rejects_invalid_api_url() {
        assert!(PortalClient::new(reqwest::Client::new(), "not a url").is_err());
        assert!(PortalClient::new(reqwest::Client::new(), "mailto:someone@example.com").is_err());
    }
}
