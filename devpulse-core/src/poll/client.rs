//! Thin JSON-over-HTTP client shared by the REST providers

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Page size requested from list endpoints; both APIs cap it at 100.
pub(crate) const PER_PAGE: usize = 100;

/// Pages walked per listing at most. GitHub stops serving list results
/// past 10,000 items.
pub(crate) const MAX_PAGES: u32 = 100;

/// Collect numbered pages (starting at 1) until a short page, [`MAX_PAGES`],
/// or `more` returns false for the page just fetched.
pub(crate) async fn collect_pages<T, F, Fut>(
    mut fetch_page: F,
    mut more: impl FnMut(&[T]) -> bool,
) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();

    for page in 1..=MAX_PAGES {
        let batch = fetch_page(page).await?;
        let last = batch.len() < PER_PAGE || !more(&batch);
        items.extend(batch);

        if last {
            return Ok(items);
        }
    }

    tracing::warn!(
        pages = MAX_PAGES,
        items = items.len(),
        "Stopped paging at the page limit"
    );
    Ok(items)
}

/// Authenticated REST client for one API base URL.
pub(crate) struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client sending `token` in `auth_header` on every request.
    ///
    /// `auth_value` formats the header value from the token.
    pub(crate) fn new(
        base_url: &str,
        auth_header: HeaderName,
        auth_value: Option<String>,
        accept: &'static str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("devpulse/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(value) = auth_value {
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| Error::Config(format!("invalid token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(auth_header, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for an API path (`/user`, `/projects?...`).
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Http(format!("failed to parse response from {}: {}", url, e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Http(format!(
                "API error ({}) from {}: {}",
                status, url, error_text
            )))
        }
    }

    /// GET every page of a list endpoint. `path` must already carry a query
    /// string; `per_page` and `page` are appended.
    pub(crate) async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        more: impl FnMut(&[T]) -> bool,
    ) -> Result<Vec<T>> {
        collect_pages(
            |page| {
                let path = format!("{}&per_page={}&page={}", path, PER_PAGE, page);
                async move { self.get_json::<Vec<T>>(&path).await }
            },
            more,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new(
            "https://api.example.com/",
            AUTHORIZATION,
            Some("Bearer t".to_string()),
            "application/json",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.url("/user"), "https://api.example.com/user");
    }

    fn pages(total: usize) -> Vec<Vec<usize>> {
        (0..total)
            .collect::<Vec<_>>()
            .chunks(PER_PAGE)
            .map(<[usize]>::to_vec)
            .collect()
    }

    async fn serve(pages: &[Vec<usize>], page: u32) -> Result<Vec<usize>> {
        Ok(pages.get(page as usize - 1).cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_collect_pages_walks_until_short_page() {
        let pages = pages(250);
        let mut requested = Vec::new();

        let items = collect_pages(
            |page| {
                requested.push(page);
                serve(&pages, page)
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 250);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_collect_pages_requests_one_past_a_full_final_page() {
        let pages = pages(200);
        let mut requested = 0;

        let items = collect_pages(
            |page| {
                requested += 1;
                serve(&pages, page)
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 200);
        assert_eq!(requested, 3);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_when_told() {
        let pages = pages(500);
        let items = collect_pages(|page| serve(&pages, page), |batch| batch[0] < 100)
            .await
            .unwrap();

        // Page 2 starts at 100, so it is kept and paging stops
        assert_eq!(items.len(), 200);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_errors() {
        let result: Result<Vec<usize>> = collect_pages(
            |page| async move {
                if page == 2 {
                    Err(Error::Http("API error (502)".to_string()))
                } else {
                    Ok(vec![0; PER_PAGE])
                }
            },
            |_| true,
        )
        .await;
        assert!(matches!(result, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn test_collect_pages_is_bounded() {
        let mut requested = 0;
        let items = collect_pages(
            |_| {
                requested += 1;
                async { Ok(vec![0u8; PER_PAGE]) }
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(requested, MAX_PAGES);
        assert_eq!(items.len(), MAX_PAGES as usize * PER_PAGE);
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let result = ApiClient::new(
            "https://api.example.com",
            AUTHORIZATION,
            Some("Bearer bad\ntoken".to_string()),
            "application/json",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
