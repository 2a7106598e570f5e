use crate::catalog::RawPayload;
use crate::{debug_eprintln, debug_println};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, Response};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the JSON API, without trailing slash.
    pub api_url: String,
    /// Root of the website (login cookie, HTML pages, downloads).
    pub web_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Tours requested per API page.
    pub page_size: usize,
    /// Upper bound on API pages fetched for one catalog.
    pub max_pages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.komoot.de/api".to_string(),
            web_url: "https://www.komoot.de".to_string(),
            user_agent: format!("komootexport/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            page_size: 100,
            max_pages: 100,
        }
    }
}

/// Where the tour catalog is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogSource {
    /// Paginated JSON API.
    #[default]
    Api,
    /// Tours overview web page with embedded data.
    Html,
}

/// Logged-in session with the tour service. Cookies persist across requests.
pub struct KomootClient {
    client: Client,
    config: ClientConfig,
    email: Option<String>,
    user_id: Option<String>,
}

impl KomootClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(KomootClient {
            client,
            config,
            email: None,
            user_id: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn login_url(&self) -> String {
        format!("{}/webapi/v006/auth/cookie", self.config.web_url)
    }

    fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| anyhow!("Not logged in"))
    }

    /// Log in with email and password and remember the account's user id.
    pub fn login(&mut self, email: &str, password: &str) -> Result<()> {
        self.user_id = None;
        self.email = Some(email.to_string());

        let exists_url = format!(
            "{}/v007/account/user_exists?email={}",
            self.config.api_url,
            urlencoding::encode(email)
        );
        debug_println!("Checking account: {}", exists_url);
        self.client
            .get(&exists_url)
            .send()
            .context("Failed to reach account lookup")?
            .error_for_status()
            .context("Account lookup rejected")?;

        let login_url = self.login_url();
        debug_println!("Posting credentials to {}", login_url);
        self.client
            .post(&login_url)
            .form(&[("username", email), ("password", password)])
            .send()
            .context("Failed to send login request")?
            .error_for_status()
            .context("Login rejected")?;

        let session: Value = self
            .client
            .get(&login_url)
            .send()
            .context("Failed to fetch session")?
            .error_for_status()
            .context("Session request rejected")?
            .json()
            .context("Session response is not JSON")?;

        let user_id = match &session["username"] {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(anyhow!("Session response carries no user id")),
        };

        debug_println!("Logged in as {}", user_id);
        self.user_id = Some(user_id);
        Ok(())
    }

    /// Fetch all API pages of the tour list, verbatim.
    ///
    /// The first error status ends pagination; so does an empty page or
    /// reaching `page.totalPages`.
    pub fn fetch_tour_pages(&self) -> Result<Vec<String>> {
        let user_id = self.require_user()?;
        let url = format!("{}/v007/users/{}/tours/", self.config.api_url, user_id);
        let mut pages = Vec::new();

        for page in 0..self.config.max_pages {
            debug_println!("Fetching tour page {}: {}", page, url);
            let response = self
                .client
                .get(&url)
                .query(&[("page", page.to_string()), ("limit", self.config.page_size.to_string())])
                .send()
                .with_context(|| format!("Failed to fetch tour page {}", page))?;

            if !response.status().is_success() {
                debug_println!("Page {} answered {}, no more pages", page, response.status());
                break;
            }

            let body = response
                .text()
                .with_context(|| format!("Failed to read tour page {}", page))?;
            let last = is_last_page(&body, page);
            pages.push(body);
            if last {
                break;
            }
        }

        debug_println!("Fetched {} tour page(s)", pages.len());
        Ok(pages)
    }

    /// Fetch the tours overview web page of the logged-in user.
    pub fn fetch_tour_overview_html(&self) -> Result<String> {
        let user_id = self.require_user()?;
        let url = format!("{}/user/{}/tours", self.config.web_url, user_id);
        debug_println!("Fetching tours page: {}", url);

        self.get_ok(&url)?
            .text()
            .context("Failed to read tours page")
    }

    pub fn fetch_catalog_payload(&self, source: CatalogSource) -> Result<RawPayload> {
        match source {
            CatalogSource::Api => Ok(RawPayload::Pages(self.fetch_tour_pages()?)),
            CatalogSource::Html => Ok(RawPayload::Html(self.fetch_tour_overview_html()?)),
        }
    }

    /// Download the GPX track of one tour.
    pub fn download_tour(&self, tour_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/tour/{}/download", self.config.web_url, tour_id);
        debug_println!("Downloading {}", url);

        let bytes = self
            .get_ok(&url)?
            .bytes()
            .with_context(|| format!("Failed to read download of tour {}", tour_id))?;
        Ok(bytes.to_vec())
    }

    fn get_ok(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            debug_eprintln!("HTTP error {}: {}", response.status(), url);
        }
        response
            .error_for_status()
            .with_context(|| format!("Request to {} failed", url))
    }
}

impl fmt::Display for KomootClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.email, &self.user_id) {
            (Some(email), Some(user_id)) => write!(f, "User:           {} ({})", email, user_id),
            _ => write!(f, "User:           Not logged in."),
        }
    }
}

/// Whether a tours page is the last one worth requesting.
fn is_last_page(body: &str, page: usize) -> bool {
    let document: Value = match serde_json::from_str(body) {
        Ok(document) => document,
        Err(_) => {
            debug_eprintln!("Page {} is not JSON, stopping pagination", page);
            return true;
        }
    };

    let tours_on_page = document["_embedded"]["tours"]
        .as_array()
        .map_or(0, |tours| tours.len());
    if tours_on_page == 0 {
        return true;
    }

    match document["page"]["totalPages"].as_u64() {
        Some(total) => page as u64 + 1 >= total,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_stops_on_empty_or_final_page() {
        let full = r#"{"_embedded":{"tours":[{"id":"1"}]},"page":{"number":0,"totalPages":3}}"#;
        assert!(!is_last_page(full, 0));
        assert!(is_last_page(full, 2));
        assert!(is_last_page(r#"{"page":{"totalPages":3}}"#, 1));
        assert!(is_last_page("<html>", 0));
        assert!(!is_last_page(r#"{"_embedded":{"tours":[{"id":"1"}]}}"#, 7));
    }

    #[test]
    fn display_before_login() {
        let client = KomootClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.to_string(), "User:           Not logged in.");
        assert!(client.fetch_tour_pages().is_err());
    }
}
