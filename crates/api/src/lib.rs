//! Control-plane API client utilities.
//!
//! Read access to the control plane that provisions resources asynchronously:
//!
//! - A `reqwest` client with bearer auth, JSON accept header and request timeout
//! - Discovering credentials from `SETTLE_API_TOKEN` or `~/.netrc`
//! - Validating `SETTLE_API_BASE` for safety
//! - Resolving status references (absolute `Location` URLs or API-relative paths)
//!
//! The primary entry point is [`ControlPlaneClient`]. Create an instance via
//! [`ControlPlaneClient::new_from_env`], then build requests with
//! [`ControlPlaneClient::request`]. Re-target another region with
//! [`ControlPlaneClient::with_base_url`], which returns a new client and leaves
//! the original untouched for any in-flight reads.
//!
//! # Example
//!
//! ```ignore
//! use settle_api::ControlPlaneClient;
//! use anyhow::Result;
//!
//! async fn show_status() -> Result<()> {
//!     let client = ControlPlaneClient::new_from_env()?;
//!     let res = client
//!         .request(reqwest::Method::GET, "/requests/5c1f/status")?
//!         .send()
//!         .await?;
//!     println!("{} -> {}", res.url(), res.status());
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Url, header};
use tracing::debug;

/// Environment variable overriding the control-plane base URL.
pub const API_BASE_ENV: &str = "SETTLE_API_BASE";
/// Environment variable carrying the bearer token.
pub const API_TOKEN_ENV: &str = "SETTLE_API_TOKEN";
/// Base URL used when `SETTLE_API_BASE` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.example-cloud.com/cloudapi/v6";

/// Hosts that may be reached over plain http (local mocks and proxies).
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];
/// Per-request timeout applied by the underlying HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for control-plane access.
///
/// The client pre-configures default headers and resolves references against a
/// validated base URL. Cloning is cheap; the connection pool is shared.
pub struct ControlPlaneClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl ControlPlaneClient {
    /// Construct a [`ControlPlaneClient`] from environment variables and `~/.netrc`.
    ///
    /// Resolution order for authentication:
    /// - `SETTLE_API_TOKEN` environment variable
    /// - `~/.netrc` entry whose `machine` matches the base URL host
    ///
    /// The base URL is taken from `SETTLE_API_BASE` (if set) or falls back to
    /// [`DEFAULT_API_BASE`]. Non-localhost hosts must use HTTPS.
    pub fn new_from_env() -> Result<Self> {
        let base_url = env::var(API_BASE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.into());
        let api_token = env::var(API_TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| get_netrc_token(&base_url));
        Self::new(&base_url, api_token.as_deref())
    }

    /// Construct a client for an explicit base URL and optional bearer token.
    pub fn new(base_url: &str, api_token: Option<&str>) -> Result<Self> {
        validate_base_url(base_url)?;

        let mut default_headers = header::HeaderMap::new();
        if let Some(api_token) = api_token {
            let mut authorization = header::HeaderValue::from_str(&format!("Bearer {}", api_token.trim()))
                .context("API token contains characters that are not valid in a header")?;
            authorization.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, authorization);
        }
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            http,
            user_agent: format!("settle/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Return a client targeting another base URL (for example, another region).
    ///
    /// Credentials and the connection pool are shared with `self`; `self` keeps
    /// its own base URL so reads already in flight are unaffected.
    pub fn with_base_url(&self, base_url: &str) -> Result<Self> {
        validate_base_url(base_url)?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            http: self.http.clone(),
            user_agent: self.user_agent.clone(),
        })
    }

    /// Resolve a status reference into an absolute URL.
    ///
    /// Absolute references (typically a `Location` header) must point at the
    /// same host as the base URL so credentials are never sent elsewhere.
    /// Anything else is treated as a path relative to the base URL.
    pub fn resolve_url(&self, reference: &str) -> Result<Url> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(anyhow!("cannot resolve an empty reference"));
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference).with_context(|| format!("invalid reference URL '{reference}'"))?;
            let base = Url::parse(&self.base_url).with_context(|| format!("invalid base URL '{}'", self.base_url))?;
            if !url.host_str().zip(base.host_str()).is_some_and(|(left, right)| left.eq_ignore_ascii_case(right)) {
                return Err(anyhow!(
                    "reference host '{}' does not match the configured API host '{}'",
                    url.host_str().unwrap_or_default(),
                    base.host_str().unwrap_or_default()
                ));
            }
            return Ok(url);
        }

        let joined = format!("{}/{}", self.base_url, reference.trim_start_matches('/'));
        Url::parse(&joined).with_context(|| format!("invalid reference path '{reference}'"))
    }

    /// Build a `reqwest::RequestBuilder` for a method and reference.
    ///
    /// The resulting request includes the configured User-Agent and base
    /// headers.
    pub fn request(&self, method: reqwest::Method, reference: &str) -> Result<RequestBuilder> {
        let url = self.resolve_url(reference)?;
        debug!(%url, %method, "building request");

        Ok(self
            .http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent))
    }
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Reject base URLs that would send the token in clear text.
///
/// Rules:
/// - `localhost` / `127.0.0.1`: http is accepted too
/// - otherwise: scheme must be HTTPS
fn validate_base_url(base: &str) -> Result<()> {
    let parsed_base_url = Url::parse(base.trim()).map_err(|e| anyhow!("Invalid {} URL '{}': {}", API_BASE_ENV, base, e))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| anyhow!("{} must include a host", API_BASE_ENV))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(anyhow!(
            "{} must use https for non-localhost hosts; got '{}://'",
            API_BASE_ENV,
            parsed_base_url.scheme()
        ));
    }

    Ok(())
}

/// Attempt to read an API token for the base URL host from `~/.netrc`.
fn get_netrc_token(base_url: &str) -> Option<String> {
    let host = Url::parse(base_url).ok()?.host_str()?.to_string();
    let home = dirs_next::home_dir()?;
    let content = fs::read_to_string(home.join(".netrc")).ok()?;
    parse_netrc_token(&content, &host)
}

/// Small `.netrc` reader that extracts the password for one machine.
///
/// The expected form is roughly:
///
/// ```text
/// machine api.example-cloud.com
///   login automation
///   password <TOKEN>
/// ```
fn parse_netrc_token(content: &str, host: &str) -> Option<String> {
    let mut in_matching_machine = false;
    let mut tokens = content.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                in_matching_machine = tokens.next().is_some_and(|machine| machine.eq_ignore_ascii_case(host));
            }
            "default" => in_matching_machine = false,
            "password" if in_matching_machine => {
                return tokens.next().filter(|password| !password.is_empty()).map(str::to_string);
            }
            _ => {}
        }
    }
    None
}
