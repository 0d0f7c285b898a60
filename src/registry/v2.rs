//! Registry v2 HTTP plumbing shared by providers

use std::time::Duration;

use reqwest::header::{HeaderMap, LINK, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::image::ImageDescriptor;
use crate::registry::provider::RegistryProvider;
use crate::registry::token::{DEFAULT_TOKEN_TTL, IssuedToken};

const USER_AGENT: &str = concat!("tagwatch/", env!("CARGO_PKG_VERSION"));

/// Upper bound on followed `Link` pages for one repository
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// HTTP client used by every provider, with a per-request timeout
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Map a non-success status to the registry error taxonomy
pub fn check_status(response: Response, what: &str) -> Result<Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RegistryError::Authentication(
            format!("{} returned {}", what, status),
        )),
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound(what.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(RegistryError::Unavailable(format!(
            "{} rate limited",
            what
        ))),
        s if s.is_server_error() => Err(RegistryError::Unavailable(format!(
            "{} returned {}",
            what, status
        ))),
        _ => {
            warn!("Registry returned unexpected status {}: {}", status, what);
            Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )))
        }
    }
}

/// `GET <registryUrl>/<image>/tags/list`, authenticated by `provider`, following pagination
pub async fn list_tags<P: RegistryProvider + ?Sized>(
    client: &Client,
    provider: &P,
    image: &ImageDescriptor,
) -> Result<Vec<String>, RegistryError> {
    let registry_url = image.registry_url.as_deref().ok_or_else(|| {
        RegistryError::InvalidResponse(format!("{} has no registry URL", image.image))
    })?;

    let mut url = tags_list_url(registry_url, &image.image)?;
    let mut tags = Vec::new();

    let mut challenged = false;
    let mut pages = 0;
    while pages < MAX_PAGES {
        let request = provider.authenticate(image, client.get(url.clone())).await?;
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && !challenged
            && let Some(challenge) = bearer_challenge(response.headers())
        {
            challenged = true;
            if provider.accept_challenge(image, challenge).await? {
                debug!("Retrying {} after bearer challenge", url);
                continue;
            }
        }

        let response = check_status(response, &image.image)?;
        pages += 1;
        let next = next_page_url(response.headers(), &url);

        let page: TagListResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse tag list for {}: {}", image.image, e);
            RegistryError::InvalidResponse(e.to_string())
        })?;
        tags.extend(page.tags.unwrap_or_default());

        match next {
            Some(next) => url = next,
            None => return Ok(tags),
        }
    }

    warn!(
        "Stopped following tag pages for {} after {} pages",
        image.image, MAX_PAGES
    );
    Ok(tags)
}

fn tags_list_url(registry_url: &str, image: &str) -> Result<Url, RegistryError> {
    let raw = format!("{}/{}/tags/list", registry_url.trim_end_matches('/'), image);
    Url::parse(&raw).map_err(|e| RegistryError::InvalidResponse(format!("{}: {}", raw, e)))
}

/// Resolve `Link: </v2/x/tags/list?last=y&n=100>; rel="next"` against the current URL
fn next_page_url(headers: &HeaderMap, current: &Url) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains(r#"rel="next""#) {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        current.join(target).ok()
    })
}

/// Parsed `WWW-Authenticate: Bearer realm="..",service="..",scope=".."` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for param in split_params(params) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }

    /// Token request for pulling `repository` from this challenge's realm
    pub fn token_request(
        &self,
        client: &Client,
        repository: &str,
    ) -> Result<RequestBuilder, RegistryError> {
        let mut query = vec![("scope", format!("repository:{}:pull", repository))];
        if let Some(service) = &self.service {
            query.push(("service", service.clone()));
        }
        let url = Url::parse_with_params(&self.realm, &query).map_err(|e| {
            RegistryError::Authentication(format!("invalid token realm {}: {}", self.realm, e))
        })?;
        Ok(client.get(url))
    }
}

/// Split challenge parameters on commas outside quotes (scopes may contain commas)
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}

/// Query `<registryUrl>/` anonymously and return its bearer challenge, if any
pub async fn discover_challenge(
    client: &Client,
    registry_url: &str,
) -> Result<Option<BearerChallenge>, RegistryError> {
    let url = format!("{}/", registry_url.trim_end_matches('/'));
    let response = client.get(&url).send().await?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(RegistryError::Unavailable(format!("{} returned {}", url, status)));
    }
    if status != StatusCode::UNAUTHORIZED {
        debug!("{} answered {} without a challenge", url, status);
        return Ok(None);
    }

    Ok(bearer_challenge(response.headers()))
}

fn bearer_challenge(headers: &HeaderMap) -> Option<BearerChallenge> {
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(BearerChallenge::parse)
}

/// Send a token endpoint request and read `token`/`access_token` and `expires_in`
pub async fn exchange_token(request: RequestBuilder) -> Result<IssuedToken, RegistryError> {
    let response = request.send().await?;
    let response = check_status(response, "token endpoint").map_err(|e| match e {
        RegistryError::NotFound(what) => {
            RegistryError::Authentication(format!("{} not found", what))
        }
        other => other,
    })?;

    let body: TokenResponse = response.json().await.map_err(|e| {
        warn!("Failed to parse token response: {}", e);
        RegistryError::InvalidResponse(e.to_string())
    })?;

    let value = body.token.or(body.access_token).ok_or_else(|| {
        RegistryError::Authentication("token endpoint returned no token".to_string())
    })?;
    let ttl = body
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_TTL);

    Ok(IssuedToken::new(value, ttl))
}
