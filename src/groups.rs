use crate::session::CookieSource;
use async_trait::async_trait;
use crate::upload::types::UploadTarget;
use log::{info, warn};
use reqwest::header::COOKIE;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupLookupError {
    #[error("cookie jar unavailable: {0}")]
    Cookies(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    #[serde(default)]
    groups: Option<Vec<String>>,
}

/// The user's group set as reported by the host application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    groups: Vec<String>,
}

impl Membership {
    /// Names are normalised (leading `/` stripped) and de-duplicated in first-seen order.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut groups: Vec<String> = Vec::new();
        for name in raw {
            let name = name.as_ref().trim().trim_start_matches('/');
            if name.is_empty() || groups.iter().any(|g| g == name) {
                continue;
            }
            groups.push(name.to_string());
        }
        Self { groups }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    /// Targets the user may upload into, never including `excluded`.
    pub fn selectable_targets(&self, excluded: &[String]) -> Vec<UploadTarget> {
        self.groups
            .iter()
            .filter(|g| !excluded.contains(g))
            .map(|g| UploadTarget::new(g.clone()))
            .collect()
    }
}

/// Client for the host's group lookup endpoint.
pub struct GroupDirectory {
    client: Client,
    endpoint: Url,
    cookies: Arc<dyn CookieSource>,
}

impl GroupDirectory {
    pub fn new(client: Client, endpoint: Url, cookies: Arc<dyn CookieSource>) -> Self {
        Self {
            client,
            endpoint,
            cookies,
        }
    }

    async fn try_fetch(&self) -> Result<Membership, GroupLookupError> {
        let cookie = self
            .cookies
            .cookie_header()
            .await
            .map_err(|e| GroupLookupError::Cookies(format!("{:#}", e)))?;

        let mut req = self.client.get(self.endpoint.clone());
        if !cookie.is_empty() {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(GroupLookupError::Status(resp.status()));
        }
        let body: GroupsResponse = resp.json().await?;
        Ok(Membership::new(body.groups.unwrap_or_default()))
    }

    /// Lookup failures degrade to an empty membership.
    pub async fn fetch(&self) -> Membership {
        match self.try_fetch().await {
            Ok(membership) => {
                info!("[Groups] user groups: {:?}", membership.groups());
                membership
            }
            Err(e) => {
                warn!("[Groups] failed to fetch user groups: {}", e);
                Membership::default()
            }
        }
    }
}

/// Where the controller learns the user's groups for the current document.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn membership(&self) -> Membership;
}

#[async_trait]
impl MembershipSource for GroupDirectory {
    async fn membership(&self) -> Membership {
        self.fetch().await
    }
}
