use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Client-held cookie state, rendered as a `Cookie` header value (`a=1; b=2`).
#[async_trait]
pub trait CookieSource: Send + Sync {
    async fn cookie_header(&self) -> Result<String>;
}

/// Look up a single cookie by name in a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then_some(value)
        })
}

/// Resolves the chat session id from the live cookie jar.
#[derive(Clone)]
pub struct SessionResolver {
    cookies: Arc<dyn CookieSource>,
    cookie_name: String,
}

impl SessionResolver {
    pub fn new(cookies: Arc<dyn CookieSource>, cookie_name: impl Into<String>) -> Self {
        Self {
            cookies,
            cookie_name: cookie_name.into(),
        }
    }

    /// Re-reads the jar on every call; the session cookie may rotate.
    pub async fn current_session_id(&self) -> Option<String> {
        let header = match self.cookies.cookie_header().await {
            Ok(header) => header,
            Err(e) => {
                debug!("[Session] cookie jar unavailable: {:#}", e);
                return None;
            }
        };

        cookie_value(&header, &self.cookie_name)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticCookies;

    #[test]
    fn finds_named_cookie() {
        let header = "theme=dark; chainlit_session=abc123; other=1";
        assert_eq!(cookie_value(header, "chainlit_session"), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn name_must_match_exactly() {
        let header = "xchainlit_session=nope; chainlit_session_old=nope";
        assert_eq!(cookie_value(header, "chainlit_session"), None);
    }

    #[test]
    fn value_keeps_embedded_equals() {
        assert_eq!(cookie_value("s=a=b==", "s"), Some("a=b=="));
    }

    #[tokio::test]
    async fn resolver_reads_jar_each_call() {
        let cookies = Arc::new(StaticCookies::new("chainlit_session=first"));
        let resolver = SessionResolver::new(cookies.clone(), "chainlit_session");

        assert_eq!(resolver.current_session_id().await.as_deref(), Some("first"));
        cookies.set("chainlit_session=second");
        assert_eq!(resolver.current_session_id().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn empty_or_missing_value_is_absent() {
        let resolver = SessionResolver::new(Arc::new(StaticCookies::new("chainlit_session=")), "chainlit_session");
        assert_eq!(resolver.current_session_id().await, None);

        let resolver = SessionResolver::new(Arc::new(StaticCookies::new("")), "chainlit_session");
        assert_eq!(resolver.current_session_id().await, None);
    }

    #[tokio::test]
    async fn jar_errors_resolve_to_none() {
        let resolver = SessionResolver::new(Arc::new(StaticCookies::failing()), "chainlit_session");
        assert_eq!(resolver.current_session_id().await, None);
    }
}
