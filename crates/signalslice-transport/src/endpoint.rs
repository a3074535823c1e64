//! Backend endpoint: one base URL yields both the push and the poll address.
//!
//! `http://host:port/prefix` maps to `ws://host:port/prefix/ws` and
//! `http://host:port/prefix/api/activity_feed`. Query, fragment and
//! credentials on the base are ignored.

use url::Url;

use crate::error::TransportError;

pub const PUSH_PATH: &str = "ws";
pub const FEED_PATH: &str = "api/activity_feed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    /// `host:port`, port filled in from the scheme when absent.
    authority: String,
    push: Url,
    feed: Url,
}

impl BackendEndpoint {
    pub fn parse(base: &str) -> Result<Self, TransportError> {
        let trimmed = base.trim();
        let invalid = |reason: &str| TransportError::InvalidUrl(format!("{trimmed}: {reason}"));

        let mut url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "http" => {}
            // Both clients are built without a TLS backend.
            "https" => return Err(invalid("https is not supported, use http://")),
            _ => return Err(invalid("expected http://")),
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        url.set_query(None);
        url.set_fragment(None);
        url.set_username("").map_err(|()| invalid("cannot strip username"))?;
        url.set_password(None).map_err(|()| invalid("cannot strip password"))?;
        // Relative joins replace the last segment unless the path is a directory.
        if !url.path().ends_with('/') {
            let dir = format!("{}/", url.path());
            url.set_path(&dir);
        }

        let feed = url.join(FEED_PATH).map_err(|e| invalid(&e.to_string()))?;
        let mut push = url.join(PUSH_PATH).map_err(|e| invalid(&e.to_string()))?;
        push.set_scheme("ws")
            .map_err(|()| invalid("cannot derive ws:// address"))?;

        Ok(Self {
            authority: format!("{host}:{port}"),
            push,
            feed,
        })
    }

    /// `host:port`, suitable for `tokio::net::lookup_host`. IPv6 hosts keep
    /// their brackets.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn push_url(&self) -> &Url {
        &self.push
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(base: &str) -> BackendEndpoint {
        BackendEndpoint::parse(base).unwrap()
    }

    #[test]
    fn http_base_maps_to_ws_and_feed() {
        let ep = parse("http://127.0.0.1:5000");
        assert_eq!(ep.authority(), "127.0.0.1:5000");
        assert_eq!(ep.push_url().as_str(), "ws://127.0.0.1:5000/ws");
        assert_eq!(
            ep.feed_url().as_str(),
            "http://127.0.0.1:5000/api/activity_feed"
        );
    }

    #[test]
    fn default_port_and_prefix() {
        let ep = parse("http://dash.example.org/signal");
        assert_eq!(ep.authority(), "dash.example.org:80");
        assert_eq!(ep.push_url().as_str(), "ws://dash.example.org/signal/ws");
        assert_eq!(
            ep.feed_url().as_str(),
            "http://dash.example.org/signal/api/activity_feed"
        );
        assert_eq!(parse("http://dash.example.org/signal/"), ep);
    }

    #[test]
    fn query_and_fragment_are_dropped() {
        let ep = parse("http://127.0.0.1:5000?debug=1#top");
        assert_eq!(ep.authority(), "127.0.0.1:5000");
        assert_eq!(ep.push_url().as_str(), "ws://127.0.0.1:5000/ws");
        assert_eq!(
            ep.feed_url().as_str(),
            "http://127.0.0.1:5000/api/activity_feed"
        );
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let ep = parse("HTTP://localhost:5000");
        assert_eq!(ep.authority(), "localhost:5000");
        assert_eq!(ep.push_url().as_str(), "ws://localhost:5000/ws");
    }

    #[test]
    fn credentials_do_not_leak_into_authority() {
        let ep = parse("http://user:pw@backend");
        assert_eq!(ep.authority(), "backend:80");
        assert_eq!(ep.push_url().as_str(), "ws://backend/ws");
        assert_eq!(ep.feed_url().as_str(), "http://backend/api/activity_feed");
    }

    #[test]
    fn ipv6_literal() {
        assert_eq!(parse("http://[::1]").authority(), "[::1]:80");
        let ep = parse("http://[::1]:5000");
        assert_eq!(ep.authority(), "[::1]:5000");
        assert_eq!(ep.push_url().as_str(), "ws://[::1]:5000/ws");
    }

    #[test]
    fn rejects_https_and_other_schemes() {
        for base in ["https://dash.example.org", "ftp://host", "http://", "localhost:5000"] {
            assert!(
                matches!(
                    BackendEndpoint::parse(base),
                    Err(TransportError::InvalidUrl(_))
                ),
                "{base}"
            );
        }
    }
}
