//! Location of the page a client agent runs on.

use url::{Host, Url};

use crate::ConfigError;

/// Origin (scheme, host and port) of the hosting page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLocation {
    origin: Url,
}

impl PageLocation {
    /// Parse an origin such as `http://localhost:3000`.
    ///
    /// Only `http` and `https` are accepted. Userinfo, path, query and
    /// fragment are dropped. A port equal to the scheme default is treated as
    /// absent.
    pub fn parse(origin: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidOrigin {
            origin: origin.to_owned(),
            reason,
        };

        let url = Url::parse(origin).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.host().is_none() {
            return Err(invalid("missing host".to_owned()));
        }

        let origin = Url::parse(&url.origin().ascii_serialization())
            .map_err(|err| invalid(err.to_string()))?;
        Ok(Self { origin })
    }

    /// Scheme without the trailing colon (`http` or `https`).
    #[must_use]
    pub fn protocol(&self) -> &str {
        self.origin.scheme()
    }

    /// Host name or IP literal. IPv6 addresses come without brackets.
    #[must_use]
    pub fn hostname(&self) -> String {
        match self.origin.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        }
    }

    /// Explicit port, `None` when the origin omits it.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.origin.port()
    }

    /// WebSocket scheme matching the page's protocol.
    #[must_use]
    pub fn websocket_scheme(&self) -> &'static str {
        if self.protocol() == "https" { "wss" } else { "ws" }
    }

    /// The normalized origin as a URL with an empty path.
    pub(crate) fn origin(&self) -> &Url {
        &self.origin
    }
}
