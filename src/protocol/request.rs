//! Request envelope: `POST <uri> <version>` plus options.

use super::error::EnvelopeError;
use super::header::{check_token, Envelope, Header, ParserRegistry, HOST, USER_AGENT};

/// The only request method the protocol accepts.
pub const SUPPORTED_METHOD: &str = "POST";

/// Version written on outbound requests.
pub const REQUEST_VERSION: &str = "HTTP/1.0";

/// Agent identifier sent by default. A single token, so it survives
/// whitespace-delimited extraction on the receiving side.
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    header: Header,
    uri: String,
    host: String,
    user_agent: String,
}

impl RequestHeader {
    /// Build an outbound request header for `uri`, announcing `host`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] unless both `uri` and `host` are
    /// single tokens.
    pub fn new(uri: impl Into<String>, host: impl Into<String>) -> Result<Self, EnvelopeError> {
        let uri = uri.into();
        let host = host.into();
        check_token("uri", &uri)?;
        check_token("host", &host)?;

        let mut request = Self {
            header: Header::new(),
            uri,
            host,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        };

        request.header.put_version(REQUEST_VERSION);
        request.header.put_option(USER_AGENT, request.user_agent.clone());
        request.header.put_option(HOST, request.host.clone());
        Ok(request)
    }

    /// Replace the agent identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] unless `agent` is a single token.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Result<Self, EnvelopeError> {
        let agent = agent.into();
        check_token("user agent", &agent)?;

        self.header.put_option(USER_AGENT, agent.clone());
        self.user_agent = agent;
        Ok(self)
    }

    /// Request target.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Host the client announced.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Client agent identifier.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Envelope for RequestHeader {
    fn from_start_line(line: &str) -> Result<Self, EnvelopeError> {
        let mut parts = line.split_whitespace();

        let method = parts
            .next()
            .ok_or(EnvelopeError::Malformed("empty request line"))?;
        if method != SUPPORTED_METHOD {
            return Err(EnvelopeError::MethodNotAllowed(method.to_string()));
        }

        let uri = parts
            .next()
            .ok_or(EnvelopeError::Malformed("request line without URI"))?;
        let version = parts
            .next()
            .ok_or(EnvelopeError::Malformed("request line without version"))?;

        let mut header = Header::new();
        header.put_version(version);

        Ok(Self {
            header,
            uri: uri.to_string(),
            host: String::new(),
            user_agent: String::new(),
        })
    }

    fn start_line(&self) -> String {
        format!("{} {} {}", SUPPORTED_METHOD, self.uri, self.header.version())
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    fn register_parsers(registry: &mut ParserRegistry<Self>) {
        registry.register(HOST, |request: &mut Self, value| {
            request.host = first_token(value);
            Ok(())
        });
        registry.register(USER_AGENT, |request: &mut Self, value| {
            request.user_agent = first_token(value);
            Ok(())
        });
    }
}

pub(crate) fn first_token(value: &str) -> String {
    value.split_whitespace().next().unwrap_or_default().to_string()
}
