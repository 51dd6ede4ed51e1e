//! Response envelope: `<version> <code> <phrase>` plus options.

use chrono::Utc;

use super::error::EnvelopeError;
use super::header::{
    check_content_type, check_token, clean_phrase, Envelope, Header, ParserRegistry, CONTENT_TYPE,
    DATE, SERVER,
};
use super::request::first_token;

/// Version written on outbound responses.
pub const RESPONSE_VERSION: &str = "HTTP/1.1";

/// Status code of a successful exchange.
pub const STATUS_OK: u16 = 200;

/// Server identifier sent by default.
pub const DEFAULT_SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    header: Header,
    code: u16,
    phrase: String,
    server: String,
}

impl ResponseHeader {
    /// Build an outbound response header. Adds `date:` and `server:` options.
    ///
    /// Control characters in `phrase` are replaced by spaces so the status
    /// line stays on one line.
    pub fn new(code: u16, phrase: impl Into<String>) -> Self {
        let mut response = Self {
            header: Header::new(),
            code,
            phrase: clean_phrase(&phrase.into()),
            server: DEFAULT_SERVER_NAME.to_string(),
        };

        response.header.put_version(RESPONSE_VERSION);
        response.header.put_option(DATE, current_date());
        response.header.put_option(SERVER, response.server.clone());
        response
    }

    /// Replace the server identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] unless `server` is a single token.
    pub fn with_server(self, server: impl Into<String>) -> Result<Self, EnvelopeError> {
        let server = server.into();
        check_token("server name", &server)?;
        Ok(self.served_by(server))
    }

    /// Replace the server identifier. `server` must already be a valid token.
    pub(crate) fn served_by(mut self, server: String) -> Self {
        self.header.put_option(SERVER, server.clone());
        self.server = server;
        self
    }

    /// Status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Reason phrase.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Server identifier.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Whether the status code is `200`.
    pub fn is_success(&self) -> bool {
        self.code == STATUS_OK
    }
}

impl Default for ResponseHeader {
    fn default() -> Self {
        Self::new(STATUS_OK, "OK")
    }
}

impl Envelope for ResponseHeader {
    fn from_start_line(line: &str) -> Result<Self, EnvelopeError> {
        let (version, rest) = split_token(line);
        if version.is_empty() {
            return Err(EnvelopeError::Malformed("empty status line"));
        }

        let (code, phrase) = split_token(rest);
        let code = code
            .parse::<u16>()
            .map_err(|_| EnvelopeError::Malformed("invalid status code"))?;

        let mut header = Header::new();
        header.put_version(version);

        Ok(Self {
            header,
            code,
            phrase: phrase.to_string(),
            server: String::new(),
        })
    }

    fn start_line(&self) -> String {
        format!("{} {} {}", self.header.version(), self.code, self.phrase)
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    fn register_parsers(registry: &mut ParserRegistry<Self>) {
        registry.register(SERVER, |response: &mut Self, value| {
            response.server = first_token(value);
            Ok(())
        });
        // Error pages come in whatever media type the peer likes; the body of
        // a non-200 response is never handed to the payload codec.
        registry.register(CONTENT_TYPE, |response: &mut Self, value| {
            if response.is_success() {
                check_content_type(value)
            } else {
                Ok(())
            }
        });
    }
}

/// Split off the first whitespace-delimited token; the remainder is left-trimmed.
fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (text, ""),
    }
}

/// Current time as an RFC 1123 date, independent of locale and timezone.
fn current_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
