//! Generic line-oriented header with a per-option parser registry.
//!
//! Option names are stored lower-cased and keep their trailing `:` as part
//! of the key, so `"Content-Length:"` and `"content-length:"` address the
//! same entry. Concrete envelopes ([`RequestHeader`](super::RequestHeader),
//! [`ResponseHeader`](super::ResponseHeader)) implement [`Envelope`] to add
//! their start line and their own option parsers.
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{Envelope, RequestHeader};
//!
//! let raw = b"POST /RPC2 HTTP/1.1\r\nHost: example.org\r\nContent-Length: 0\r\n\r\n";
//! let (header, consumed) = RequestHeader::parse(raw).unwrap();
//!
//! assert_eq!(consumed, raw.len());
//! assert_eq!(header.uri(), "/RPC2");
//! assert_eq!(header.host(), "example.org");
//! ```

use std::collections::HashMap;
use std::fmt;

use super::error::EnvelopeError;

/// Character every well-formed option name ends with.
pub const DELIMITER: char = ':';

/// `content-length:` option name.
pub const CONTENT_LENGTH: &str = "content-length:";
/// `content-type:` option name.
pub const CONTENT_TYPE: &str = "content-type:";
/// `connection:` option name.
pub const CONNECTION: &str = "connection:";
/// `host:` option name.
pub const HOST: &str = "host:";
/// `user-agent:` option name.
pub const USER_AGENT: &str = "user-agent:";
/// `server:` option name.
pub const SERVER: &str = "server:";
/// `date:` option name.
pub const DATE: &str = "date:";
/// `allowed:` option name, sent with 405 responses.
pub const ALLOWED: &str = "allowed:";

/// The only media type accepted for non-empty content.
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Ordered option store shared by request and response envelopes.
///
/// `content_length` is kept in step with the `content-length:` option by
/// [`Header::set_content_length`], which also toggles `content-type:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    options: Vec<(String, String)>,
    version: String,
    content_length: usize,
}

impl Header {
    /// Create an empty header carrying only `connection: close`.
    pub fn new() -> Self {
        let mut header = Self {
            options: Vec::new(),
            version: String::new(),
            content_length: 0,
        };
        header.put_option(CONNECTION, "close".to_string());
        header
    }

    /// Protocol version string, e.g. `HTTP/1.1`.
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Set the protocol version string.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] unless `version` is a single token.
    pub fn set_version(&mut self, version: &str) -> Result<(), EnvelopeError> {
        check_token("version", version)?;
        self.put_version(version);
        Ok(())
    }

    pub(crate) fn put_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    /// Declared content length.
    #[inline]
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Set the content length, updating `content-length:` and `content-type:`.
    ///
    /// `content-type: text/xml` is present only while the length is non-zero.
    pub fn set_content_length(&mut self, length: usize) {
        self.content_length = length;
        self.put_option(CONTENT_LENGTH, length.to_string());

        if length > 0 {
            self.put_option(CONTENT_TYPE, XML_CONTENT_TYPE.to_string());
        } else {
            self.remove_option(CONTENT_TYPE);
        }
    }

    /// Look up an option value. The name is matched case-insensitively.
    pub fn option(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.options
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Add an option, or overwrite its value in place if it already exists.
    ///
    /// The value is stored trimmed. `content-length:` goes through
    /// [`Header::set_content_length`].
    ///
    /// ```
    /// use rpcwire::protocol::Header;
    ///
    /// let mut header = Header::new();
    /// header.set_option("Allowed:", "POST").unwrap();
    /// assert_eq!(header.option("allowed:"), Some("POST"));
    ///
    /// assert!(header.set_option("allowed", "POST").is_err());
    /// assert!(header.set_option("x-note:", "a\r\nx-evil: 1").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] if the name does not end with `:`
    /// or contains whitespace, if the value contains control characters other
    /// than tab, or if a `content-length:` value is not a number.
    pub fn set_option(&mut self, name: &str, value: impl Into<String>) -> Result<(), EnvelopeError> {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        check_option(&name, &value)?;

        if name == CONTENT_LENGTH {
            let length = value.trim().parse::<usize>().map_err(|_| EnvelopeError::Invalid {
                what: "content-length",
                value: value.clone(),
            })?;
            self.set_content_length(length);
        } else {
            self.put_option(&name, value.trim().to_string());
        }
        Ok(())
    }

    /// Remove an option if present.
    ///
    /// `content-length:` cannot be removed; it is reset to `0` instead.
    pub fn unset_option(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        if name == CONTENT_LENGTH {
            self.set_content_length(0);
        } else {
            self.remove_option(&name);
        }
    }

    /// Store an option without validation. `name` must already be valid.
    pub(crate) fn put_option(&mut self, name: &str, value: String) {
        let name = name.to_ascii_lowercase();

        match self.options.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.options.push((name, value)),
        }
    }

    fn remove_option(&mut self, name: &str) {
        self.options.retain(|(n, _)| n != name);
    }

    /// Iterate options in storage order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Serialize options as `name value\r\n` lines followed by a blank line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out);
        out
    }

    pub(crate) fn dump_into(&self, out: &mut String) {
        for (name, value) in &self.options {
            out.push_str(name);
            out.push(' ');
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }

    /// Read option lines up to and including the first blank line.
    fn parse_options(&mut self, cursor: &mut Cursor<'_>) -> Result<(), EnvelopeError> {
        loop {
            let name = cursor.read_option_name()?;

            if name.is_empty() {
                cursor.read_eol()?;
                return Ok(());
            }

            let value = cursor.read_line_content()?;
            self.put_option(&name, value);
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed extraction hook for a single option, bound to the envelope type.
pub type OptionParser<E> = Box<dyn Fn(&mut E, &str) -> Result<(), EnvelopeError> + Send + Sync>;

/// Mapping from option name to the parser that interprets its value.
///
/// Built with [`ParserRegistry::new`], which installs the generic
/// `content-length:`/`content-type:` parsers followed by the envelope's own
/// ([`Envelope::register_parsers`]). Callers may register more.
pub struct ParserRegistry<E> {
    parsers: HashMap<String, OptionParser<E>>,
}

impl<E: Envelope> ParserRegistry<E> {
    /// Registry with the default parsers for envelope `E`.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(CONTENT_LENGTH, |envelope: &mut E, value| {
            let length = value
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or(EnvelopeError::Malformed("invalid content-length"))?;
            envelope.header_mut().set_content_length(length);
            Ok(())
        });

        registry.register(CONTENT_TYPE, |_: &mut E, value| check_content_type(value));

        E::register_parsers(&mut registry);
        registry
    }
}

impl<E> ParserRegistry<E> {
    /// Registry without any parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Bind `name` to `parser`, replacing any previous parser for that name.
    pub fn register<F>(&mut self, name: &str, parser: F)
    where
        F: Fn(&mut E, &str) -> Result<(), EnvelopeError> + Send + Sync + 'static,
    {
        self.parsers
            .insert(name.to_ascii_lowercase(), Box::new(parser));
    }

    /// Check whether a parser is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(&name.to_ascii_lowercase())
    }

    fn get(&self, name: &str) -> Option<&OptionParser<E>> {
        self.parsers.get(name)
    }
}

impl<E: Envelope> Default for ParserRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ParserRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ParserRegistry")
            .field("options", &names)
            .finish()
    }
}

/// Validate a `content-type:` value. Media type parameters are ignored.
pub(crate) fn check_content_type(value: &str) -> Result<(), EnvelopeError> {
    let media_type = value.split(';').next().unwrap_or_default().trim();

    if media_type.eq_ignore_ascii_case(XML_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(EnvelopeError::UnsupportedContentType(value.to_string()))
    }
}

/// Validate an option about to be written. `name` must be lower-cased.
pub(crate) fn check_option(name: &str, value: &str) -> Result<(), EnvelopeError> {
    let well_formed = name.len() > 1
        && name.ends_with(DELIMITER)
        && name.bytes().all(|b| b.is_ascii_graphic());
    if !well_formed {
        return Err(EnvelopeError::Invalid {
            what: "option name",
            value: name.to_string(),
        });
    }

    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(EnvelopeError::Invalid {
            what: "option value",
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validate a start line field or single-token option value.
pub(crate) fn check_token(what: &'static str, value: &str) -> Result<(), EnvelopeError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(EnvelopeError::Invalid {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Reason phrase safe to put on a status line.
pub(crate) fn clean_phrase(phrase: &str) -> String {
    phrase
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// An HTTP envelope: a start line plus a [`Header`].
pub trait Envelope: Sized + Clone + fmt::Debug + Send + Sync + 'static {
    /// Build a bare envelope from its start line; options are filled in afterwards.
    fn from_start_line(line: &str) -> Result<Self, EnvelopeError>;

    /// Start line without the trailing CRLF.
    fn start_line(&self) -> String;

    /// Shared option store.
    fn header(&self) -> &Header;

    /// Shared option store, mutable.
    fn header_mut(&mut self) -> &mut Header;

    /// Install envelope-specific option parsers.
    fn register_parsers(_registry: &mut ParserRegistry<Self>) {}

    /// Serialize start line and options, including the terminating blank line.
    fn dump(&self) -> String {
        let mut out = self.start_line();
        out.push_str("\r\n");
        self.header().dump_into(&mut out);
        out
    }

    /// Parse with the default parser registry.
    ///
    /// Returns the envelope and the number of bytes consumed, which ends
    /// right after the blank line.
    fn parse(bytes: &[u8]) -> Result<(Self, usize), EnvelopeError> {
        Self::parse_with(bytes, &ParserRegistry::new())
    }

    /// Parse using a caller-supplied parser registry.
    ///
    /// After all option lines are read, every option with a registered parser
    /// is replayed through it. Options without a parser must still contain
    /// the `:` delimiter, which catches garbled start lines read as options.
    fn parse_with(
        bytes: &[u8],
        registry: &ParserRegistry<Self>,
    ) -> Result<(Self, usize), EnvelopeError> {
        let mut cursor = Cursor::new(bytes);

        let line = cursor.read_line_content()?;
        let mut envelope = Self::from_start_line(&line)?;
        envelope.header_mut().parse_options(&mut cursor)?;

        // Parsers may rewrite options (content-length toggles content-type),
        // so they see the values as received.
        let received = envelope.header().options.clone();
        for (name, value) in &received {
            if let Some(parser) = registry.get(name) {
                parser(&mut envelope, value)?;
                continue;
            }

            if !name.contains(DELIMITER) {
                return Err(EnvelopeError::Malformed("option name without delimiter"));
            }
        }

        Ok((envelope, cursor.position()))
    }
}

/// Byte cursor over raw header text.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Read a lower-cased option name up to whitespace or end of line.
    ///
    /// The line terminator is left in place. An empty name means a blank line.
    fn read_option_name(&mut self) -> Result<String, EnvelopeError> {
        let start = self.pos;

        loop {
            match self.peek() {
                Some(b' ' | b'\t') => {
                    let name = to_text(&self.bytes[start..self.pos])?;
                    self.pos += 1;
                    return Ok(name.to_ascii_lowercase());
                }
                Some(b'\r' | b'\n') => {
                    let name = to_text(&self.bytes[start..self.pos])?;
                    return Ok(name.to_ascii_lowercase());
                }
                Some(_) => self.pos += 1,
                None => return Err(EnvelopeError::Malformed("unterminated header line")),
            }
        }
    }

    /// Consume a CRLF or bare LF.
    fn read_eol(&mut self) -> Result<(), EnvelopeError> {
        match self.bump() {
            Some(b'\r') => match self.bump() {
                Some(b'\n') => Ok(()),
                _ => Err(EnvelopeError::Malformed("bare CR in header")),
            },
            Some(b'\n') => Ok(()),
            Some(_) => Err(EnvelopeError::Malformed("expected end of line")),
            None => Err(EnvelopeError::Malformed("unterminated header line")),
        }
    }

    /// Read the rest of the line with surrounding whitespace trimmed, consuming the terminator.
    fn read_line_content(&mut self) -> Result<String, EnvelopeError> {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }

        let start = self.pos;
        while !matches!(self.peek(), Some(b'\r' | b'\n') | None) {
            self.pos += 1;
        }
        let content = to_text(&self.bytes[start..self.pos])?;

        self.read_eol()?;
        Ok(content.trim_end().to_string())
    }
}

fn to_text(bytes: &[u8]) -> Result<&str, EnvelopeError> {
    std::str::from_utf8(bytes).map_err(|_| EnvelopeError::Malformed("header is not valid UTF-8"))
}
