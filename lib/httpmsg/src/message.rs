//! The HTTP/1.0 message model: a tagged first line (`RequestLine` or
//! `StatusLine`), an ordered header list, and a raw body. Parsing works on
//! bytes rather than `String` throughout, since a response body is
//! arbitrary binary and only the first-line/header section is guaranteed
//! ASCII, mirroring `libhttp`'s `Message::Message(const std::string&)`
//! constructor (find `CRLF`, slice, repeat) but over a byte buffer.

use crate::dates::parse_http_date;
use crate::headers::HeaderList;
use crate::status::StatusCode;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum HttpError {
    Malformed(&'static str),
    NotUtf8,
    Io(io::Error),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Malformed(reason) => write!(f, "malformed HTTP message: {}", reason),
            HttpError::NotUtf8 => write!(f, "header section is not valid utf-8"),
            HttpError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for HttpError {}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        HttpError::Io(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Extension(token) => token.as_str(),
        }
    }

    pub fn parse(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            other => Method::Extension(other.to_string()),
        }
    }
}

/// `HTTP/<major>.<minor>`; defaults to `HTTP/1.0` per §4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Default for Version {
    fn default() -> Version {
        Version { major: 1, minor: 0 }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

impl Version {
    fn parse(token: &str) -> Result<Version, HttpError> {
        let rest = token
            .strip_prefix("HTTP/")
            .ok_or(HttpError::Malformed("version missing HTTP/ prefix"))?;
        let mut parts = rest.splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(HttpError::Malformed("version major is not a number"))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(HttpError::Malformed("version minor is not a number"))?;
        Ok(Version { major, minor })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: String,
    pub version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: StatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstLine {
    Request(RequestLine),
    Status(StatusLine),
}

/// A fully parsed HTTP/1.0 message, request or response.
#[derive(Debug, Clone)]
pub struct Message {
    pub first_line: FirstLine,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn split_header_line(line: &str) -> Result<(&str, &str), HttpError> {
    let colon = line.find(':').ok_or(HttpError::Malformed("header missing ':'"))?;
    let name = &line[..colon];
    let value = line[colon + 1..].trim_start_matches(|c| c == ' ' || c == '\t');
    Ok((name, value))
}

fn parse_first_line(line: &str) -> Result<FirstLine, HttpError> {
    if line.starts_with("HTTP/") {
        let mut parts = line.splitn(3, ' ');
        let version = Version::parse(parts.next().ok_or(HttpError::Malformed("empty status line"))?)?;
        let code: i32 = parts
            .next()
            .ok_or(HttpError::Malformed("status line missing code"))?
            .parse()
            .map_err(|_| HttpError::Malformed("status code is not a number"))?;
        Ok(FirstLine::Status(StatusLine {
            version,
            status: StatusCode::from_code(code),
        }))
    } else {
        let mut parts = line.splitn(3, ' ');
        let method = parts.next().ok_or(HttpError::Malformed("empty request line"))?;
        let uri = parts.next().ok_or(HttpError::Malformed("request line missing uri"))?;
        let version = parts
            .next()
            .ok_or(HttpError::Malformed("request line missing version"))?;
        Ok(FirstLine::Request(RequestLine {
            method: Method::parse(method),
            uri: uri.to_string(),
            version: Version::parse(version)?,
        }))
    }
}

impl Message {
    pub fn request(method: Method, uri: impl Into<String>, version: Version) -> Message {
        Message {
            first_line: FirstLine::Request(RequestLine {
                method,
                uri: uri.into(),
                version,
            }),
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    pub fn response(status: StatusCode, version: Version) -> Message {
        Message {
            first_line: FirstLine::Status(StatusLine { version, status }),
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    /// Parses `first-line CRLF (header CRLF)* CRLF body?` per §4.F. Any
    /// bytes following the blank line become the body verbatim.
    pub fn parse(bytes: &[u8]) -> Result<Message, HttpError> {
        let first_line_end = find(bytes, b"\r\n", 0).ok_or(HttpError::Malformed("missing first line"))?;
        let first_line_str =
            std::str::from_utf8(&bytes[..first_line_end]).map_err(|_| HttpError::NotUtf8)?;
        let first_line = parse_first_line(first_line_str)?;

        let mut pos = first_line_end + 2;
        let mut headers = HeaderList::new();
        loop {
            let line_end = find(bytes, b"\r\n", pos).ok_or(HttpError::Malformed("unterminated header section"))?;
            if line_end == pos {
                pos += 2;
                break;
            }
            let line = std::str::from_utf8(&bytes[pos..line_end]).map_err(|_| HttpError::NotUtf8)?;
            let (name, value) = split_header_line(line)?;
            headers.push(name, value);
            pos = line_end + 2;
        }

        Ok(Message {
            first_line,
            headers,
            body: bytes[pos..].to_vec(),
        })
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        match &self.first_line {
            FirstLine::Request(line) => write!(writer, "{} {} {}\r\n", line.method.as_str(), line.uri, line.version)?,
            FirstLine::Status(line) => write!(
                writer,
                "{} {} {}\r\n",
                line.version,
                line.status.code(),
                line.status.reason()
            )?,
        }
        for header in self.headers.iter() {
            write!(writer, "{}: {}\r\n", header.name, header.value)?;
        }
        write!(writer, "\r\n")?;
        writer.write_all(&self.body)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.first_line {
            FirstLine::Request(line) => Some(line.uri.as_str()),
            FirstLine::Status(_) => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.first_line {
            FirstLine::Status(line) => Some(line.status),
            FirstLine::Request(_) => None,
        }
    }

    /// The general `Date` header, strictly parsed.
    pub fn date(&self) -> Option<u64> {
        self.headers.get("Date").and_then(parse_http_date)
    }

    /// The entity `Last-Modified` header, strictly parsed.
    pub fn last_modified(&self) -> Option<u64> {
        self.headers.get("Last-Modified").and_then(parse_http_date)
    }

    /// The entity `Expires` header. An unparseable value (or the header's
    /// absence handled by the caller) resolves to `now` -- "expires
    /// immediately" rather than a parse failure, per §4.F.
    pub fn expires(&self, now: u64) -> Option<u64> {
        self.headers.get("Expires").map(|value| parse_http_date(value).unwrap_or(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get_request() {
        let raw = b"GET /index.html HTTP/1.0\r\nHost: example.com\r\n\r\n";
        let msg = Message::parse(raw).unwrap();
        match msg.first_line {
            FirstLine::Request(ref line) => {
                assert_eq!(line.method, Method::Get);
                assert_eq!(line.uri, "/index.html");
                assert_eq!(line.version, Version { major: 1, minor: 0 });
            }
            _ => panic!("expected a request"),
        }
        assert_eq!(msg.headers.get("Host"), Some("example.com"));
        assert!(msg.body.is_empty());
    }

    #[test]
    fn parses_status_line_and_body() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhello world";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.status(), Some(StatusCode::Ok));
        assert_eq!(msg.body, b"hello world");
    }

    #[test]
    fn round_trips_through_write() {
        let mut msg = Message::request(Method::Get, "/a", Version::default());
        msg.headers.push("Host", "example.com");
        let bytes = msg.to_bytes();
        let parsed = Message::parse(&bytes).unwrap();
        assert_eq!(parsed.uri(), Some("/a"));
        assert_eq!(parsed.headers.get("Host"), Some("example.com"));
    }

    #[test]
    fn unknown_header_name_is_kept_verbatim() {
        let raw = b"GET / HTTP/1.0\r\nX-Custom-Thing: value\r\n\r\n";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.headers.get("X-Custom-Thing"), Some("value"));
    }

    #[test]
    fn expires_falls_back_to_now_when_unparseable() {
        let raw = b"HTTP/1.0 200 OK\r\nExpires: 0\r\n\r\n";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.expires(1_000), Some(1_000));
    }

    #[test]
    fn missing_first_line_is_rejected() {
        assert!(matches!(Message::parse(b"garbage"), Err(HttpError::Malformed(_))));
    }
}
