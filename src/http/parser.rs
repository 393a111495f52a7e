use crate::{
    http::{
        request::Request,
        types::{self, Method},
    },
    server::pools::Pool,
};
use memchr::memchr;
use std::net::SocketAddr;

// Request line and each header line must fit in this many bytes.
pub(crate) const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Reasons the parser rejects a request.
///
/// Every variant is fatal for the connection: the loop stops reading,
/// finishes any pending write and closes. The input view is left untouched
/// so the offending bytes stay available for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The request line exceeds the 8 KiB line limit.
    RequestLineTooLong,
    /// A header line exceeds the 8 KiB line limit.
    HeaderLineTooLong,
    /// More headers than the configured `max_header_count`.
    TooManyHeaders,
    /// The version token is anything other than `HTTP/1.1`.
    UnsupportedHttpVersion,
    /// Declared `Content-Length` exceeds the configured
    /// `max_request_body_size`.
    RequestBodyTooLarge,
    /// Malformed request line, non-ASCII token or malformed
    /// `Content-Length`.
    InvalidRequest,
}

// Outcome of one parse attempt over the ingress buffer.
#[derive(Debug)]
pub(crate) enum Parsed {
    // A full request was decoded; the input view advanced past it.
    Success(Request),
    // More bytes are required; the input view is unchanged.
    Incomplete,
    // Fatal protocol fault; the input view is unchanged.
    Rejected(ParseError),
}

// Everything the parser needs besides the bytes themselves.
pub(crate) struct ParseSetup<'a> {
    pub(crate) secure: bool,
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) pool: Option<&'a Pool<Request>>,
    pub(crate) max_header_count: usize,
    pub(crate) max_request_body_size: usize,
}

impl ParseSetup<'_> {
    #[cfg(test)]
    pub(crate) fn plain(max_header_count: usize, max_request_body_size: usize) -> Self {
        ParseSetup {
            secure: false,
            remote: None,
            local: None,
            pool: None,
            max_header_count,
            max_request_body_size,
        }
    }
}

/// Decodes one HTTP/1.1 request from the front of `input`.
///
/// On [`Parsed::Success`] the view advances past the consumed bytes and the
/// returned request owns a copy of the body, so the caller may reclaim the
/// buffer behind the view. On any other outcome the view is unchanged.
pub(crate) fn parse(input: &mut &[u8], setup: &ParseSetup<'_>) -> Parsed {
    let mut request = match setup.pool {
        Some(pool) => pool.acquire(),
        None => Request::new(),
    };

    match fill(&mut request, input, setup) {
        Ok(()) => Parsed::Success(request),
        Err(step) => {
            if let Some(pool) = setup.pool {
                pool.release(request);
            }
            match step {
                Step::Incomplete => Parsed::Incomplete,
                Step::Rejected(err) => Parsed::Rejected(err),
            }
        }
    }
}

enum Step {
    Incomplete,
    Rejected(ParseError),
}

impl From<ParseError> for Step {
    fn from(err: ParseError) -> Self {
        Step::Rejected(err)
    }
}

// One scanned line: bytes before the LF, trailing CR stripped.
enum Line<'a> {
    Found { content: &'a [u8], next: usize },
    Missing { over_limit: bool },
}

#[inline]
fn read_line(buf: &[u8], start: usize) -> Line<'_> {
    let window = &buf[start.min(buf.len())..];
    let scan = &window[..window.len().min(MAX_LINE_LENGTH + 1)];

    match memchr(b'\n', scan) {
        Some(end) => {
            let mut content = &window[..end];
            if let [head @ .., b'\r'] = content {
                content = head;
            }
            Line::Found {
                content,
                next: start + end + 1,
            }
        }
        None => Line::Missing {
            over_limit: window.len() > MAX_LINE_LENGTH,
        },
    }
}

#[inline(always)]
fn decode(token: &[u8]) -> Result<&str, ParseError> {
    simdutf8::basic::from_utf8(token).map_err(|_| ParseError::InvalidRequest)
}

fn fill(request: &mut Request, input: &mut &[u8], setup: &ParseSetup<'_>) -> Result<(), Step> {
    let buf = *input;

    // Request line
    let (line, mut pos) = match read_line(buf, 0) {
        Line::Found { content, next } => (content, next),
        Line::Missing { over_limit: true } => {
            return Err(ParseError::RequestLineTooLong.into());
        }
        Line::Missing { over_limit: false } => return Err(Step::Incomplete),
    };
    parse_request_line(request, line)?;

    // Header lines, up to the blank separator
    loop {
        let line = match read_line(buf, pos) {
            Line::Found { content, next } => {
                pos = next;
                content
            }
            Line::Missing { over_limit: true } => {
                return Err(ParseError::HeaderLineTooLong.into());
            }
            Line::Missing { over_limit: false } => return Err(Step::Incomplete),
        };

        if line.is_empty() {
            break;
        }
        parse_header_line(request, line, setup)?;
    }

    // Body: exactly content_length bytes, copied out of the pipe memory
    let need = request.content_length;
    if buf.len() - pos < need {
        return Err(Step::Incomplete);
    }
    request.body.clear();
    request.body.extend_from_slice(&buf[pos..pos + need]);
    pos += need;

    request.secure = setup.secure;
    if let Some(remote) = setup.remote {
        request.remote_addr = Some(remote.ip());
        request.remote_port = remote.port();
    }
    if let Some(local) = setup.local {
        request.local_port = local.port();
    }

    *input = &buf[pos..];
    Ok(())
}

// `METHOD SP path[?query] SP HTTP/1.1` with exactly two single spaces.
fn parse_request_line(request: &mut Request, line: &[u8]) -> Result<(), Step> {
    let first = memchr(b' ', line).ok_or(ParseError::InvalidRequest)?;
    let rest = &line[first + 1..];
    let second = memchr(b' ', rest).ok_or(ParseError::InvalidRequest)?;

    let method = &line[..first];
    let target = &rest[..second];
    let version = &rest[second + 1..];

    if method.is_empty() || target.is_empty() || memchr(b' ', version).is_some() {
        return Err(ParseError::InvalidRequest.into());
    }

    request.method = Method::from_token(method).ok_or(ParseError::InvalidRequest)?;

    if version != b"HTTP/1.1" {
        return Err(ParseError::UnsupportedHttpVersion.into());
    }

    let (path, query) = match memchr(b'?', target) {
        Some(split) => (&target[..split], &target[split + 1..]),
        None => (target, &[][..]),
    };

    request.path.clear();
    request.path.push_str(decode(path)?);
    request.query.clear();
    request.query.push_str(decode(query)?);

    Ok(())
}

fn parse_header_line(
    request: &mut Request,
    line: &[u8],
    setup: &ParseSetup<'_>,
) -> Result<(), Step> {
    // No colon, or a colon in first position: not a header, skipped.
    let colon = match memchr(b':', line) {
        Some(0) | None => return Ok(()),
        Some(colon) => colon,
    };

    if request.headers.len() == setup.max_header_count {
        return Err(ParseError::TooManyHeaders.into());
    }

    let name = decode(types::trim_ascii(&line[..colon]))?;
    let value = decode(types::trim_ascii(&line[colon + 1..]))?;

    if name.eq_ignore_ascii_case("content-length") {
        // Only the first occurrence is authoritative.
        if !request
            .headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        {
            let length =
                types::slice_to_usize(value.as_bytes()).ok_or(ParseError::InvalidRequest)?;
            if length > setup.max_request_body_size {
                return Err(ParseError::RequestBodyTooLarge.into());
            }
            request.content_length = length;
        }
    } else if name.eq_ignore_ascii_case("content-type") {
        if request.content_type.is_empty() {
            request.content_type.push_str(value);
        }
    } else if name.eq_ignore_ascii_case("connection") && value.eq_ignore_ascii_case("close") {
        request.keep_alive = false;
    }

    request.headers.push((name.to_owned(), value.to_owned()));
    Ok(())
}
