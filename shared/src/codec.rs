//! Incremental decoder for HTTP-like requests
//!
//! Requests arrive as:
//! ```text
//! METHOD SP TARGET SP VERSION CRLF
//! *( NAME ":" VALUE CRLF )
//! CRLF
//! [ BODY ]        ; Content-Length bytes, if announced
//! ```
//!
//! Bytes may arrive in any number of chunks. The decoder keeps a cursor over
//! its buffer so each call only scans bytes it has not looked at yet.

use bytes::BytesMut;
use thiserror::Error;

use crate::limits::{MAX_BODY_BYTES, MAX_HEADER_BYTES, MAX_REQUEST_LINE_BYTES};

/// Errors that can occur while decoding a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Request line too long: {0} bytes (max: {MAX_REQUEST_LINE_BYTES})")]
    RequestLineTooLong(usize),

    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("Request line is not valid UTF-8")]
    InvalidEncoding,

    #[error("Header block too large: {0} bytes (max: {MAX_HEADER_BYTES})")]
    HeaderBlockTooLarge(usize),

    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("Body too large: {0} bytes (max: {MAX_BODY_BYTES})")]
    BodyTooLarge(usize),

    #[error("Connection ended before a request line was received")]
    Incomplete,
}

/// A completed section of the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The first line, terminator stripped
    RequestLine(String),
    /// Raw header lines, without the terminating blank line
    Headers {
        raw: String,
        content_length: Option<usize>,
    },
    /// Request payload; empty when none was announced
    Body(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    RequestLine,
    Headers,
    Body(usize),
    Done,
}

/// Streaming decoder for a single request
#[derive(Debug, Default)]
pub struct RequestDecoder {
    /// Unconsumed bytes
    buffer: BytesMut,
    /// Offset into `buffer` of the line being accumulated
    line_start: usize,
    /// Offset into `buffer` up to which bytes have been searched for a newline
    scanned: usize,
    phase: Phase,
    /// Set once the peer has stopped sending
    finished: bool,
}

impl RequestDecoder {
    /// Create a new request decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            ..Default::default()
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Treat the end of the buffered bytes as the end of the request
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// True once the body (or the absence of one) has been decoded
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The line currently being accumulated, if any
    pub fn pending_line(&self) -> String {
        match self.phase {
            Phase::RequestLine | Phase::Headers => {
                String::from_utf8_lossy(&self.buffer[self.line_start..]).into_owned()
            }
            Phase::Body(_) | Phase::Done => String::new(),
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next completed section
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain everything
    /// the buffered bytes allow.
    pub fn decode_next(&mut self) -> Result<Option<Frame>, ParseError> {
        match self.phase {
            Phase::RequestLine => self.decode_request_line(),
            Phase::Headers => self.decode_headers(),
            Phase::Body(len) => Ok(self.decode_body(len)),
            Phase::Done => Ok(None),
        }
    }

    fn decode_request_line(&mut self) -> Result<Option<Frame>, ParseError> {
        loop {
            let line_end = match find_newline(&self.buffer, self.scanned) {
                Some(pos) => pos,
                None if self.finished => {
                    if self.buffer.iter().all(u8::is_ascii_whitespace) {
                        return Err(ParseError::Incomplete);
                    }
                    self.buffer.len()
                }
                None => {
                    // A trailing CR may still be the start of the terminator
                    let pending = trim_line_end(&self.buffer).len();
                    if pending > MAX_REQUEST_LINE_BYTES {
                        return Err(ParseError::RequestLineTooLong(pending));
                    }
                    self.scanned = self.buffer.len();
                    return Ok(None);
                }
            };

            let consumed = (line_end + 1).min(self.buffer.len());
            let raw = self.buffer.split_to(consumed);
            self.scanned = 0;

            let line = trim_line_end(&raw);
            // Stray blank lines ahead of the request line are tolerated
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_REQUEST_LINE_BYTES {
                return Err(ParseError::RequestLineTooLong(line.len()));
            }

            let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;
            validate_request_line(line)?;

            self.phase = Phase::Headers;
            return Ok(Some(Frame::RequestLine(line.to_string())));
        }
    }

    fn decode_headers(&mut self) -> Result<Option<Frame>, ParseError> {
        let block_end = loop {
            match find_newline(&self.buffer, self.scanned) {
                Some(pos) => {
                    let line_start = self.line_start;
                    self.line_start = pos + 1;
                    self.scanned = pos + 1;
                    if trim_line_end(&self.buffer[line_start..=pos]).is_empty() {
                        break Some((line_start, pos + 1));
                    }
                }
                None if self.finished => break None,
                None => {
                    let pending = self.pending_header_bytes();
                    if pending > MAX_HEADER_BYTES {
                        return Err(ParseError::HeaderBlockTooLarge(pending));
                    }
                    self.scanned = self.buffer.len();
                    return Ok(None);
                }
            }
        };

        let (raw_len, consumed) = block_end.unwrap_or((self.buffer.len(), self.buffer.len()));
        if raw_len > MAX_HEADER_BYTES {
            return Err(ParseError::HeaderBlockTooLarge(raw_len));
        }

        let block = self.buffer.split_to(consumed);
        self.line_start = 0;
        self.scanned = 0;

        let raw = String::from_utf8_lossy(&block[..raw_len]).into_owned();
        let content_length = parse_content_length(&raw)?;

        self.phase = Phase::Body(content_length.unwrap_or(0));

        Ok(Some(Frame::Headers {
            raw,
            content_length,
        }))
    }

    /// Lower bound on the header block size given the bytes buffered so far.
    /// A partial line that is empty or a lone CR may turn out to be the
    /// terminating blank line, which does not count.
    fn pending_header_bytes(&self) -> usize {
        let partial = &self.buffer[self.line_start..];
        if trim_line_end(partial).is_empty() {
            self.line_start
        } else {
            self.buffer.len()
        }
    }

    fn decode_body(&mut self, len: usize) -> Option<Frame> {
        if self.buffer.len() < len && !self.finished {
            return None;
        }

        let take = len.min(self.buffer.len());
        let body = self.buffer.split_to(take);
        self.phase = Phase::Done;

        Some(Frame::Body(String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Iterate the `(name, value)` pairs of a raw header block
pub fn header_lines(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.lines().filter_map(|line| {
        let (name, value) = line.split_once(':')?;
        Some((name.trim(), value.trim()))
    })
}

fn parse_content_length(raw: &str) -> Result<Option<usize>, ParseError> {
    let mut content_length = None;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ParseError::MalformedHeader(line.to_string()));
        };
        if name.trim().is_empty() {
            return Err(ParseError::MalformedHeader(line.to_string()));
        }
        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            let len: usize = value
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
            if len > MAX_BODY_BYTES {
                return Err(ParseError::BodyTooLarge(len));
            }
            content_length = Some(len);
        }
    }

    Ok(content_length)
}

fn validate_request_line(line: &str) -> Result<(), ParseError> {
    let malformed = || ParseError::MalformedRequestLine(line.to_string());

    let mut parts = line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    if !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(malformed());
    }
    if !target.starts_with('/') {
        return Err(malformed());
    }
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }

    Ok(())
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| from + pos)
}

/// Strip one line terminator (`\n` or `\r\n`, or a lone pending `\r`)
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &[u8] =
        b"GET /SaveSettings?temp=32.0 HTTP/1.1\r\nHost: incubator\r\nContent-Length: 11\r\n\r\nhumidity=65";

    fn drain(decoder: &mut RequestDecoder) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode_next().expect("decode error") {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_decode_complete_request() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(REQUEST);

        let frames = drain(&mut decoder);
        assert_eq!(
            frames,
            vec![
                Frame::RequestLine("GET /SaveSettings?temp=32.0 HTTP/1.1".into()),
                Frame::Headers {
                    raw: "Host: incubator\r\nContent-Length: 11\r\n".into(),
                    content_length: Some(11),
                },
                Frame::Body("humidity=65".into()),
            ]
        );
        assert!(decoder.is_done());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_byte_at_a_time_matches_single_chunk() {
        let mut whole = RequestDecoder::new();
        whole.extend(REQUEST);
        let expected = drain(&mut whole);

        let mut decoder = RequestDecoder::new();
        let mut frames = Vec::new();
        for byte in REQUEST {
            decoder.extend(std::slice::from_ref(byte));
            frames.extend(drain(&mut decoder));
        }

        assert_eq!(frames, expected);
    }

    #[test]
    fn test_partial_request_line_waits() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /sta");

        assert!(decoder.decode_next().expect("decode error").is_none());
        assert_eq!(decoder.pending_line(), "GET /sta");
        assert_eq!(decoder.buffer_len(), 8);
    }

    #[test]
    fn test_no_content_length_resolves_at_header_end() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /stop HTTP/1.1\r\nHost: x\r\n\r\n");

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], Frame::Body(String::new()));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_bare_newlines_accepted() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /start HTTP/1.0\nHost: x\n\n");

        let frames = drain(&mut decoder);
        assert_eq!(frames[0], Frame::RequestLine("GET /start HTTP/1.0".into()));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_finish_accepts_short_body() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"POST /savesettings HTTP/1.1\r\nContent-Length: 20\r\n\r\nhumidity=6");
        assert_eq!(drain(&mut decoder).len(), 2);

        decoder.finish();
        assert_eq!(
            decoder.decode_next().expect("decode error"),
            Some(Frame::Body("humidity=6".into()))
        );
    }

    #[test]
    fn test_finish_without_request_line_is_incomplete() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"\r\n");
        decoder.finish();

        assert_eq!(decoder.decode_next(), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_finish_with_unterminated_request_line() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /reboot HTTP/1.1");
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.finish();
        let frames = drain(&mut decoder);
        assert_eq!(frames[0], Frame::RequestLine("GET /reboot HTTP/1.1".into()));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_malformed_request_lines() {
        for line in [
            "GARBAGE\r\n",
            "GET HTTP/1.1\r\n",
            "get /start HTTP/1.1\r\n",
            "GET start HTTP/1.1\r\n",
            "GET /start FTP/1.0\r\n",
            "GET /start HTTP/1.1 extra\r\n",
        ] {
            let mut decoder = RequestDecoder::new();
            decoder.extend(line.as_bytes());
            assert!(
                matches!(decoder.decode_next(), Err(ParseError::MalformedRequestLine(_))),
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_request_line_too_long() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(&vec![b'A'; MAX_REQUEST_LINE_BYTES + 1]);

        assert!(matches!(
            decoder.decode_next(),
            Err(ParseError::RequestLineTooLong(_))
        ));
    }

    /// `GET /` + padding + ` HTTP/1.1`, exactly `len` bytes long
    fn request_line_of(len: usize) -> String {
        let fixed = "GET / HTTP/1.1".len();
        format!("GET /{} HTTP/1.1", "a".repeat(len - fixed))
    }

    /// One `X-Pad` header line, exactly `len` bytes including its CRLF
    fn header_line_of(len: usize) -> String {
        let fixed = "X-Pad: \r\n".len();
        format!("X-Pad: {}\r\n", "p".repeat(len - fixed))
    }

    #[test]
    fn test_request_line_at_limit_split_at_cr() {
        let line = request_line_of(MAX_REQUEST_LINE_BYTES);

        let mut whole = RequestDecoder::new();
        whole.extend(format!("{}\r\n", line).as_bytes());
        assert_eq!(whole.decode_next(), Ok(Some(Frame::RequestLine(line.clone()))));

        let mut split = RequestDecoder::new();
        split.extend(format!("{}\r", line).as_bytes());
        assert_eq!(split.decode_next(), Ok(None));
        split.extend(b"\n");
        assert_eq!(split.decode_next(), Ok(Some(Frame::RequestLine(line))));
    }

    #[test]
    fn test_request_line_over_limit_split_at_cr() {
        let line = request_line_of(MAX_REQUEST_LINE_BYTES + 1);

        let mut whole = RequestDecoder::new();
        whole.extend(format!("{}\r\n", line).as_bytes());
        assert_eq!(
            whole.decode_next(),
            Err(ParseError::RequestLineTooLong(MAX_REQUEST_LINE_BYTES + 1))
        );

        let mut split = RequestDecoder::new();
        split.extend(format!("{}\r", line).as_bytes());
        assert_eq!(
            split.decode_next(),
            Err(ParseError::RequestLineTooLong(MAX_REQUEST_LINE_BYTES + 1))
        );
    }

    #[test]
    fn test_header_block_at_limit_split_at_cr() {
        let header = header_line_of(MAX_HEADER_BYTES);
        let head = format!("GET /start HTTP/1.1\r\n{}", header);

        let mut whole = RequestDecoder::new();
        whole.extend(format!("{}\r\n", head).as_bytes());
        let expected = drain(&mut whole);
        assert_eq!(expected.len(), 3);

        let mut split = RequestDecoder::new();
        split.extend(format!("{}\r", head).as_bytes());
        let mut frames = drain(&mut split);
        assert_eq!(frames.len(), 1);
        split.extend(b"\n");
        frames.extend(drain(&mut split));

        assert_eq!(frames, expected);
        assert_eq!(
            frames[1],
            Frame::Headers {
                raw: header,
                content_length: None,
            }
        );
    }

    #[test]
    fn test_header_block_too_large_once_complete() {
        let request = format!(
            "GET /start HTTP/1.1\r\n{}\r\n",
            header_line_of(MAX_HEADER_BYTES + 1)
        );
        let mut decoder = RequestDecoder::new();
        decoder.extend(request.as_bytes());

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert_eq!(
            decoder.decode_next(),
            Err(ParseError::HeaderBlockTooLarge(MAX_HEADER_BYTES + 1))
        );
    }

    #[test]
    fn test_header_block_too_large_while_waiting() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /start HTTP/1.1\r\nX-Pad: ");
        assert!(decoder.decode_next().expect("decode error").is_some());
        assert_eq!(decoder.decode_next(), Ok(None));

        decoder.extend(&vec![b'p'; MAX_HEADER_BYTES]);
        assert!(matches!(
            decoder.decode_next(),
            Err(ParseError::HeaderBlockTooLarge(_))
        ));
    }

    #[test]
    fn test_body_too_large() {
        let mut decoder = RequestDecoder::new();
        let request = format!(
            "POST /savesettings HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        decoder.extend(request.as_bytes());

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(matches!(decoder.decode_next(), Err(ParseError::BodyTooLarge(_))));
    }

    #[test]
    fn test_malformed_header() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /start HTTP/1.1\r\nno colon here\r\n\r\n");

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(matches!(decoder.decode_next(), Err(ParseError::MalformedHeader(_))));
    }

    #[test]
    fn test_invalid_content_length() {
        let mut decoder = RequestDecoder::new();
        decoder.extend(b"GET /start HTTP/1.1\r\nContent-Length: eleven\r\n\r\n");

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(matches!(
            decoder.decode_next(),
            Err(ParseError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_header_lines() {
        let pairs: Vec<_> = header_lines("Host: incubator\r\nContent-Length: 11\r\n").collect();
        assert_eq!(pairs, vec![("Host", "incubator"), ("Content-Length", "11")]);
    }
}
