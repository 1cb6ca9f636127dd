//! Command envelope: one inbound request and its response
//!
//! The network listener feeds raw bytes into the envelope as they arrive.
//! Once the request is complete the envelope classifies it into an
//! [`Action`]; the executor then stores exactly one response.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::codec::{self, Frame, ParseError, RequestDecoder};
use crate::state_machine::{EnvelopeEvent, EnvelopeState, EnvelopeStateMachine, InvalidTransition};
use crate::Action;

/// Response body for requests whose action could not be resolved
pub const UNKNOWN_ACTION_BODY: &str = "ERROR: unknown action";

/// Response body for requests that could not be parsed
pub const MALFORMED_REQUEST_BODY: &str = "ERROR: malformed request";

/// Response status codes used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    UnprocessableEntity,
    InternalError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::UnprocessableEntity => 422,
            Status::InternalError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::UnprocessableEntity => "Unprocessable Entity",
            Status::InternalError => "Internal Server Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Outgoing response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    pub fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Render as an HTTP/1.1 response; the connection is always closed afterwards
    pub fn encode(&self) -> Bytes {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.body.len()
        );

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put_slice(head.as_bytes());
        buf.put_slice(self.body.as_bytes());
        buf.freeze()
    }
}

/// Decoded `application/x-www-form-urlencoded` fields, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    pairs: Vec<(String, String)>,
}

impl FormParams {
    /// Parse `a=1&b=2` style text. Pairs without `=` get an empty value.
    pub fn parse(text: &str) -> Self {
        let pairs = text
            .split('&')
            .filter(|pair| !pair.trim().is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (form_decode(key).trim().to_string(), form_decode(value))
            })
            .collect();

        Self { pairs }
    }

    /// Append every field of `other`; later fields shadow earlier ones
    pub fn merge(&mut self, other: FormParams) {
        self.pairs.extend(other.pairs);
    }

    /// Last value recorded for `key` (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Decode `+` and `%XX` escapes; invalid escapes are kept verbatim
fn form_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Per-connection container for the raw and derived request data
#[derive(Debug, Default)]
pub struct CommandEnvelope {
    decoder: RequestDecoder,
    fsm: EnvelopeStateMachine,
    request_line: String,
    header_block: String,
    body: String,
    post_data: String,
    action_token: String,
    action: Action,
    params: FormParams,
    response: Option<Response>,
    parse_error: Option<ParseError>,
}

impl CommandEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes and advance as far as they allow
    pub fn feed(&mut self, data: &[u8]) -> EnvelopeState {
        if self.is_receiving() {
            self.decoder.extend(data);
            self.advance();
        }
        self.state()
    }

    /// Mark the end of input (peer closed or went idle) and resolve with
    /// whatever has been received
    pub fn finish(&mut self) -> EnvelopeState {
        if self.is_receiving() {
            self.decoder.finish();
            self.advance();
        }
        self.state()
    }

    fn is_receiving(&self) -> bool {
        matches!(
            self.state(),
            EnvelopeState::Empty | EnvelopeState::ReceivingHeaders | EnvelopeState::ReceivingBody
        )
    }

    fn advance(&mut self) {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(frame)) => self.apply_frame(frame),
                Ok(None) => return,
                Err(e) => {
                    self.abort(e);
                    return;
                }
            }
        }
    }

    fn apply_frame(&mut self, frame: Frame) {
        match frame {
            Frame::RequestLine(line) => {
                self.request_line = line;
                self.transition(EnvelopeEvent::RequestLineReceived);
            }
            Frame::Headers { raw, .. } => {
                self.header_block = raw;
                self.transition(EnvelopeEvent::HeadersReceived);
            }
            Frame::Body(body) => {
                self.body = body;
                self.resolve();
                self.transition(EnvelopeEvent::ActionResolved);
            }
        }
    }

    fn transition(&mut self, event: EnvelopeEvent) {
        // The decoder emits frames in order, so these cannot be rejected
        let _ = self.fsm.process_event(event);
    }

    fn resolve(&mut self) {
        if !self.body.is_empty() {
            self.post_data = form_decode(&self.body);
        }

        let mut params = FormParams::parse(self.query());
        if !self.body.is_empty() {
            params.merge(FormParams::parse(&self.body));
        }

        let segment = self
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .map(form_decode)
            .unwrap_or_default();

        let token = if segment.trim().is_empty() {
            params.get("action").unwrap_or_default().to_string()
        } else {
            segment
        };

        self.action = Action::from_keyword(&token);
        self.action_token = self.action.keyword().unwrap_or_default().to_string();
        self.params = params;
    }

    fn abort(&mut self, error: ParseError) {
        self.action = Action::NotDefined;
        self.action_token.clear();
        self.response = Some(Response::new(Status::BadRequest, MALFORMED_REQUEST_BODY));
        self.parse_error = Some(error);
        self.transition(EnvelopeEvent::Aborted);
    }

    /// Store the response for a resolved envelope. Only the first call succeeds.
    pub fn respond(&mut self, response: Response) -> Result<(), InvalidTransition> {
        self.fsm.process_event(EnvelopeEvent::ResponseWritten)?;
        self.response = Some(response);
        Ok(())
    }

    /// Store an error response from any unfinished state
    pub fn fail(&mut self, response: Response) -> Result<(), InvalidTransition> {
        self.fsm.process_event(EnvelopeEvent::Aborted)?;
        self.action = Action::NotDefined;
        self.response = Some(response);
        Ok(())
    }

    pub fn state(&self) -> EnvelopeState {
        self.fsm.state()
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == EnvelopeState::Resolved
    }

    pub fn is_responded(&self) -> bool {
        self.state() == EnvelopeState::Responded
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn action_token(&self) -> &str {
        &self.action_token
    }

    pub fn request_line(&self) -> &str {
        &self.request_line
    }

    pub fn header_block(&self) -> &str {
        &self.header_block
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn post_data(&self) -> &str {
        &self.post_data
    }

    /// The line still being accumulated by the decoder
    pub fn line(&self) -> String {
        self.decoder.pending_line()
    }

    pub fn method(&self) -> &str {
        self.request_line.split_ascii_whitespace().next().unwrap_or_default()
    }

    fn target(&self) -> &str {
        self.request_line.split_ascii_whitespace().nth(1).unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        let target = self.target();
        target.split_once('?').map_or(target, |(path, _)| path)
    }

    pub fn query(&self) -> &str {
        self.target().split_once('?').map_or("", |(_, query)| query)
    }

    /// Query and POST fields; POST fields win on duplicate keys
    pub fn params(&self) -> &FormParams {
        &self.params
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        codec::header_lines(&self.header_block)
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.body.as_str())
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse_error.as_ref()
    }
}
