//! Correlation envelope: `direction;requestId;host;payload`.

use std::fmt;
use std::str::FromStr;

use crate::error::{TunnelError, TunnelResult};

/// Separator between envelope fields.
pub const FIELD_DELIMITER: char = ';';

const FIELD_COUNT: usize = 4;

/// Which way an envelope travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ingress to egress: "please fetch this".
    Out,
    /// Egress to ingress: "here is the result".
    In,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "OUT",
            Direction::In => "IN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OUT" => Ok(Direction::Out),
            "IN" => Ok(Direction::In),
            other => Err(TunnelError::EnvelopeParse(format!(
                "unknown direction '{}'",
                other
            ))),
        }
    }
}

/// Identifier correlating an OUT envelope with its IN reply.
///
/// Generated once per intercepted request on the ingress side and echoed
/// verbatim by the egress side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id (UUID v4, simple form).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Validate an id received from the wire.
    pub fn parse(raw: &str) -> TunnelResult<Self> {
        if raw.is_empty() {
            return Err(TunnelError::EnvelopeParse("empty request id".into()));
        }
        if raw.contains(FIELD_DELIMITER) || raw.chars().any(char::is_whitespace) {
            return Err(TunnelError::EnvelopeParse(format!(
                "illegal character in request id '{}'",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_static(raw: &'static str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub direction: Direction,
    pub request_id: RequestId,
    /// Destination authority (`host[:port]`) the egress side connects to.
    pub host: String,
    /// Base64 (no padding) of a serialized HTTP message.
    pub payload: String,
}

impl Envelope {
    /// An OUT envelope carrying an encoded request.
    pub fn request(request_id: RequestId, host: impl Into<String>, payload: String) -> Self {
        Self {
            direction: Direction::Out,
            request_id,
            host: host.into(),
            payload,
        }
    }

    /// The IN envelope answering `self`, echoing its id and host.
    pub fn reply(&self, payload: String) -> Self {
        Self {
            direction: Direction::In,
            request_id: self.request_id.clone(),
            host: self.host.clone(),
            payload,
        }
    }

    /// Render as a single transport message.
    ///
    /// Refuses anything [`Envelope::decode`] would reject or alter, so every
    /// encoded message decodes back to the same envelope.
    pub fn encode(&self) -> TunnelResult<String> {
        RequestId::parse(self.request_id.as_str())?;
        check_host(&self.host)?;
        if self.payload.contains(FIELD_DELIMITER) || self.payload.chars().any(char::is_whitespace) {
            return Err(TunnelError::EnvelopeParse(
                "payload contains the field delimiter or whitespace".into(),
            ));
        }

        Ok(format!(
            "{}{d}{}{d}{}{d}{}",
            self.direction,
            self.request_id,
            self.host,
            self.payload,
            d = FIELD_DELIMITER
        ))
    }

    /// Parse a transport message. Exactly four fields are required.
    ///
    /// Trailing whitespace appended by the chat service is ignored.
    pub fn decode(message: &str) -> TunnelResult<Self> {
        let fields: Vec<&str> = message.trim_end().split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(TunnelError::EnvelopeParse(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let direction = fields[0].parse()?;
        let request_id = RequestId::parse(fields[1])?;
        check_host(fields[2])?;

        Ok(Self {
            direction,
            request_id,
            host: fields[2].to_string(),
            payload: fields[3].to_string(),
        })
    }
}

fn check_host(host: &str) -> TunnelResult<()> {
    if host.is_empty() {
        return Err(TunnelError::EnvelopeParse("empty host".into()));
    }
    if host.contains(FIELD_DELIMITER) || host.chars().any(char::is_whitespace) {
        return Err(TunnelError::EnvelopeParse(format!(
            "illegal character in host '{}'",
            host
        )));
    }
    Ok(())
}
