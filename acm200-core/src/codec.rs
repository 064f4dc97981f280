//! ACM200 line protocol encoding/decoding
//!
//! The control port speaks CRLF-terminated ASCII lines. Requests are the
//! [`Command`] wire text; the device answers with one of:
//!
//! ```text
//! OK <command>                      accepted
//! ERR <command> [reason...]         rejected
//! OUT<zzz> [IN<iii>|IN---] [ON|OFF|---]   zone status
//! END                               end of a STATUS listing
//! NOTIFY OUT<zzz> ...               unsolicited status push
//! ```
//!
//! Tokens missing from a status line (or given as `---`) were not reported by
//! the device; they are decoded as `None`, never as a default value.
//!
//! Both directions are pure functions: the same command always encodes to the
//! same bytes, and every byte sequence either decodes or yields
//! [`Error::MalformedFrame`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use acm200_types::{InputId, PowerState, ZoneId};

use crate::command::Command;
use crate::constants::{keywords, LINE_TERMINATOR};
use crate::error::{Error, Result};

/// Route and power of one zone as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneStatus {
    pub zone: ZoneId,
    pub input: Option<InputId>,
    pub power: Option<PowerState>,
}

impl ZoneStatus {
    pub fn new(zone: ZoneId, input: Option<InputId>, power: Option<PowerState>) -> Self {
        Self { zone, input, power }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03} ", keywords::OUTPUT, self.zone.get())?;
        match self.input {
            Some(input) => write!(f, "{}{:03} ", keywords::INPUT, input.get())?,
            None => write!(f, "{}{} ", keywords::INPUT, keywords::NOT_REPORTED)?,
        }
        match self.power {
            Some(PowerState::On) => f.write_str(keywords::ON),
            Some(PowerState::Off) => f.write_str(keywords::OFF),
            None => f.write_str(keywords::NOT_REPORTED),
        }
    }
}

/// A line that answers the command in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    /// `OK <echo>`
    Ok { echo: String },

    /// `ERR <echo> [reason]`
    Err { echo: String, reason: Option<String> },

    /// One zone's status
    Status(ZoneStatus),

    /// End of a bulk listing
    End,
}

/// Classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// Part of the reply to a request
    Reply(ReplyLine),

    /// Asynchronous status push
    Event(ZoneStatus),
}

/// Encode a command into a complete wire line
///
/// # Examples
///
/// ```
/// use acm200_core::{encode, Command};
/// use acm200_types::{InputId, ZoneId};
///
/// let cmd = Command::set_route(ZoneId::new(1).unwrap(), InputId::new(3).unwrap());
/// assert_eq!(&encode(&cmd)[..], b"OUT001FR003\r\n");
/// ```
pub fn encode(command: &Command) -> Bytes {
    let text = command.to_string();
    let mut buf = BytesMut::with_capacity(text.len() + LINE_TERMINATOR.len());
    buf.put_slice(text.as_bytes());
    buf.put_slice(LINE_TERMINATOR);
    buf.freeze()
}

/// Decode one line received from the device (terminator optional)
///
/// # Examples
///
/// ```
/// use acm200_core::{decode, DecodedMessage, ReplyLine};
///
/// let msg = decode(b"OUT002 IN004 ON").unwrap();
/// assert!(matches!(msg, DecodedMessage::Reply(ReplyLine::Status(_))));
///
/// assert!(decode(b"garbage").is_err());
/// ```
pub fn decode(frame: &[u8]) -> Result<DecodedMessage> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| Error::malformed(&String::from_utf8_lossy(frame), "not valid ASCII"))?;
    let line = text.trim();

    if line.is_empty() {
        return Err(Error::malformed(text, "empty frame"));
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    // keywords and tokens are case-insensitive; ERR reasons are kept as sent
    let head = head.to_ascii_uppercase();

    let message = match head.as_str() {
        keywords::OK => {
            if rest.is_empty() {
                return Err(Error::malformed(text, "OK without command echo"));
            }
            DecodedMessage::Reply(ReplyLine::Ok {
                echo: rest.to_ascii_uppercase(),
            })
        }
        keywords::ERR => {
            let (echo, reason) = match rest.split_once(char::is_whitespace) {
                Some((echo, reason)) => (echo, Some(reason.trim().to_string())),
                None => (rest, None),
            };
            if echo.is_empty() {
                return Err(Error::malformed(text, "ERR without command echo"));
            }
            DecodedMessage::Reply(ReplyLine::Err {
                echo: echo.to_ascii_uppercase(),
                reason: reason.filter(|r| !r.is_empty()),
            })
        }
        keywords::END if rest.is_empty() => DecodedMessage::Reply(ReplyLine::End),
        keywords::NOTIFY => {
            DecodedMessage::Event(parse_status(&rest.to_ascii_uppercase(), text)?)
        }
        _ if head.starts_with(keywords::OUTPUT) => {
            DecodedMessage::Reply(ReplyLine::Status(parse_status(&line.to_ascii_uppercase(), text)?))
        }
        _ => return Err(Error::malformed(text, "unrecognised line")),
    };

    Ok(message)
}

fn parse_status(line: &str, frame: &str) -> Result<ZoneStatus> {
    let mut tokens = line.split_whitespace();

    let zone_token = tokens
        .next()
        .ok_or_else(|| Error::malformed(frame, "missing zone"))?;
    let zone = zone_token
        .strip_prefix(keywords::OUTPUT)
        .and_then(parse_port)
        .and_then(|n| ZoneId::new(n).ok())
        .ok_or_else(|| Error::malformed(frame, "bad zone token"))?;

    let mut input = None;
    let mut power = None;

    for token in tokens {
        if let Some(value) = token.strip_prefix(keywords::INPUT) {
            // IN000 means nothing is routed, which the device reports like "not known"
            input = match value {
                keywords::NOT_REPORTED => None,
                _ => {
                    let n = parse_port(value)
                        .ok_or_else(|| Error::malformed(frame, "bad input token"))?;
                    InputId::new(n).ok()
                }
            };
            continue;
        }

        power = match token {
            keywords::ON => Some(PowerState::On),
            keywords::OFF => Some(PowerState::Off),
            keywords::NOT_REPORTED => None,
            _ => return Err(Error::malformed(frame, format!("unexpected token {:?}", token))),
        };
    }

    Ok(ZoneStatus { zone, input, power })
}

fn parse_port(digits: &str) -> Option<u16> {
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn zone(n: u16) -> ZoneId {
        ZoneId::new(n).unwrap()
    }

    fn input(n: u16) -> InputId {
        InputId::new(n).unwrap()
    }

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(&encode(&Command::QueryAllState)[..], b"STATUS\r\n");
        assert_eq!(&encode(&Command::set_power(zone(1), true))[..], b"OUT001ON\r\n");
    }

    #[test]
    fn test_decode_ack() {
        assert_eq!(
            decode(b"OK OUT001FR002\r\n").unwrap(),
            DecodedMessage::Reply(ReplyLine::Ok {
                echo: "OUT001FR002".into()
            })
        );
    }

    #[test]
    fn test_decode_nak_with_reason() {
        assert_eq!(
            decode(b"err out001fr007 No such input").unwrap(),
            DecodedMessage::Reply(ReplyLine::Err {
                echo: "OUT001FR007".into(),
                reason: Some("No such input".into()),
            })
        );
        assert_eq!(
            decode(b"ERR STATUS").unwrap(),
            DecodedMessage::Reply(ReplyLine::Err {
                echo: "STATUS".into(),
                reason: None,
            })
        );
    }

    #[test]
    fn test_decode_full_status() {
        assert_eq!(
            decode(b"OUT003 IN001 OFF").unwrap(),
            DecodedMessage::Reply(ReplyLine::Status(ZoneStatus::new(
                zone(3),
                Some(input(1)),
                Some(PowerState::Off)
            )))
        );
    }

    #[test]
    fn test_decode_partial_status() {
        // power not reported
        assert_eq!(
            decode(b"OUT002 IN004").unwrap(),
            DecodedMessage::Reply(ReplyLine::Status(ZoneStatus::new(zone(2), Some(input(4)), None)))
        );

        // nothing reported
        assert_eq!(
            decode(b"OUT002 IN--- ---").unwrap(),
            DecodedMessage::Reply(ReplyLine::Status(ZoneStatus::new(zone(2), None, None)))
        );
    }

    #[test]
    fn test_decode_unsolicited() {
        assert_eq!(
            decode(b"NOTIFY OUT005 IN002 ON").unwrap(),
            DecodedMessage::Event(ZoneStatus::new(zone(5), Some(input(2)), Some(PowerState::On)))
        );
    }

    #[test]
    fn test_decode_end_and_lowercase() {
        assert_eq!(decode(b"end").unwrap(), DecodedMessage::Reply(ReplyLine::End));
        assert!(matches!(
            decode(b"out001 in002 on").unwrap(),
            DecodedMessage::Reply(ReplyLine::Status(_))
        ));
    }

    #[test]
    fn test_decode_malformed() {
        for frame in [
            &b""[..],
            b"   ",
            b"hello",
            b"OK",
            b"OUT",
            b"OUT000 IN001",
            b"OUT001 IN01X",
            b"OUT001 IN001 MAYBE",
            b"NOTIFY",
            b"\xff\xfe",
        ] {
            assert!(
                matches!(decode(frame), Err(Error::MalformedFrame { .. })),
                "frame {:?} should be malformed",
                frame
            );
        }
    }

    #[test]
    fn test_status_display_is_decodable() {
        let status = ZoneStatus::new(zone(7), None, Some(PowerState::On));
        assert_eq!(status.to_string(), "OUT007 IN--- ON");
        assert_eq!(
            decode(status.to_string().as_bytes()).unwrap(),
            DecodedMessage::Reply(ReplyLine::Status(status))
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&frame);
        }

        #[test]
        fn encode_is_deterministic(z in 1u16..=999, i in 1u16..=999) {
            let cmd = Command::set_route(zone(z), input(i));
            prop_assert_eq!(encode(&cmd), encode(&cmd));
            prop_assert!(encode(&cmd).ends_with(LINE_TERMINATOR));
        }
    }
}
