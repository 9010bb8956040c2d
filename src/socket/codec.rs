//! Line-oriented wire format of the socket client protocol.
//!
//! Every message is one line of whitespace-separated fields:
//! `version flag nDbl nInt nBool time v1 .. vnDbl`. Doubles are written in
//! scientific notation with 15 fractional digits. Integer and boolean
//! payloads are part of the format but never used by the host.

use crate::error::SocketError;

/// Protocol version written in every message.
pub const PROTOCOL_VERSION: i32 = 2;

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub flag: i32,
    pub time: f64,
    pub values: Vec<f64>,
}

impl Message {
    /// A data message with flag 0.
    pub fn data(time: f64, values: Vec<f64>) -> Self {
        Self {
            flag: 0,
            time,
            values,
        }
    }

    /// A control message carrying only `flag`.
    pub fn control(flag: i32) -> Self {
        Self {
            flag,
            time: 0.0,
            values: Vec::new(),
        }
    }
}

/// Encodes `msg` as one newline-terminated line.
pub fn encode(msg: &Message) -> String {
    let mut line = format!(
        "{PROTOCOL_VERSION} {} {} 0 0 {:.15e}",
        msg.flag,
        msg.values.len(),
        msg.time
    );
    for v in &msg.values {
        line.push_str(&format!(" {v:.15e}"));
    }
    line.push('\n');
    line
}

fn field<T: std::str::FromStr>(
    fields: &mut std::str::SplitWhitespace<'_>,
    what: &str,
) -> Result<T, SocketError> {
    let raw = fields
        .next()
        .ok_or_else(|| SocketError::Protocol(format!("missing {what}")))?;
    raw.parse()
        .map_err(|_| SocketError::Protocol(format!("bad {what} \"{raw}\"")))
}

/// Decodes one received line.
///
/// A line with a non-zero flag may stop after the flag; the peer is ending
/// the exchange and sends no payload.
///
/// # Errors
///
/// [`SocketError::Version`] for a different protocol version, otherwise
/// [`SocketError::Protocol`] for missing or unparsable fields.
pub fn decode(line: &str) -> Result<Message, SocketError> {
    let mut fields = line.split_whitespace();
    let version: i32 = field(&mut fields, "version")?;
    if version != PROTOCOL_VERSION {
        return Err(SocketError::Version {
            found: version,
            expected: PROTOCOL_VERSION,
        });
    }
    let flag: i32 = field(&mut fields, "flag")?;
    if flag != 0 {
        return Ok(Message::control(flag));
    }

    let n_dbl: usize = field(&mut fields, "double count")?;
    let n_int: usize = field(&mut fields, "integer count")?;
    let n_bool: usize = field(&mut fields, "boolean count")?;
    let time: f64 = field(&mut fields, "time")?;
    let values = (0..n_dbl)
        .map(|i| field::<f64>(&mut fields, &format!("double #{}", i + 1)))
        .collect::<Result<Vec<_>, _>>()?;
    for i in 0..n_int + n_bool {
        let _: i64 = field(&mut fields, &format!("integer #{}", i + 1))?;
    }
    Ok(Message { flag, time, values })
}
