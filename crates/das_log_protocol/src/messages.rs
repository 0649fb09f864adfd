//! Log sync messages.
//!
//! Every message travels as a CBOR map. The command code is carried by the
//! connection framing, not inside the payload, so a gap-fill answer and a
//! real-time pack with identical rows are told apart by their command.

use crate::batch::LogBatch;
use crate::error::{LogError, LogResult};
use crate::kind::LogKind;
use das_codec::{from_cbor, to_cbor, CodecError, CodecResult, Decode, Encode, Value};

/// Command codes of the log sync exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Server asks an agent for the next chunk of missed history.
    LogDataRequest,
    /// Agent answers a [`Command::LogDataRequest`].
    LogData,
    /// Agent pushes real-time records.
    LogPack,
}

impl Command {
    /// Returns the numeric code.
    pub fn code(self) -> u8 {
        match self {
            Command::LogDataRequest => 0x20,
            Command::LogData => 0x21,
            Command::LogPack => 0x22,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: i64) -> LogResult<Self> {
        match code {
            0x20 => Ok(Command::LogDataRequest),
            0x21 => Ok(Command::LogData),
            0x22 => Ok(Command::LogPack),
            other => Err(LogError::UnknownCommand(other)),
        }
    }
}

fn required<'a>(value: &'a Value, name: &str) -> CodecResult<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| CodecError::invalid_structure(format!("missing {name}")))
}

fn decode_kind(value: &Value) -> LogResult<LogKind> {
    LogKind::from_code(required(value, "kind")?.expect_i64("kind")?)
}

/// Request for the next chunk of one kind's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDataRequest {
    /// Kind requested.
    pub kind: LogKind,
}

impl LogDataRequest {
    /// Creates a request.
    pub fn new(kind: LogKind) -> Self {
        Self { kind }
    }

    /// Decodes and validates a request.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CBOR or an unknown kind.
    pub fn decode_checked(bytes: &[u8]) -> LogResult<Self> {
        let value = from_cbor(bytes)?;
        Ok(Self {
            kind: decode_kind(&value)?,
        })
    }
}

impl Encode for LogDataRequest {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(&Value::map([("kind", Value::from(self.kind.code()))]))
    }
}

/// Answer to a [`LogDataRequest`]: one chunk of history.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDataAnswer {
    /// Records in this chunk, tenant not yet stamped.
    pub batch: LogBatch,
    /// Whether the agent holds more history after this chunk.
    pub more: bool,
}

impl LogDataAnswer {
    /// Creates an answer.
    pub fn new(batch: LogBatch, more: bool) -> Self {
        Self { batch, more }
    }

    /// Kind of the answered records.
    pub fn kind(&self) -> LogKind {
        self.batch.kind()
    }

    /// Decodes and validates an answer.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CBOR, an unknown kind or a bad row.
    pub fn decode_checked(bytes: &[u8]) -> LogResult<Self> {
        let value = from_cbor(bytes)?;
        let kind = decode_kind(&value)?;
        let rows = required(&value, "rows")?.expect_array("rows")?;
        let more = value.get("more").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            batch: LogBatch::from_wire_rows(kind, rows)?,
            more,
        })
    }
}

impl Encode for LogDataAnswer {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(&Value::map([
            ("kind", Value::from(self.kind().code())),
            ("rows", Value::Array(self.batch.wire_rows())),
            ("more", Value::Bool(self.more)),
        ]))
    }
}

/// Real-time records pushed by an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LogPack {
    /// Records pushed, tenant not yet stamped.
    pub batch: LogBatch,
}

impl LogPack {
    /// Creates a pack.
    pub fn new(batch: LogBatch) -> Self {
        Self { batch }
    }

    /// Kind of the pushed records.
    pub fn kind(&self) -> LogKind {
        self.batch.kind()
    }

    /// Decodes and validates a pack.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CBOR, an unknown kind or a bad row.
    pub fn decode_checked(bytes: &[u8]) -> LogResult<Self> {
        let value = from_cbor(bytes)?;
        let kind = decode_kind(&value)?;
        let rows = required(&value, "rows")?.expect_array("rows")?;
        Ok(Self {
            batch: LogBatch::from_wire_rows(kind, rows)?,
        })
    }
}

impl Encode for LogPack {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(&Value::map([
            ("kind", Value::from(self.kind().code())),
            ("rows", Value::Array(self.batch.wire_rows())),
        ]))
    }
}

/// Acknowledgment of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogAck {
    /// Command being acknowledged.
    pub command: Command,
    /// Message id being acknowledged.
    pub msg_id: u64,
}

impl Encode for LogAck {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let msg_id = i64::try_from(self.msg_id).map_err(|_| CodecError::IntegerOverflow)?;
        to_cbor(&Value::map([
            ("command", Value::from(self.command.code())),
            ("msg_id", Value::Integer(msg_id)),
        ]))
    }
}

impl Decode for LogAck {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let value = from_cbor(bytes)?;
        let code = required(&value, "command")?.expect_i64("command")?;
        let command = Command::from_code(code)
            .map_err(|_| CodecError::invalid_structure(format!("unknown command {code}")))?;
        let msg_id = required(&value, "msg_id")?.expect_i64("msg_id")?;
        Ok(Self {
            command,
            msg_id: u64::try_from(msg_id).map_err(|_| CodecError::IntegerOverflow)?,
        })
    }
}

/// Any log sync message, with the command taken from the framing.
#[derive(Debug, Clone, PartialEq)]
pub enum LogMessage {
    /// History request.
    Request(LogDataRequest),
    /// History answer.
    Data(LogDataAnswer),
    /// Real-time push.
    Pack(LogPack),
}

impl LogMessage {
    /// Command carrying this message.
    pub fn command(&self) -> Command {
        match self {
            LogMessage::Request(_) => Command::LogDataRequest,
            LogMessage::Data(_) => Command::LogData,
            LogMessage::Pack(_) => Command::LogPack,
        }
    }

    /// Kind the message concerns.
    pub fn kind(&self) -> LogKind {
        match self {
            LogMessage::Request(request) => request.kind,
            LogMessage::Data(answer) => answer.kind(),
            LogMessage::Pack(pack) => pack.kind(),
        }
    }

    /// Decodes a payload framed with `command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode as that command.
    pub fn decode(command: Command, payload: &[u8]) -> LogResult<Self> {
        Ok(match command {
            Command::LogDataRequest => LogMessage::Request(LogDataRequest::decode_checked(payload)?),
            Command::LogData => LogMessage::Data(LogDataAnswer::decode_checked(payload)?),
            Command::LogPack => LogMessage::Pack(LogPack::decode_checked(payload)?),
        })
    }

    /// Encodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        match self {
            LogMessage::Request(request) => request.encode(),
            LogMessage::Data(answer) => answer.encode(),
            LogMessage::Pack(pack) => pack.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogHeader, LogParam, LogRecord, LogStatus};

    fn params() -> LogBatch {
        LogBatch::Param(vec![
            LogParam::new(LogHeader::new(100).with_scheme(5), 1, 2, "on"),
            LogParam::new(LogHeader::new(200).with_scheme(5), 1, 3, "42.5"),
        ])
    }

    #[test]
    fn request_roundtrip() {
        let request = LogDataRequest::new(LogKind::Status);
        let bytes = request.encode().unwrap();
        assert_eq!(LogDataRequest::decode_checked(&bytes).unwrap(), request);
    }

    #[test]
    fn answer_drops_tenant_on_the_wire() {
        let answer = LogDataAnswer::new(params(), true);
        let bytes = answer.encode().unwrap();

        let decoded = LogDataAnswer::decode_checked(&bytes).unwrap();
        assert!(decoded.more);
        assert_eq!(decoded.kind(), LogKind::Param);
        let records = LogParam::from_batch(decoded.batch).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.header.scheme_id == 0));
        assert_eq!(records[1].value, "42.5");
    }

    #[test]
    fn pack_with_unknown_kind_is_rejected() {
        let bytes = to_cbor(&Value::map([
            ("kind", Value::Integer(99)),
            ("rows", Value::Array(vec![])),
        ]))
        .unwrap();
        assert_eq!(
            LogPack::decode_checked(&bytes).unwrap_err(),
            LogError::UnknownKind(99)
        );
    }

    #[test]
    fn missing_rows_is_rejected() {
        let bytes = to_cbor(&Value::map([("kind", Value::Integer(4))])).unwrap();
        assert!(matches!(
            LogPack::decode_checked(&bytes),
            Err(LogError::Codec(_))
        ));
    }

    #[test]
    fn message_dispatch_by_command() {
        let pack = LogPack::new(LogBatch::Status(vec![LogStatus::cleared(LogHeader::new(1), 2, 3)]));
        let bytes = pack.encode().unwrap();

        let message = LogMessage::decode(Command::LogPack, &bytes).unwrap();
        assert_eq!(message.command(), Command::LogPack);
        assert_eq!(message.kind(), LogKind::Status);

        // same payload framed as a request lacks nothing a request needs
        let as_request = LogMessage::decode(Command::LogDataRequest, &bytes).unwrap();
        assert_eq!(as_request.kind(), LogKind::Status);
    }

    #[test]
    fn ack_roundtrip() {
        let ack = LogAck {
            command: Command::LogData,
            msg_id: 77,
        };
        let bytes = ack.encode().unwrap();
        assert_eq!(LogAck::decode(&bytes).unwrap(), ack);
    }

    #[test]
    fn command_codes() {
        for command in [Command::LogDataRequest, Command::LogData, Command::LogPack] {
            assert_eq!(Command::from_code(i64::from(command.code())).unwrap(), command);
        }
        assert_eq!(Command::from_code(1), Err(LogError::UnknownCommand(1)));
    }
}
