//! Schema-driven command descriptors and the typed field codec.
//!
//! Commands are described by external JSON of the form
//!
//! ```json
//! {
//!   "pin": { "major": 4664, "minor": 4, "requestType": { "code": "uint16" }, "responseType": "no_response" },
//!   "deviceType": { "major": 4698, "minor": 9, "responseType": { "deviceType": "uint8", "deviceSubType": "uint8" } }
//! }
//! ```
//!
//! Field order inside `requestType` / `responseType` is the wire order. The
//! table is validated once when loaded and is read-only afterwards.

use crate::error::{MowerError, Result};
use bytes::{Buf, BufMut};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt, path::Path};
use tracing::debug;

/// Default command schema shipped with the crate
pub const DEFAULT_SCHEMA: &str = include_str!("../schema/protocol.json");

/// Sentinel response type meaning "no payload expected"
pub const NO_RESPONSE: &str = "no_response";

/// Primitive wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 1 byte
    U8,
    /// 2 bytes little-endian
    U16,
    /// 4 bytes little-endian
    U32,
    /// 1 byte, non-zero is true
    Bool,
    /// Rest of the payload, NUL-stripped; only valid as the sole field
    Ascii,
    /// Seconds since the Unix epoch, 4 bytes little-endian
    UnixTime,
}

impl FieldType {
    /// Parse a schema type name
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Schema`] for unknown type names.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "uint8" => Ok(Self::U8),
            "uint16" => Ok(Self::U16),
            "uint32" => Ok(Self::U32),
            "bool" => Ok(Self::Bool),
            "ascii" => Ok(Self::Ascii),
            "tUnixTime" => Ok(Self::UnixTime),
            other => Err(MowerError::Schema(format!("Unknown data type: {other}"))),
        }
    }

    /// Fixed wire width, `None` for the variable-length ascii type
    #[must_use]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::Bool => Some(1),
            Self::U16 => Some(2),
            Self::U32 | Self::UnixTime => Some(4),
            Self::Ascii => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::U16 => write!(f, "uint16"),
            Self::U32 => write!(f, "uint32"),
            Self::Bool => write!(f, "bool"),
            Self::Ascii => write!(f, "ascii"),
            Self::UnixTime => write!(f, "tUnixTime"),
        }
    }
}

/// A typed value read from or written to a frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `uint8`
    U8(u8),
    /// `uint16`
    U16(u16),
    /// `uint32`
    U32(u32),
    /// `bool`
    Bool(bool),
    /// `ascii`
    Ascii(String),
    /// `tUnixTime`
    UnixTime(u32),
}

impl FieldValue {
    /// Numeric view of the value; booleans map to 0/1
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(*v as u64),
            Self::U16(v) => Some(*v as u64),
            Self::U32(v) | Self::UnixTime(v) => Some(*v as u64),
            Self::Bool(v) => Some(*v as u64),
            Self::Ascii(_) => None,
        }
    }

    /// Boolean view; integers are true when non-zero
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            other => other.as_u64().map(|v| v != 0),
        }
    }

    /// String view of an ascii value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) | Self::UnixTime(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Ascii(s) => write!(f, "{s}"),
        }
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Ascii(value.to_string())
    }
}

/// Named request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, FieldValue>);

impl Params {
    /// Empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordered named values decoded from a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFields(Vec<(String, FieldValue)>);

impl ResponseFields {
    /// Value of a named field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no fields were decoded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Caller-facing decoded response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command declares no response payload
    None,
    /// Exactly one declared field, collapsed to its value
    Value(FieldValue),
    /// Zero or several declared fields
    Fields(ResponseFields),
}

impl Response {
    /// The collapsed single value, if any
    #[must_use]
    pub const fn value(&self) -> Option<&FieldValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// A named field of a multi-field response
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            Self::Fields(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Convert into the field map; `None` for non-map responses
    #[must_use]
    pub fn into_fields(self) -> Option<ResponseFields> {
        match self {
            Self::Fields(fields) => Some(fields),
            _ => None,
        }
    }
}

/// One field of a request or response layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Wire type
    pub ty: FieldType,
}

impl FieldSpec {
    /// Create a field spec
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// What a command answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// `no_response` sentinel
    NoResponse,
    /// Ordered field list
    Fields(Vec<FieldSpec>),
}

/// Immutable per-command metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    name: String,
    major: u16,
    minor: u8,
    request: Vec<FieldSpec>,
    response: ResponseShape,
}

impl CommandDescriptor {
    /// Create a validated descriptor
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Schema`] if an `ascii` field appears in the request
    /// or is not the sole response field.
    pub fn new(
        name: impl Into<String>,
        major: u16,
        minor: u8,
        request: Vec<FieldSpec>,
        response: ResponseShape,
    ) -> Result<Self> {
        let name = name.into();

        if let Some(field) = request.iter().find(|f| f.ty == FieldType::Ascii) {
            return Err(MowerError::Schema(format!(
                "Request field '{}' of command {name} cannot be ascii",
                field.name
            )));
        }
        if let ResponseShape::Fields(fields) = &response {
            if fields.len() > 1 && fields.iter().any(|f| f.ty == FieldType::Ascii) {
                return Err(MowerError::Schema(format!(
                    "Command {name}: ascii must be the only response field"
                )));
            }
        }

        Ok(Self {
            name,
            major,
            minor,
            request,
            response,
        })
    }

    /// Command name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opcode major
    #[must_use]
    pub const fn major(&self) -> u16 {
        self.major
    }

    /// Opcode minor
    #[must_use]
    pub const fn minor(&self) -> u8 {
        self.minor
    }

    /// Request field layout
    #[must_use]
    pub fn request_fields(&self) -> &[FieldSpec] {
        &self.request
    }

    /// Response layout
    #[must_use]
    pub const fn response_shape(&self) -> &ResponseShape {
        &self.response
    }

    /// Serialize named parameters in declared order
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::MissingParameter`] if a declared field is absent,
    /// or [`MowerError::Schema`] if a value does not fit its declared type.
    pub fn encode_request_fields(&self, params: &Params) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        for field in &self.request {
            let value = params
                .get(&field.name)
                .ok_or_else(|| MowerError::MissingParameter {
                    field: field.name.clone(),
                    command: self.name.clone(),
                })?;

            let number = value.as_u64().ok_or_else(|| {
                MowerError::Schema(format!(
                    "Parameter '{}' of command {} must be numeric",
                    field.name, self.name
                ))
            })?;
            let out_of_range = || {
                MowerError::Schema(format!(
                    "Value {number} does not fit {} field '{}' of command {}",
                    field.ty, field.name, self.name
                ))
            };

            match field.ty {
                FieldType::U8 => buf.put_u8(u8::try_from(number).map_err(|_| out_of_range())?),
                FieldType::Bool => buf.put_u8(u8::from(number != 0)),
                FieldType::U16 => buf.put_u16_le(u16::try_from(number).map_err(|_| out_of_range())?),
                FieldType::U32 | FieldType::UnixTime => {
                    buf.put_u32_le(u32::try_from(number).map_err(|_| out_of_range())?);
                }
                FieldType::Ascii => {
                    return Err(MowerError::Schema(format!(
                        "Cannot encode ascii request field '{}'",
                        field.name
                    )))
                }
            }
        }

        Ok(buf)
    }

    /// Decode a response payload into named values
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::LengthMismatch`] unless the payload is consumed
    /// exactly by the declared fields.
    pub fn decode_response_fields(&self, payload: &[u8]) -> Result<Response> {
        let ResponseShape::Fields(fields) = &self.response else {
            return Ok(Response::None);
        };

        let declared: usize = fields.iter().filter_map(|f| f.ty.width()).sum();
        let mut buf = payload;
        let mut values = Vec::with_capacity(fields.len());

        for field in fields {
            if let Some(width) = field.ty.width() {
                if buf.remaining() < width {
                    return Err(MowerError::LengthMismatch {
                        expected: declared,
                        actual: payload.len(),
                    });
                }
            }

            let value = match field.ty {
                FieldType::U8 => FieldValue::U8(buf.get_u8()),
                FieldType::Bool => FieldValue::Bool(buf.get_u8() != 0),
                FieldType::U16 => FieldValue::U16(buf.get_u16_le()),
                FieldType::U32 => FieldValue::U32(buf.get_u32_le()),
                FieldType::UnixTime => FieldValue::UnixTime(buf.get_u32_le()),
                FieldType::Ascii => {
                    let text = String::from_utf8_lossy(buf)
                        .trim_end_matches('\0')
                        .to_string();
                    buf.advance(buf.remaining());
                    FieldValue::Ascii(text)
                }
            };
            values.push((field.name.clone(), value));
        }

        if buf.has_remaining() {
            return Err(MowerError::LengthMismatch {
                expected: payload.len() - buf.remaining(),
                actual: payload.len(),
            });
        }

        if values.len() == 1 {
            let (_, value) = values.remove(0);
            return Ok(Response::Value(value));
        }
        Ok(Response::Fields(ResponseFields(values)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
    major: u16,
    minor: u8,
    #[serde(default)]
    request_type: Option<Map<String, Value>>,
    #[serde(default)]
    response_type: Option<RawResponseType>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponseType {
    Single(String),
    Fields(Map<String, Value>),
}

fn parse_field_map(command: &str, map: &Map<String, Value>) -> Result<Vec<FieldSpec>> {
    map.iter()
        .map(|(name, ty)| {
            let ty = ty.as_str().ok_or_else(|| {
                MowerError::Schema(format!("Field '{name}' of command {command} has a non-string type"))
            })?;
            Ok(FieldSpec::new(name.clone(), FieldType::parse(ty)?))
        })
        .collect()
}

/// Closed table of command descriptors, keyed by name
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, CommandDescriptor>,
}

impl CommandTable {
    /// Table parsed from the schema embedded in the crate
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded schema is invalid.
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(DEFAULT_SCHEMA)
    }

    /// Parse a schema from a JSON string
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Json`] for malformed JSON and [`MowerError::Schema`]
    /// for invalid field types or layouts.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: Map<String, Value> = serde_json::from_str(json)?;
        let mut table = Self::default();

        for (name, entry) in root {
            let raw: RawCommand = serde_json::from_value(entry)?;

            let request = match &raw.request_type {
                Some(map) => parse_field_map(&name, map)?,
                None => Vec::new(),
            };
            let response = match &raw.response_type {
                None => ResponseShape::NoResponse,
                Some(RawResponseType::Single(ty)) if ty == NO_RESPONSE => ResponseShape::NoResponse,
                Some(RawResponseType::Single(ty)) => {
                    ResponseShape::Fields(vec![FieldSpec::new("response", FieldType::parse(ty)?)])
                }
                Some(RawResponseType::Fields(map)) => ResponseShape::Fields(parse_field_map(&name, map)?),
            };

            let descriptor = CommandDescriptor::new(name, raw.major, raw.minor, request, response)?;
            table.insert(descriptor);
        }

        debug!("Loaded command schema with {} commands", table.len());
        Ok(table)
    }

    /// Load a schema file
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Io`] if the file cannot be read, otherwise as
    /// [`CommandTable::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Add or replace a descriptor
    pub fn insert(&mut self, descriptor: CommandDescriptor) {
        self.commands.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a command by name
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::UnknownCommand`] if the name is not in the table.
    pub fn get(&self, name: &str) -> Result<&CommandDescriptor> {
        self.commands
            .get(name)
            .ok_or_else(|| MowerError::UnknownCommand(name.to_string()))
    }

    /// Whether a command is known
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Known command names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Number of commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::payload_slice, testutil::hex};
    use proptest::prelude::*;

    fn table() -> CommandTable {
        CommandTable::embedded().unwrap()
    }

    #[test]
    fn test_embedded_schema_loads() {
        let table = table();
        for name in [
            "pin",
            "KeepAlive",
            "deviceType",
            "batteryLevel",
            "isCharging",
            "remainingChargeTime",
            "mowerState",
            "mowerActivity",
            "SetMode",
            "overrideDuration",
            "park",
            "pause",
            "resume",
        ] {
            assert!(table.contains(name), "missing {name}");
        }

        let pin = table.get("pin").unwrap();
        assert_eq!((pin.major(), pin.minor()), (4664, 4));
        assert_eq!(pin.request_fields(), &[FieldSpec::new("code", FieldType::U16)]);
        assert_eq!(pin.response_shape(), &ResponseShape::NoResponse);
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            table().get("launchRocket"),
            Err(MowerError::UnknownCommand(name)) if name == "launchRocket"
        ));
    }

    #[test]
    fn test_decode_device_type() {
        let table = table();
        let command = table.get("deviceType").unwrap();
        let frame = hex("02fd1300b63b604701e601af5a1209000002001701c803");

        let response = command.decode_response_fields(payload_slice(&frame)).unwrap();
        assert_eq!(response.field("deviceType"), Some(&FieldValue::U8(0x17)));
        assert_eq!(response.field("deviceSubType"), Some(&FieldValue::U8(0x01)));

        let fields = response.into_fields().unwrap();
        let names: Vec<&str> = fields.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["deviceType", "deviceSubType"]);
    }

    #[test]
    fn test_decode_is_charging() {
        let table = table();
        let command = table.get("isCharging").unwrap();

        let charging = hex("02fd1200b63b604701db01af0a101500000100011603");
        let response = command.decode_response_fields(payload_slice(&charging)).unwrap();
        assert_eq!(response, Response::Value(FieldValue::Bool(true)));

        let idle = hex("02fd1200b63b604701db01af0a101500000100004803");
        let response = command.decode_response_fields(payload_slice(&idle)).unwrap();
        assert_eq!(response.value().and_then(FieldValue::as_bool), Some(false));
    }

    #[test]
    fn test_decode_mower_state_and_activity() {
        let table = table();

        let state = table.get("mowerState").unwrap();
        let frame = hex("02fd1200d5e13834012301afea110200000100033a03");
        let response = state.decode_response_fields(payload_slice(&frame)).unwrap();
        assert_eq!(response, Response::Value(FieldValue::U8(3)));

        let activity = table.get("mowerActivity").unwrap();
        let frame = hex("02fd1200b33b6047010901afea110200000100026403");
        let response = activity.decode_response_fields(payload_slice(&frame)).unwrap();
        assert_eq!(response, Response::Value(FieldValue::U8(2)));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let table = table();
        let command = table.get("deviceType").unwrap();

        assert!(matches!(
            command.decode_response_fields(&[0x17]),
            Err(MowerError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            command.decode_response_fields(&[0x17, 0x01, 0x00]),
            Err(MowerError::LengthMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(matches!(
            command.decode_response_fields(&[]),
            Err(MowerError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_no_response_ignores_payload() {
        let table = table();
        let command = table.get("park").unwrap();
        assert_eq!(command.decode_response_fields(&[]).unwrap(), Response::None);
        assert_eq!(command.decode_response_fields(&[1, 2]).unwrap(), Response::None);
    }

    #[test]
    fn test_decode_ascii() {
        let command = CommandDescriptor::new(
            "name",
            1,
            1,
            vec![],
            ResponseShape::Fields(vec![FieldSpec::new("response", FieldType::Ascii)]),
        )
        .unwrap();

        let response = command.decode_response_fields(b"Rosie\0\0").unwrap();
        assert_eq!(response.value().and_then(FieldValue::as_str), Some("Rosie"));

        let response = command.decode_response_fields(&[]).unwrap();
        assert_eq!(response, Response::Value(FieldValue::Ascii(String::new())));
    }

    #[test]
    fn test_ascii_must_be_sole_field() {
        let result = CommandDescriptor::new(
            "bad",
            1,
            1,
            vec![],
            ResponseShape::Fields(vec![
                FieldSpec::new("id", FieldType::U8),
                FieldSpec::new("name", FieldType::Ascii),
            ]),
        );
        assert!(matches!(result, Err(MowerError::Schema(_))));

        let result = CommandDescriptor::new(
            "bad",
            1,
            1,
            vec![FieldSpec::new("name", FieldType::Ascii)],
            ResponseShape::NoResponse,
        );
        assert!(matches!(result, Err(MowerError::Schema(_))));
    }

    #[test]
    fn test_encode_request_fields() {
        let table = table();

        let pin = table.get("pin").unwrap();
        let bytes = pin
            .encode_request_fields(&Params::new().with("code", 7201u16))
            .unwrap();
        assert_eq!(bytes, vec![0x21, 0x1C]);

        let override_duration = table.get("overrideDuration").unwrap();
        let bytes = override_duration
            .encode_request_fields(&Params::new().with("duration", 3 * 3600u32))
            .unwrap();
        assert_eq!(bytes, vec![0x30, 0x2A, 0x00, 0x00]);

        let battery = table.get("batteryLevel").unwrap();
        assert!(battery.encode_request_fields(&Params::new()).unwrap().is_empty());
    }

    #[test]
    fn test_encode_missing_parameter() {
        let table = table();
        let pin = table.get("pin").unwrap();
        let result = pin.encode_request_fields(&Params::new().with("pin", 1u16));
        assert!(matches!(
            result,
            Err(MowerError::MissingParameter { field, command }) if field == "code" && command == "pin"
        ));
    }

    #[test]
    fn test_encode_value_out_of_range() {
        let table = table();
        let pin = table.get("pin").unwrap();
        let result = pin.encode_request_fields(&Params::new().with("code", 70_000u32));
        assert!(matches!(result, Err(MowerError::Schema(_))));

        let result = pin.encode_request_fields(&Params::new().with("code", "1234"));
        assert!(matches!(result, Err(MowerError::Schema(_))));
    }

    #[test]
    fn test_schema_rejects_unknown_type() {
        let json = r#"{"weird": {"major": 1, "minor": 2, "responseType": "float64"}}"#;
        assert!(matches!(
            CommandTable::from_json_str(json),
            Err(MowerError::Schema(_))
        ));

        let json = r#"{"weird": {"major": 1, "minor": 2, "requestType": {"a": "int7"}}}"#;
        assert!(matches!(
            CommandTable::from_json_str(json),
            Err(MowerError::Schema(_))
        ));

        assert!(matches!(
            CommandTable::from_json_str("{not json"),
            Err(MowerError::Json(_))
        ));
    }

    #[test]
    fn test_schema_preserves_field_order() {
        let json = r#"{
            "GetThing": {
                "major": 100,
                "minor": 7,
                "requestType": {"z": "uint8", "a": "uint16"},
                "responseType": {"zeta": "uint8", "alpha": "uint32", "mid": "bool"}
            }
        }"#;
        let table = CommandTable::from_json_str(json).unwrap();
        let command = table.get("GetThing").unwrap();

        let bytes = command
            .encode_request_fields(&Params::new().with("a", 0x0102u16).with("z", 9u8))
            .unwrap();
        assert_eq!(bytes, vec![9, 0x02, 0x01]);

        let response = command
            .decode_response_fields(&[5, 1, 0, 0, 0, 1])
            .unwrap()
            .into_fields()
            .unwrap();
        let names: Vec<&str> = response.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(response.get("alpha"), Some(&FieldValue::U32(1)));
        assert_eq!(response.get("mid"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_zero_field_response_is_empty_map() {
        let command =
            CommandDescriptor::new("empty", 1, 1, vec![], ResponseShape::Fields(vec![])).unwrap();
        assert_eq!(
            command.decode_response_fields(&[]).unwrap(),
            Response::Fields(ResponseFields::default())
        );
        assert!(command.decode_response_fields(&[0]).is_err());
    }

    fn decode_as(ty: FieldType, bytes: &[u8]) -> FieldValue {
        let command = CommandDescriptor::new(
            "echo",
            1,
            1,
            vec![],
            ResponseShape::Fields(vec![FieldSpec::new("v", ty)]),
        )
        .unwrap();
        command.decode_response_fields(bytes).unwrap().value().unwrap().clone()
    }

    fn encode_as(ty: FieldType, value: FieldValue) -> Vec<u8> {
        let command =
            CommandDescriptor::new("echo", 1, 1, vec![FieldSpec::new("v", ty)], ResponseShape::NoResponse)
                .unwrap();
        command
            .encode_request_fields(&Params::new().with("v", value))
            .unwrap()
    }

    proptest! {
        #[test]
        fn prop_u8_round_trip(v: u8) {
            prop_assert_eq!(decode_as(FieldType::U8, &encode_as(FieldType::U8, v.into())), FieldValue::U8(v));
        }

        #[test]
        fn prop_u16_round_trip(v: u16) {
            prop_assert_eq!(decode_as(FieldType::U16, &encode_as(FieldType::U16, v.into())), FieldValue::U16(v));
        }

        #[test]
        fn prop_u32_round_trip(v: u32) {
            prop_assert_eq!(decode_as(FieldType::U32, &encode_as(FieldType::U32, v.into())), FieldValue::U32(v));
            prop_assert_eq!(
                decode_as(FieldType::UnixTime, &encode_as(FieldType::UnixTime, FieldValue::UnixTime(v))),
                FieldValue::UnixTime(v)
            );
        }

        #[test]
        fn prop_bool_round_trip(v: bool) {
            prop_assert_eq!(decode_as(FieldType::Bool, &encode_as(FieldType::Bool, v.into())), FieldValue::Bool(v));
        }
    }
}
