// Result parser
//
// Turns the analysis service's result envelope into normalized tickets.

pub mod duration;
pub mod timestamp;

pub use duration::parse_lenient_duration;
pub use timestamp::parse_request_timestamp;

use crate::errors::ParseError;
use crate::models::{NormalizedTicket, RawResult};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

/// Key under which each container lists its tickets
pub const TICKETS_KEY: &str = "atendimentos";

/// One ticket as the analysis service writes it
#[derive(Debug, Deserialize)]
struct WireTicket {
    #[serde(default, rename = "quem_solicitou_atendimento", deserialize_with = "lenient_text")]
    requester_name: String,
    #[serde(default, rename = "email_solicitante", deserialize_with = "lenient_text")]
    requester_email: String,
    #[serde(default, rename = "quem_respondeu", deserialize_with = "lenient_text")]
    responder_name: String,
    #[serde(default, rename = "data_solicitacao", deserialize_with = "lenient_text")]
    request_date: String,
    #[serde(default, rename = "hora_primeira_mensagem", deserialize_with = "lenient_text")]
    first_message_time: String,
    #[serde(default, rename = "problema_relatado", deserialize_with = "lenient_text")]
    reported_problem: String,
    #[serde(default, rename = "categoria", deserialize_with = "lenient_text")]
    category: String,
    #[serde(default, rename = "tempo_primeira_resposta", deserialize_with = "lenient_text")]
    first_response_time: String,
    #[serde(default, rename = "tempo_total_atendimento", deserialize_with = "lenient_text")]
    total_handling_time: String,
}

/// Accept strings, numbers and booleans as text; null means empty
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected text, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<WireTicket> for NormalizedTicket {
    fn from(wire: WireTicket) -> Self {
        Self {
            requester_name: wire.requester_name,
            requester_email: wire.requester_email,
            responder_name: wire.responder_name,
            request_date_raw: wire.request_date,
            first_message_time_raw: wire.first_message_time,
            reported_problem: wire.reported_problem,
            category: wire.category,
            first_response_time_raw: wire.first_response_time,
            total_handling_time_raw: wire.total_handling_time,
        }
    }
}

/// Flatten a result envelope into tickets.
///
/// A status other than `completed` yields no tickets and no error. Containers
/// with a missing or empty ticket list are skipped. Anything that is not the
/// expected container shape is `ParseError::MalformedResult`.
#[instrument(skip(raw), fields(status = %raw.status))]
pub fn parse(raw: &RawResult) -> Result<Vec<NormalizedTicket>, ParseError> {
    if !raw.is_completed() {
        return Ok(Vec::new());
    }

    let containers = match &raw.results {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(containers)) => containers,
        Some(other) => {
            return Err(ParseError::MalformedResult(format!(
                "results must be an array of containers, found {}",
                json_kind(other)
            )))
        }
    };

    let mut tickets = Vec::new();
    for (index, container) in containers.iter().enumerate() {
        let container = container.as_object().ok_or_else(|| {
            ParseError::MalformedResult(format!(
                "container {} must be an object, found {}",
                index,
                json_kind(container)
            ))
        })?;

        let entries = match container.get(TICKETS_KEY) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(ParseError::MalformedResult(format!(
                    "container {} field '{}' must be an array, found {}",
                    index,
                    TICKETS_KEY,
                    json_kind(other)
                )))
            }
        };

        for (position, entry) in entries.iter().enumerate() {
            if !entry.is_object() {
                return Err(ParseError::MalformedResult(format!(
                    "ticket {} of container {} must be an object, found {}",
                    position,
                    index,
                    json_kind(entry)
                )));
            }

            let wire = WireTicket::deserialize(entry).map_err(|e| {
                ParseError::MalformedResult(format!(
                    "ticket {} of container {}: {}",
                    position, index, e
                ))
            })?;
            tickets.push(wire.into());
        }
    }

    tracing::debug!(count = tickets.len(), "Parsed analysis result");
    Ok(tickets)
}
