//! Solr XML response parsing.
//!
//! Only two values matter to the pipeline: the `responseHeader` status code
//! and, when it is non-zero, the error message.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::IndexError;

/// `/response/lst[@name='responseHeader']/int[@name='status']`
const STATUS_PATH: [&str; 3] = ["response", "lst[responseHeader]", "int[status]"];

/// `/response/lst[@name='error']/str[@name='msg']`
const MESSAGE_PATH: [&str; 3] = ["response", "lst[error]", "str[msg]"];

/// The parts of a Solr response the pipeline cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolrResponse {
    /// Status code from the response header, if present.
    pub status: Option<i64>,
    /// Error message, if present.
    pub error_message: Option<String>,
}

/// Parse a Solr XML response body.
///
/// A body that is not well-formed XML, or whose status field is not a number,
/// is a protocol error. A missing status field is not an error here; callers
/// decide what its absence means.
pub fn parse_response(body: &[u8]) -> Result<SolrResponse, IndexError> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut status_text: Option<String> = None;
    let mut message: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(IndexError::protocol(format!(
                    "Malformed response at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(Event::Start(ref start)) => path.push(element_key(start)?),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(ref text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| IndexError::protocol(format!("Malformed text: {}", e)))?;
                collect(&path, &text, &mut status_text, &mut message);
            }
            Ok(Event::CData(ref data)) => {
                let text = String::from_utf8_lossy(data);
                collect(&path, &text, &mut status_text, &mut message);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
        }
        buf.clear();
    }

    let status = match status_text {
        Some(text) => Some(text.trim().parse::<i64>().map_err(|_| {
            IndexError::protocol(format!("Non-numeric status field: {}", text))
        })?),
        None => None,
    };

    Ok(SolrResponse {
        status,
        error_message: message,
    })
}

fn collect(path: &[String], text: &str, status: &mut Option<String>, message: &mut Option<String>) {
    if path_matches(path, &STATUS_PATH) {
        status.get_or_insert_with(String::new).push_str(text);
    } else if path_matches(path, &MESSAGE_PATH) {
        message.get_or_insert_with(String::new).push_str(text);
    }
}

fn path_matches(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

/// Key an element as `tag` or `tag[name]` when it has a `name` attribute.
fn element_key(start: &BytesStart<'_>) -> Result<String, IndexError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let name = start
        .try_get_attribute("name")
        .map_err(|e| IndexError::protocol(format!("Malformed attribute: {}", e)))?;

    match name {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| IndexError::protocol(format!("Malformed attribute: {}", e)))?;
            Ok(format!("{}[{}]", tag, value))
        }
        None => Ok(tag),
    }
}
