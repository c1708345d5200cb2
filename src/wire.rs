//! JSF partial/ajax request form and `<partial-response>` decoding.

use quick_xml::events::{BytesStart, Event};

use crate::error::WireError;
use crate::model::SessionToken;

const VIEW_STATE_FIELD: &str = "javax.faces.ViewState";

/// One state-mutating click on a server-side component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxRequest {
    pub source: String,
    pub render: String,
    pub behavior_event: &'static str,
}

impl AjaxRequest {
    /// Command links (procedure rows, "More...", "Back to Benefits View").
    pub fn action(source: impl Into<String>, render: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            render: render.into(),
            behavior_event: "action",
        }
    }

    /// Click behaviours attached to plain elements (category headers).
    pub fn click(source: impl Into<String>, render: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            render: render.into(),
            behavior_event: "click",
        }
    }

    /// Enclosing form id: the first segment of the component id.
    pub fn form(&self) -> &str {
        self.source.split(':').next().unwrap_or(&self.source)
    }

    /// Form body for the POST, stamped with the current token.
    pub fn form_fields(&self, token: &SessionToken) -> Vec<(String, String)> {
        let form = self.form();
        vec![
            (format!("{form}_SUBMIT"), "1".to_string()),
            (VIEW_STATE_FIELD.to_string(), token.as_str().to_string()),
            (
                "javax.faces.behavior.event".to_string(),
                self.behavior_event.to_string(),
            ),
            ("javax.faces.partial.event".to_string(), "click".to_string()),
            ("javax.faces.source".to_string(), self.source.clone()),
            ("javax.faces.partial.ajax".to_string(), "true".to_string()),
            ("javax.faces.partial.execute".to_string(), self.source.clone()),
            ("javax.faces.partial.render".to_string(), self.render.clone()),
            (form.to_string(), form.to_string()),
        ]
    }
}

/// Look up a field in an encoded form body.
pub fn form_value<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Token carried by a request form.
pub fn form_token(fields: &[(String, String)]) -> Option<&str> {
    form_value(fields, VIEW_STATE_FIELD)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub id: String,
    pub content: String,
}

/// Decoded `<partial-response>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialResponse {
    pub token: Option<SessionToken>,
    /// HTML fragments in document order, token update excluded.
    pub updates: Vec<Update>,
    pub error: Option<String>,
    pub redirect: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Update,
    ErrorName,
    ErrorMessage,
}

pub fn parse_partial_response(xml: &str) -> Result<PartialResponse, WireError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut response = PartialResponse::default();
    let mut seen_root = false;

    let mut capture = Capture::None;
    let mut current_id = String::new();
    let mut text = String::new();
    let mut error_name = String::new();
    let mut error_message = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| WireError::Malformed(e.to_string()))?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"partial-response" => seen_root = true,
                b"update" => {
                    current_id = attr(&e, "id")?.unwrap_or_default();
                    text.clear();
                    capture = Capture::Update;
                }
                b"error-name" => {
                    text.clear();
                    capture = Capture::ErrorName;
                }
                b"error-message" => {
                    text.clear();
                    capture = Capture::ErrorMessage;
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"partial-response" => seen_root = true,
                b"redirect" => response.redirect = attr(&e, "url")?,
                _ => {}
            },
            Event::CData(e) if capture != Capture::None => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::Text(e) if capture != Capture::None => {
                let unescaped = e
                    .unescape()
                    .map_err(|err| WireError::Malformed(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::End(e) => match e.name().as_ref() {
                b"update" => {
                    let content = std::mem::take(&mut text);
                    if current_id.contains(VIEW_STATE_FIELD) {
                        response.token = Some(SessionToken::new(content.trim()));
                    } else {
                        response.updates.push(Update {
                            id: std::mem::take(&mut current_id),
                            content,
                        });
                    }
                    capture = Capture::None;
                }
                b"error-name" => {
                    error_name = std::mem::take(&mut text).trim().to_string();
                    capture = Capture::None;
                }
                b"error-message" => {
                    error_message = std::mem::take(&mut text).trim().to_string();
                    capture = Capture::None;
                }
                b"error" => {
                    response.error = Some(match (error_name.is_empty(), error_message.is_empty()) {
                        (false, false) => format!("{error_name}: {error_message}"),
                        (false, true) => error_name.clone(),
                        _ => error_message.clone(),
                    });
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(WireError::NotPartial);
    }
    Ok(response)
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, WireError> {
    let Some(attribute) = e
        .try_get_attribute(name)
        .map_err(|err| WireError::Malformed(err.to_string()))?
    else {
        return Ok(None);
    };
    let value = attribute
        .unescape_value()
        .map_err(|err| WireError::Malformed(err.to_string()))?;
    Ok(Some(value.into_owned()))
}
