//! Storage service XML helpers.
//!
//! Failed blob requests carry an `<Error>` document in the body:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <Error>
//!   <Code>CannotVerifyCopySource</Code>
//!   <Message>The specified blob does not exist.
//! RequestId:...</Message>
//! </Error>
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;

/// Code and message extracted from a service `<Error>` body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    /// One-line summary: `Code: first line of message`.
    pub fn summary(&self) -> String {
        let message = self.message.lines().next().unwrap_or("").trim();
        match (self.code.is_empty(), message.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.code.clone(),
            (true, false) => message.to_string(),
            (false, false) => format!("{}: {}", self.code, message),
        }
    }
}

/// Parse an `<Error>` body.  Returns `None` when the body is empty or is
/// not an error document.
pub fn parse_error(body: &str) -> Option<ServiceError> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut in_error = false;
    let mut current_tag = String::new();
    let mut error = ServiceError::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "Error" {
                    in_error = true;
                }
                current_tag = tag;
            }
            Ok(Event::Text(ref e)) => {
                if in_error {
                    let text = e.unescape().map(|t| t.to_string()).unwrap_or_default();
                    match current_tag.as_str() {
                        "Code" => error.code = text,
                        "Message" => error.message = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"Error" {
                    break;
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if !in_error || (error.code.is_empty() && error.message.is_empty()) {
        return None;
    }
    Some(error)
}
