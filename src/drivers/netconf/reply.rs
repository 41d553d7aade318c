//! Parsing of `<rpc-reply>` documents.
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::drivers::error::{BackendError, RpcError};

/// Errors and warnings found in a reply.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct ReplyErrors {
    /// Entries with severity `error`.
    pub errors: Vec<RpcError>,
    /// Entries with severity `warning`.
    pub warnings: Vec<RpcError>,
}

#[derive(Debug, Default)]
struct Pending {
    severity: String,
    error: RpcError,
}

fn malformed(e: &quick_xml::Error) -> BackendError {
    BackendError::Protocol(format!("malformed rpc-reply: {e}"))
}

/// Collect every `<rpc-error>` in `xml`.
pub(super) fn rpc_errors(xml: &str) -> Result<ReplyErrors, BackendError> {
    let mut reader = Reader::from_str(xml);
    let mut found = ReplyErrors::default();
    let mut current: Option<Pending> = None;
    let mut leaf: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| malformed(&e))? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "rpc-error" {
                    current = Some(Pending::default());
                } else if current.is_some() {
                    leaf = Some(name);
                }
            }
            Event::Text(t) => {
                if let (Some(pending), Some(leaf)) = (current.as_mut(), leaf.as_deref()) {
                    let text = t.unescape().map_err(|e| malformed(&e))?;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match leaf {
                        "error-severity" => pending.severity = text.to_string(),
                        "error-path" => pending.error.path = Some(text.to_string()),
                        "bad-element" => pending.error.element = Some(text.to_string()),
                        "error-message" => pending.error.message = text.to_string(),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"rpc-error" {
                    if let Some(pending) = current.take() {
                        if pending.severity == "warning" {
                            found.warnings.push(pending.error);
                        } else {
                            found.errors.push(pending.error);
                        }
                    }
                }
                leaf = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

/// Text content of the first element named one of `names`, including text
/// of nested elements. `None` if no such element exists.
pub(super) fn element_text(xml: &str, names: &[&str]) -> Result<Option<String>, BackendError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(|e| malformed(&e))? {
            Event::Start(e) => {
                if depth > 0 {
                    depth += 1;
                } else if names.iter().any(|n| n.as_bytes() == e.local_name().as_ref()) {
                    depth = 1;
                }
            }
            Event::Empty(e) => {
                if depth == 0 && names.iter().any(|n| n.as_bytes() == e.local_name().as_ref()) {
                    return Ok(Some(String::new()));
                }
            }
            Event::Text(t) if depth > 0 => {
                text.push_str(&t.unescape().map_err(|e| malformed(&e))?);
            }
            Event::CData(c) if depth > 0 => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(_) if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(text));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Raw markup of the first `<configuration>` element, for XML output.
pub(super) fn configuration_xml(xml: &str) -> Option<&str> {
    let start = xml.find("<configuration")?;
    let end = xml.rfind("</configuration>")? + "</configuration>".len();
    xml.get(start..end)
}

/// Fail with the reply's errors, if any.
pub(super) fn check(xml: &str, classify: fn(Vec<RpcError>) -> BackendError) -> Result<(), BackendError> {
    let found = rpc_errors(xml)?;
    if found.errors.is_empty() {
        Ok(())
    } else {
        Err(classify(found.errors))
    }
}

/// Join error messages for errors that carry no structure worth keeping.
pub(super) fn joined(errors: &[RpcError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const LOAD_ERROR: &str = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" xmlns:junos="http://xml.juniper.net/junos/20.4R0/junos">
<load-configuration-results>
<rpc-error>
<error-type>protocol</error-type>
<error-tag>operation-failed</error-tag>
<error-severity>error</error-severity>
<error-path>[edit interfaces]</error-path>
<error-info>
<bad-element>ge-0/0/99</bad-element>
</error-info>
<error-message>
syntax error
</error-message>
</rpc-error>
<rpc-error>
<error-severity>warning</error-severity>
<error-message>statement not found</error-message>
</rpc-error>
<ok/>
</load-configuration-results>
</rpc-reply>"#;

    #[test]
    fn collects_errors_and_warnings() {
        let found = rpc_errors(LOAD_ERROR).unwrap();
        assert_eq!(found.errors.len(), 1);
        assert_eq!(
            found.errors[0],
            RpcError {
                path: Some("[edit interfaces]".to_string()),
                element: Some("ge-0/0/99".to_string()),
                message: "syntax error".to_string(),
            }
        );
        assert_eq!(found.warnings.len(), 1);
    }

    #[test]
    fn check_passes_warnings_only() {
        let reply = r#"<rpc-reply><rpc-error><error-severity>warning</error-severity><error-message>w</error-message></rpc-error><ok/></rpc-reply>"#;
        assert!(check(reply, BackendError::Rejected).is_ok());
        assert!(matches!(
            check(LOAD_ERROR, BackendError::Rejected),
            Err(BackendError::Rejected(errors)) if errors.len() == 1
        ));
    }

    #[test]
    fn extracts_diff_output() {
        let reply = "<rpc-reply><configuration-information><configuration-output>\n[edit system]\n+  host-name core0;\n</configuration-output></configuration-information></rpc-reply>";
        let text = element_text(reply, &["configuration-output"]).unwrap().unwrap();
        assert_eq!(text.trim(), "[edit system]\n+  host-name core0;");
    }

    #[test]
    fn unescapes_entities() {
        let reply = "<rpc-reply><configuration-text>description \"a &amp; b\";</configuration-text></rpc-reply>";
        let text = element_text(reply, &["configuration-text"]).unwrap().unwrap();
        assert_eq!(text, "description \"a & b\";");
    }

    #[test]
    fn empty_element_is_empty_text() {
        let reply = "<rpc-reply><configuration-information><configuration-output/></configuration-information></rpc-reply>";
        assert_eq!(
            element_text(reply, &["configuration-output"]).unwrap(),
            Some(String::new())
        );
        assert_eq!(element_text(reply, &["configuration-text"]).unwrap(), None);
    }

    #[test]
    fn slices_configuration_xml() {
        let reply = r#"<rpc-reply><configuration junos:changed-seconds="1"><system/></configuration></rpc-reply>"#;
        assert_eq!(
            configuration_xml(reply),
            Some(r#"<configuration junos:changed-seconds="1"><system/></configuration>"#)
        );
    }
}
