//! Typed views of PAN-OS XML API responses.
//!
//! Every query kind gets its own record type; batch commands report one
//! parse failure per offending target instead of aborting the run.

use roxmltree::{Document, Node};
use thiserror::Error;

/// Per-target failure. Captured into the batch outcome for the offending
/// target; never aborts the surrounding run.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unable to connect to host ({0})")]
    Network(String),
    #[error("authentication failed ({0})")]
    Auth(String),
    #[error("API error ({0})")]
    Api(String),
    #[error("unable to parse response ({0})")]
    Parse(String),
}

const MISSING: &str = "n/a";

/// One Panorama-managed device from `show devices all|connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firewall {
    pub hostname: String,
    pub serial: String,
    pub mgmt_ip: String,
    pub model: String,
    pub connected: String,
    pub uptime: String,
    pub sw_version: String,
}

impl Firewall {
    pub fn is_connected(&self) -> bool {
        self.connected == "yes"
    }
}

/// One logical interface from `show interface all`, with the physical
/// state joined in from the hardware table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub state: String,
    pub ip: String,
}

impl Interface {
    /// The bare IPv4 address, when the interface has one. Used by terse
    /// output, which emits addresses suitable for piping.
    pub fn ipv4(&self) -> Option<&str> {
        let addr = self.ip.split('/').next()?;
        addr.parse::<std::net::Ipv4Addr>().ok()?;
        Some(addr)
    }
}

/// Checks the `<response status=...>` envelope. PAN-OS reports API-level
/// failures inside a well-formed body, with HTTP 200 or 403.
pub fn ensure_success(xml: &str) -> Result<(), QueryError> {
    let doc = Document::parse(xml).map_err(|e| QueryError::Parse(e.to_string()))?;
    let root = doc.root_element();
    if !root.has_tag_name("response") {
        return Err(QueryError::Parse(format!(
            "expected a <response> envelope, got <{}>",
            root.tag_name().name()
        )));
    }
    match root.attribute("status") {
        Some("success") => Ok(()),
        _ => {
            let msg = error_message(root);
            if root.attribute("code") == Some("403") {
                Err(QueryError::Auth(msg))
            } else {
                Err(QueryError::Api(msg))
            }
        }
    }
}

// Error text lives under <msg>, either as direct text or <line> children.
fn error_message(root: Node) -> String {
    let text: Vec<&str> = root
        .descendants()
        .filter(|n| n.has_tag_name("msg") || n.has_tag_name("line"))
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if text.is_empty() {
        "unknown error".to_string()
    } else {
        text.join("; ")
    }
}

pub fn parse_api_key(xml: &str) -> Result<String, QueryError> {
    ensure_success(xml)?;
    let doc = Document::parse(xml).map_err(|e| QueryError::Parse(e.to_string()))?;
    doc.descendants()
        .find(|n| n.has_tag_name("key"))
        .and_then(|n| n.text())
        .map(|k| k.trim().to_string())
        .ok_or_else(|| QueryError::Parse("no <key> element in keygen response".into()))
}

/// `./result/devices/entry` records. Hostnames are lowercased; the optional
/// domain suffix is appended to hostnames that lack a dot.
pub fn parse_firewalls(xml: &str, domain_suffix: Option<&str>) -> Result<Vec<Firewall>, QueryError> {
    ensure_success(xml)?;
    let doc = Document::parse(xml).map_err(|e| QueryError::Parse(e.to_string()))?;
    let mut firewalls = Vec::new();
    for entry in doc
        .descendants()
        .filter(|n| n.has_tag_name("devices"))
        .flat_map(|n| n.children())
        .filter(|n| n.has_tag_name("entry"))
    {
        let hostname = match child_text(entry, "hostname") {
            Some(name) => qualify(&name.to_lowercase(), domain_suffix),
            None => MISSING.to_string(),
        };
        firewalls.push(Firewall {
            hostname,
            serial: field(entry, "serial"),
            mgmt_ip: field(entry, "ip-address"),
            model: field(entry, "model"),
            connected: field(entry, "connected"),
            uptime: field(entry, "uptime"),
            sw_version: field(entry, "sw-version"),
        });
    }
    Ok(firewalls)
}

fn qualify(hostname: &str, domain_suffix: Option<&str>) -> String {
    match domain_suffix {
        Some(suffix) if !hostname.contains('.') => {
            format!("{}.{}", hostname, suffix.trim_start_matches('.'))
        }
        _ => hostname.to_string(),
    }
}

/// Joins `./result/ifnet/entry` (name, ip) with `./result/hw/entry` (state).
/// Logical interfaces without a hardware entry report state `n/a`.
pub fn parse_interfaces(xml: &str) -> Result<Vec<Interface>, QueryError> {
    ensure_success(xml)?;
    let doc = Document::parse(xml).map_err(|e| QueryError::Parse(e.to_string()))?;

    let mut hw_states = std::collections::HashMap::new();
    for entry in entries_under(&doc, "hw") {
        if let (Some(name), Some(state)) = (child_text(entry, "name"), child_text(entry, "state")) {
            hw_states.insert(name.to_string(), state.to_string());
        }
    }

    let mut interfaces = Vec::new();
    for entry in entries_under(&doc, "ifnet") {
        let Some(name) = child_text(entry, "name") else {
            continue;
        };
        interfaces.push(Interface {
            state: hw_states
                .get(name)
                .cloned()
                .unwrap_or_else(|| MISSING.to_string()),
            ip: field(entry, "ip"),
            name: name.to_string(),
        });
    }
    Ok(interfaces)
}

/// Configuration queries pass the body through untouched once the envelope
/// reports success.
pub fn parse_config(xml: String) -> Result<String, QueryError> {
    ensure_success(&xml)?;
    Ok(xml)
}

fn entries_under<'a, 'i>(
    doc: &'a Document<'i>,
    parent: &'static str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    doc.descendants()
        .filter(move |n| n.has_tag_name(parent))
        .flat_map(|n| n.children())
        .filter(|n| n.has_tag_name("entry"))
}

fn child_text<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn field(node: Node, name: &str) -> String {
    child_text(node, name)
        .map(str::to_string)
        .unwrap_or_else(|| MISSING.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES: &str = r#"<response status="success"><result><devices>
        <entry name="007000001111">
            <serial>007000001111</serial>
            <hostname>FW01</hostname>
            <ip-address>10.0.0.1</ip-address>
            <model>PA-3220</model>
            <connected>yes</connected>
            <uptime>100 days, 1:02:03</uptime>
            <sw-version>10.1.6</sw-version>
        </entry>
        <entry name="007000002222">
            <serial>007000002222</serial>
            <connected>no</connected>
        </entry>
    </devices></result></response>"#;

    #[test]
    fn parses_devices_with_missing_fields() {
        let firewalls = parse_firewalls(DEVICES, None).unwrap();
        assert_eq!(firewalls.len(), 2);
        assert_eq!(firewalls[0].hostname, "fw01");
        assert_eq!(firewalls[0].mgmt_ip, "10.0.0.1");
        assert!(firewalls[0].is_connected());
        assert_eq!(firewalls[1].hostname, "n/a");
        assert_eq!(firewalls[1].model, "n/a");
        assert!(!firewalls[1].is_connected());
    }

    #[test]
    fn domain_suffix_applies_to_unqualified_hostnames_only() {
        let firewalls = parse_firewalls(DEVICES, Some("example.net")).unwrap();
        assert_eq!(firewalls[0].hostname, "fw01.example.net");

        let qualified = qualify("fw01.corp.example.net", Some("example.net"));
        assert_eq!(qualified, "fw01.corp.example.net");
    }

    #[test]
    fn parses_interfaces_and_joins_hw_state() {
        let xml = r#"<response status="success"><result>
            <hw>
                <entry><name>ethernet1/1</name><state>up</state></entry>
                <entry><name>ethernet1/2</name><state>down</state></entry>
            </hw>
            <ifnet>
                <entry><name>ethernet1/1</name><ip>192.0.2.1/24</ip></entry>
                <entry><name>ethernet1/2</name><ip>N/A</ip></entry>
                <entry><name>tunnel.1</name><ip>10.1.1.1/30</ip></entry>
            </ifnet>
        </result></response>"#;
        let interfaces = parse_interfaces(xml).unwrap();
        assert_eq!(interfaces.len(), 3);
        assert_eq!(interfaces[0].name, "ethernet1/1");
        assert_eq!(interfaces[0].state, "up");
        assert_eq!(interfaces[0].ipv4(), Some("192.0.2.1"));
        assert_eq!(interfaces[1].state, "down");
        assert_eq!(interfaces[1].ipv4(), None);
        assert_eq!(interfaces[2].state, "n/a");
    }

    #[test]
    fn api_key_is_extracted_from_keygen_response() {
        let xml = r#"<response status="success"><result><key>LUFRPT14MW5x</key></result></response>"#;
        assert_eq!(parse_api_key(xml).unwrap(), "LUFRPT14MW5x");
    }

    #[test]
    fn error_status_surfaces_the_embedded_message() {
        let xml = r#"<response status="error"><msg><line>Unknown command</line></msg></response>"#;
        let err = ensure_success(xml).unwrap_err();
        assert!(matches!(err, QueryError::Api(_)));
        assert!(err.to_string().contains("Unknown command"));
    }

    #[test]
    fn code_403_maps_to_an_auth_failure() {
        let xml = r#"<response status="error" code="403"><result><msg>Invalid credentials.</msg></result></response>"#;
        let err = ensure_success(xml).unwrap_err();
        assert!(matches!(err, QueryError::Auth(_)));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = ensure_success("<response status=\"success\">").unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));

        let err = ensure_success("not xml at all").unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }

    #[test]
    fn non_response_envelope_is_rejected() {
        let err = ensure_success("<html><body>gateway timeout</body></html>").unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }
}
