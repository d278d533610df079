// src/core/parser.rs

//! Converts the scanner's XML report into a [`ParsedReport`].
//!
//! Two entry points share one event walker:
//! - [`parse`] is strict and is used on the final, complete output.
//! - [`parse_partial`] never fails and is used on snapshots of output that is
//!   still being written, returning whatever structure was readable so far.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::trace;

use crate::core::errors::ParseError;
use crate::core::models::{Address, OsMatch, ParsedReport, Port, RunStats, ScannerInfo};

const ROOT_ELEMENT: &str = "nmaprun";

/// Parses a complete report. Fails if the document is empty, ill-formed,
/// rooted at anything other than `<nmaprun>`, or ends with open elements.
pub fn parse(xml: &str) -> Result<ParsedReport, ParseError> {
    if xml.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut collector = Collector::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => collector.on_event(event),
            Err(e) => {
                return Err(ParseError::Malformed {
                    position: reader.error_position(),
                    message: e.to_string(),
                });
            }
        }
    }

    match collector.root.as_deref() {
        None => return Err(ParseError::Empty),
        Some(ROOT_ELEMENT) => {}
        Some(other) => return Err(ParseError::UnexpectedRoot(other.to_string())),
    }
    if !collector.stack.is_empty() {
        return Err(ParseError::Truncated {
            open_elements: collector.stack.len(),
        });
    }

    Ok(collector.into_report())
}

/// Best-effort parse of a possibly truncated report. Never fails.
pub fn parse_partial(xml: &str) -> ParsedReport {
    let mut collector = Collector::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => collector.on_event(event),
            Err(e) => {
                trace!(position = reader.error_position(), error = %e, "Partial report ends mid-document.");
                break;
            }
        }
    }

    collector.into_report()
}

#[derive(Debug, Default)]
struct HostSection {
    status: Option<String>,
    addresses: Vec<Address>,
    hostnames: Vec<String>,
    os_matches: Vec<OsMatch>,
    ports: Vec<Port>,
}

impl HostSection {
    fn first_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_ip())
            .or_else(|| self.addresses.first())
    }
}

enum Section {
    Hint,
    Primary,
    Ignored,
}

#[derive(Debug, Default)]
struct Collector {
    stack: Vec<String>,
    root: Option<String>,
    hosts_seen: usize,
    hint: HostSection,
    primary: HostSection,
    pending_port: Option<Port>,
    scanner: ScannerInfo,
    run_stats: Option<RunStats>,
}

impl Collector {
    fn on_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(e) => {
                let name = element_name(&e);
                self.on_element(&name, &e, true);
                self.stack.push(name);
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                self.on_element(&name, &e, false);
            }
            Event::End(_) => {
                if let Some(name) = self.stack.pop() {
                    if name == "port" {
                        self.flush_port();
                    }
                }
            }
            _ => {}
        }
    }

    /// Where the element currently being read belongs.
    fn section(&self) -> Section {
        for name in self.stack.iter().rev() {
            match name.as_str() {
                "hosthint" => return Section::Hint,
                "host" if self.hosts_seen == 1 => return Section::Primary,
                "host" => return Section::Ignored,
                _ => {}
            }
        }
        Section::Ignored
    }

    fn host_mut(&mut self) -> Option<&mut HostSection> {
        match self.section() {
            Section::Hint => Some(&mut self.hint),
            Section::Primary => Some(&mut self.primary),
            Section::Ignored => None,
        }
    }

    fn on_element(&mut self, name: &str, e: &BytesStart<'_>, has_children: bool) {
        if self.root.is_none() {
            self.root = Some(name.to_string());
        }

        match name {
            ROOT_ELEMENT => {
                self.scanner = ScannerInfo {
                    version: attr(e, b"version"),
                    args: attr(e, b"args"),
                    start_time: attr(e, b"start").and_then(|v| v.parse().ok()),
                };
            }
            "host" => self.hosts_seen += 1,
            "status" => {
                if let Some(host) = self.host_mut() {
                    host.status = attr(e, b"state");
                }
            }
            "address" => {
                if let (Some(addr), Some(host)) = (attr(e, b"addr"), self.host_mut()) {
                    let family = attr(e, b"addrtype").unwrap_or_default();
                    host.addresses.push(Address { addr, family });
                }
            }
            "hostname" => {
                if let (Some(hostname), Some(host)) = (attr(e, b"name"), self.host_mut()) {
                    host.hostnames.push(hostname);
                }
            }
            "osmatch" => {
                let name = attr(e, b"name");
                let accuracy = attr(e, b"accuracy").and_then(|v| v.parse::<u8>().ok());
                if let (Some(name), Some(accuracy), Some(host)) = (name, accuracy, self.host_mut()) {
                    host.os_matches.push(OsMatch { name, accuracy });
                }
            }
            "port" => self.open_port(e, has_children),
            "state" => {
                if let Some(port) = self.pending_port.as_mut() {
                    if let Some(state) = attr(e, b"state") {
                        port.state = state;
                    }
                }
            }
            "service" => {
                if let Some(port) = self.pending_port.as_mut() {
                    port.service_name = attr(e, b"name");
                    port.product = attr(e, b"product");
                    port.version = attr(e, b"version");
                }
            }
            "finished" => {
                self.run_stats = Some(RunStats {
                    elapsed_seconds: attr(e, b"elapsed").and_then(|v| v.parse().ok()),
                    summary: attr(e, b"summary"),
                    exit: attr(e, b"exit"),
                });
            }
            _ => {}
        }
    }

    fn open_port(&mut self, e: &BytesStart<'_>, has_children: bool) {
        let Some(id) = attr(e, b"portid").and_then(|v| v.parse::<u16>().ok()) else {
            return;
        };
        if !matches!(self.section(), Section::Primary) {
            return;
        }

        self.pending_port = Some(Port {
            id,
            protocol: attr(e, b"protocol").unwrap_or_default(),
            state: "unknown".to_string(),
            service_name: None,
            product: None,
            version: None,
        });
        if !has_children {
            self.flush_port();
        }
    }

    fn flush_port(&mut self) {
        if let Some(port) = self.pending_port.take() {
            self.primary.ports.push(port);
        }
    }

    fn into_report(self) -> ParsedReport {
        let address = self
            .hint
            .first_address()
            .or_else(|| self.primary.first_address())
            .cloned();
        let hostnames = if self.hint.hostnames.is_empty() {
            self.primary.hostnames
        } else {
            self.hint.hostnames
        };

        ParsedReport {
            scanner: self.scanner,
            host_status: self.primary.status.or(self.hint.status),
            address,
            addresses: self.primary.addresses,
            hostnames,
            os_matches: self.primary.os_matches,
            ports: self.primary.ports,
            run_stats: self.run_stats,
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCANME: &str = include_str!("../../tests/fixtures/scanme.xml");

    #[test]
    fn parses_complete_report() {
        let report = parse(SCANME).unwrap();

        assert_eq!(report.host_status.as_deref(), Some("up"));
        assert_eq!(
            report.address,
            Some(Address { addr: "45.33.32.156".to_string(), family: "ipv4".to_string() })
        );
        assert_eq!(report.hostnames, vec!["scanme.nmap.org".to_string()]);
        assert_eq!(report.scanner.version.as_deref(), Some("7.94"));
        assert_eq!(report.run_stats.as_ref().and_then(|r| r.elapsed_seconds), Some(18.42));

        let ports: Vec<(u16, &str, &str)> = report
            .ports
            .iter()
            .map(|p| (p.id, p.protocol.as_str(), p.state.as_str()))
            .collect();
        assert_eq!(
            ports,
            vec![(22, "tcp", "open"), (25, "tcp", "filtered"), (80, "tcp", "open"), (123, "udp", "open|filtered")]
        );
        assert_eq!(report.ports[0].service_name.as_deref(), Some("ssh"));
        assert_eq!(report.ports[0].product.as_deref(), Some("OpenSSH"));
        assert_eq!(report.best_os_match().map(|m| m.name.as_str()), Some("Linux 4.15 - 5.8"));
    }

    #[test]
    fn host_hint_address_wins_over_primary_host() {
        let xml = r#"<?xml version="1.0"?>
<nmaprun scanner="nmap" version="7.94">
  <hosthint><status state="up"/><address addr="10.0.0.9" addrtype="ipv4"/></hosthint>
  <host><status state="up"/><address addr="10.0.0.1" addrtype="ipv4"/></host>
</nmaprun>"#;
        let report = parse(xml).unwrap();
        assert_eq!(report.discovered_address(), Some("10.0.0.9"));
        assert_eq!(report.addresses[0].addr, "10.0.0.1");
    }

    #[test]
    fn primary_address_skips_mac_entries() {
        let xml = r#"<nmaprun><host>
  <address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
  <address addr="192.168.1.20" addrtype="ipv4"/>
</host></nmaprun>"#;
        let report = parse(xml).unwrap();
        assert_eq!(report.discovered_address(), Some("192.168.1.20"));
        assert_eq!(report.addresses.len(), 2);
    }

    #[test]
    fn only_first_host_is_read() {
        let xml = r#"<nmaprun>
  <host><address addr="10.0.0.1" addrtype="ipv4"/><ports><port protocol="tcp" portid="22"><state state="open"/></port></ports></host>
  <host><address addr="10.0.0.2" addrtype="ipv4"/><ports><port protocol="tcp" portid="80"><state state="open"/></port></ports></host>
</nmaprun>"#;
        let report = parse(xml).unwrap();
        assert_eq!(report.discovered_address(), Some("10.0.0.1"));
        assert_eq!(report.ports.iter().map(|p| p.id).collect::<Vec<_>>(), vec![22]);
    }

    #[test]
    fn missing_sections_yield_empty_lists() {
        let report = parse("<nmaprun><host><status state=\"down\"/></host></nmaprun>").unwrap();
        assert_eq!(report.host_status.as_deref(), Some("down"));
        assert!(report.ports.is_empty());
        assert!(report.os_matches.is_empty());
        assert!(report.hostnames.is_empty());
        assert_eq!(report.address, None);
    }

    #[test]
    fn malformed_port_entries_are_skipped() {
        let xml = r#"<nmaprun><host><ports>
  <port protocol="tcp" portid="notaport"><state state="open"/></port>
  <port protocol="tcp" portid="443"><state state="open"/></port>
</ports></host></nmaprun>"#;
        let report = parse(xml).unwrap();
        assert_eq!(report.ports.iter().map(|p| p.id).collect::<Vec<_>>(), vec![443]);
    }

    #[test]
    fn empty_final_buffer_is_a_parse_error() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("  \n"), Err(ParseError::Empty));
    }

    #[test]
    fn non_report_documents_are_rejected() {
        assert!(matches!(parse("<html><body/></html>"), Err(ParseError::UnexpectedRoot(root)) if root == "html"));
        assert!(parse("<nmaprun><host></nmaprun>").is_err());
        assert!(parse("not xml at all <<<").is_err());
    }

    #[test]
    fn truncated_final_buffer_is_an_error() {
        let cut = &SCANME[..SCANME.len() / 2];
        assert!(parse(cut).is_err());
    }

    #[test]
    fn partial_parse_never_fails() {
        for end in (0..SCANME.len()).step_by(37) {
            if SCANME.is_char_boundary(end) {
                let _ = parse_partial(&SCANME[..end]);
            }
        }
        assert_eq!(parse_partial(""), ParsedReport::default());
        assert_eq!(parse_partial("<<<>>>"), ParsedReport::default());
    }

    #[test]
    fn partial_parse_keeps_completed_ports() {
        let cut_at = SCANME.find("<port protocol=\"tcp\" portid=\"80\"").unwrap();
        let report = parse_partial(&SCANME[..cut_at]);

        assert_eq!(report.discovered_address(), Some("45.33.32.156"));
        assert_eq!(report.ports.iter().map(|p| p.id).collect::<Vec<_>>(), vec![22, 25]);
        assert_eq!(report.run_stats, None);
    }
}
