//! Probe of the host resolver configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

pub const RESOLV_CONF: &str = "/etc/resolv.conf";

const DNS_PORT: u16 = 53;

/// What the host knows about name resolution.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SystemConfig {
    pub servers: Vec<SocketAddr>,
    pub domains: Vec<String>,
    pub ndots: Option<u32>,
}

pub fn probe(path: &Path) -> std::io::Result<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content))
}

/// Parse resolv.conf content. Unknown directives and malformed values are
/// skipped; `search` and `domain` each replace the suffix list, last one
/// winning, the way libc resolvers treat them.
fn parse(content: &str) -> SystemConfig {
    let mut config = SystemConfig::default();

    for line in content.lines() {
        let line = match line.find(|c| c == '#' || c == ';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("nameserver") => {
                if let Some(addr) = tokens.next().and_then(|s| s.parse::<IpAddr>().ok()) {
                    config.servers.push(SocketAddr::new(addr, DNS_PORT));
                }
            }
            Some("search") => {
                config.domains = tokens.map(|s| s.trim_end_matches('.').to_string()).collect();
            }
            Some("domain") => {
                if let Some(domain) = tokens.next() {
                    config.domains = vec![domain.trim_end_matches('.').to_string()];
                }
            }
            Some("options") => {
                for option in tokens {
                    if let Some(value) = option.strip_prefix("ndots:") {
                        if let Ok(ndots) = value.parse() {
                            config.ndots = Some(ndots);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    config
}
