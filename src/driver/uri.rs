//! Connection URI parsing: `neo4j://`, `neo4j+s://`, `neo4j+ssc://`,
//! `bolt://`, `bolt+s://`, `bolt+ssc://`.

use uriparse::URI;

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 7687;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingMode {
    /// `neo4j://` — server-side routing across the cluster.
    Routed,
    /// `bolt://` — connect to exactly the host given.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    pub routing: RoutingMode,
    pub host: String,
    pub port: u16,
    pub encrypted: bool,
    /// `+ssc` trusts any certificate; `+s` verifies against system roots.
    pub trust_self_signed: bool,
}

impl ConnectionUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let parsed = URI::try_from(uri).map_err(|e| Error::SemanticError(format!("invalid connection URI: {e}")))?;
        let scheme = parsed.scheme().as_str().to_ascii_lowercase();

        let (routing, encrypted, trust_self_signed) = match scheme.as_str() {
            "neo4j" => (RoutingMode::Routed, false, false),
            "neo4j+s" => (RoutingMode::Routed, true, false),
            "neo4j+ssc" => (RoutingMode::Routed, true, true),
            "bolt" => (RoutingMode::Direct, false, false),
            "bolt+s" => (RoutingMode::Direct, true, false),
            "bolt+ssc" => (RoutingMode::Direct, true, true),
            other => return Err(Error::SemanticError(format!("unsupported URI scheme: {other}"))),
        };

        let authority = parsed
            .authority()
            .ok_or_else(|| Error::SemanticError("connection URI is missing a host".into()))?;
        let host = authority.host().to_string();
        let port = authority.port().unwrap_or(DEFAULT_PORT);

        Ok(Self { routing, host, port, encrypted, trust_self_signed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bolt() {
        let u = ConnectionUri::parse("bolt://localhost:7687").unwrap();
        assert_eq!(u.routing, RoutingMode::Direct);
        assert_eq!(u.host, "localhost");
        assert_eq!(u.port, 7687);
        assert!(!u.encrypted);
    }

    #[test]
    fn default_port_applied() {
        let u = ConnectionUri::parse("neo4j://db.example.com").unwrap();
        assert_eq!(u.port, DEFAULT_PORT);
        assert_eq!(u.routing, RoutingMode::Routed);
    }

    #[test]
    fn encrypted_schemes_set_flags() {
        let s = ConnectionUri::parse("neo4j+s://db.example.com").unwrap();
        assert!(s.encrypted && !s.trust_self_signed);

        let ssc = ConnectionUri::parse("bolt+ssc://db.example.com").unwrap();
        assert!(ssc.encrypted && ssc.trust_self_signed);
    }

    #[test]
    fn ipv6_bracketed_host() {
        let u = ConnectionUri::parse("bolt://[::1]:7687").unwrap();
        assert_eq!(u.host, "[::1]");
    }

    #[test]
    fn rejects_bolt_wire_scheme_typo() {
        assert!(ConnectionUri::parse("http://localhost:7474").is_err());
    }
}
