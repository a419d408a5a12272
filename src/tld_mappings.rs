use once_cell::sync::Lazy;
use std::collections::HashMap;

// Registries we already know, so common lookups skip the IANA round trip.
const KNOWN_WHOIS_SERVERS: &[(&str, &str)] = &[
    // gTLDs
    ("com", "whois.verisign-grs.com"),
    ("net", "whois.verisign-grs.com"),
    ("org", "whois.pir.org"),
    ("info", "whois.nic.info"),
    ("biz", "whois.nic.biz"),
    ("name", "whois.nic.name"),
    ("xyz", "whois.nic.xyz"),
    ("app", "whois.nic.google"),
    ("dev", "whois.nic.google"),
    // European ccTLDs
    ("uk", "whois.nic.uk"),
    ("co.uk", "whois.nic.uk"),
    ("de", "whois.denic.de"),
    ("fr", "whois.nic.fr"),
    ("it", "whois.nic.it"),
    ("nl", "whois.domain-registry.nl"),
    ("be", "whois.dns.be"),
    ("ch", "whois.nic.ch"),
    ("at", "whois.nic.at"),
    ("se", "whois.iis.se"),
    ("no", "whois.norid.no"),
    ("dk", "whois.punktum.dk"),
    ("pl", "whois.dns.pl"),
    ("eu", "whois.eu"),
    // Elsewhere
    ("us", "whois.nic.us"),
    ("ca", "whois.cira.ca"),
    ("au", "whois.auda.org.au"),
    ("jp", "whois.jprs.jp"),
    ("io", "whois.nic.io"),
    ("co", "whois.nic.co"),
];

static KNOWN_SERVERS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| KNOWN_WHOIS_SERVERS.iter().copied().collect());

/// Whois server for an exact suffix, if it is one we ship.
pub fn known_server(suffix: &str) -> Option<&'static str> {
    KNOWN_SERVERS.get(suffix).copied()
}

/// Candidate suffixes for `domain`, longest first: `a.b.co.uk` gives `b.co.uk`, `co.uk`, `uk`.
pub fn suffix_candidates(domain: &str) -> Vec<&str> {
    let domain = domain.trim_end_matches('.');
    domain
        .match_indices('.')
        .map(|(i, _)| &domain[i + 1..])
        .filter(|s| !s.is_empty())
        .collect()
}
