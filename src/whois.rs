use crate::{
    config::Config,
    errors::TransportError,
    tld_mappings::{known_server, suffix_candidates},
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{RwLock, Semaphore},
    time::timeout,
};
use tracing::{debug, info, warn};

const READ_CHUNK_SIZE: usize = 8192;

/// Fetches the raw whois text for a domain.
///
/// [`crate::WhoisClient`] only talks to the network through this trait, so any
/// implementation (a different protocol client, a fixture in tests) can stand in.
#[async_trait]
pub trait WhoisTransport: Send + Sync {
    async fn fetch(&self, domain: &str) -> Result<String, TransportError>;
}

/// Plain port-43 whois client.
///
/// Servers come from the built-in table first, then from IANA referrals; discovered
/// servers are remembered for the life of the transport.
pub struct TcpTransport {
    config: Arc<Config>,
    discovered_servers: RwLock<HashMap<String, String>>,
    query_semaphore: Semaphore,     // For actual domain lookups
    discovery_semaphore: Semaphore, // For IANA discovery (higher limit)
}

impl TcpTransport {
    pub fn new(config: Arc<Config>) -> Self {
        let permits = config.concurrent_whois_queries.max(1);
        info!("TcpTransport initialized with {} concurrent queries", permits);

        Self {
            config,
            discovered_servers: RwLock::new(HashMap::new()),
            query_semaphore: Semaphore::new(permits),
            discovery_semaphore: Semaphore::new(permits * 2),
        }
    }

    /// Resolve the whois server responsible for `domain`.
    pub async fn find_whois_server(&self, domain: &str) -> Result<String, TransportError> {
        let domain = domain.to_lowercase();
        let candidates = suffix_candidates(&domain);

        if let Some(server) = candidates.iter().find_map(|suffix| known_server(suffix)) {
            return Ok(server.to_string());
        }

        let tld = candidates
            .last()
            .map(|tld| tld.to_string())
            .ok_or_else(|| TransportError::NoServer(domain.clone()))?;

        {
            let servers = self.discovered_servers.read().await;
            if let Some(server) = servers.get(&tld) {
                return Ok(server.clone());
            }
        }

        match self.discover_whois_server(&tld).await {
            Some(server) => {
                info!("Discovered whois server for .{}: {}", tld, server);
                self.discovered_servers
                    .write()
                    .await
                    .insert(tld, server.clone());
                Ok(server)
            }
            None => {
                warn!("Could not discover whois server for .{}", tld);
                Err(TransportError::NoServer(tld))
            }
        }
    }

    async fn discover_whois_server(&self, tld: &str) -> Option<String> {
        let root_server = &self.config.root_whois_server;
        debug!("Asking {} for the .{} whois server", root_server, tld);

        let _permit = self.discovery_semaphore.acquire().await.ok()?;
        let response = match self
            .execute_whois_query(
                root_server,
                tld,
                Duration::from_secs(self.config.discovery_timeout_seconds),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Root query for .{} failed: {}", tld, e);
                return None;
            }
        };

        parse_root_referral(&response)
    }

    async fn raw_whois_query(&self, server: &str, query: &str) -> Result<String, TransportError> {
        let _permit = self
            .query_semaphore
            .acquire()
            .await
            .map_err(|_| TransportError::Internal("Semaphore closed".to_string()))?;

        self.execute_whois_query(
            server,
            query,
            Duration::from_secs(self.config.whois_timeout_seconds),
        )
        .await
    }

    async fn execute_whois_query(
        &self,
        server: &str,
        query: &str,
        io_timeout: Duration,
    ) -> Result<String, TransportError> {
        let mut stream = timeout(
            io_timeout,
            TcpStream::connect((server, self.config.whois_port)),
        )
        .await??;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        stream
            .write_all(format!("{}\r\n", query).as_bytes())
            .await?;

        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        let mut response = Vec::new();

        loop {
            match timeout(io_timeout, stream.read(&mut buffer)).await?? {
                0 => break, // EOF
                n => {
                    response.extend_from_slice(&buffer[..n]);
                    if response.len() > self.config.max_response_size {
                        return Err(TransportError::ResponseTooLarge);
                    }
                }
            }
        }

        // Registries answer in Latin-1 and friends; rule patterns only need the ASCII parts.
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    async fn follow_referrals(
        &self,
        initial_server: String,
        initial_data: String,
        domain: &str,
    ) -> String {
        let mut current_server = initial_server;
        let mut current_data = initial_data;

        for _ in 0..self.config.max_referrals {
            let Some(referral) = extract_referral(&current_data) else {
                break;
            };
            if referral.eq_ignore_ascii_case(&current_server) {
                break;
            }

            debug!("Following referral from {} to {}", current_server, referral);
            match self.raw_whois_query(&referral, domain).await {
                Ok(data) => {
                    current_server = referral;
                    current_data = data;
                }
                Err(e) => {
                    warn!("Failed to query referral server {}: {}", referral, e);
                    break;
                }
            }
        }

        current_data
    }
}

#[async_trait]
impl WhoisTransport for TcpTransport {
    async fn fetch(&self, domain: &str) -> Result<String, TransportError> {
        let server = self.find_whois_server(domain).await?;
        debug!("Querying {} for {}", server, domain);

        let data = self.raw_whois_query(&server, domain).await?;
        Ok(self.follow_referrals(server, data, domain).await)
    }
}

/// Whois server named by a root (IANA) answer in its `refer:` or `whois:` line.
fn parse_root_referral(data: &str) -> Option<String> {
    data.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_lowercase();
        let value = value.trim();
        ((key == "refer" || key == "whois") && !value.is_empty()).then(|| value.to_string())
    })
}

/// Referral target named in a whois response (`Registrar WHOIS Server:` or `refer:`).
fn extract_referral(data: &str) -> Option<String> {
    data.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        let key = key.trim().to_lowercase();
        let value = value.trim();

        let is_referral = (key.contains("whois") && key.contains("server")) || key == "refer";
        (is_referral && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parser::extract,
        rules::{Rule, RuleDefinition},
    };
    use std::sync::Mutex;
    use tokio::{
        io::{AsyncBufReadExt, BufReader},
        net::TcpListener,
    };

    /// Loopback whois server answering successive connections with `replies`, in order.
    /// Returns the port and the query line received on each connection.
    async fn serve(replies: Vec<Vec<u8>>) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let queries = Arc::new(Mutex::new(Vec::new()));
        let seen = queries.clone();

        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut line = String::new();
                let _ = BufReader::new(&mut socket).read_line(&mut line).await;
                seen.lock().unwrap().push(line.trim_end().to_string());
                let _ = socket.write_all(&reply).await;
                let _ = socket.shutdown().await;
            }
        });

        (port, queries)
    }

    fn local_config(port: u16) -> Config {
        Config {
            whois_port: port,
            root_whois_server: "127.0.0.1".to_string(),
            whois_timeout_seconds: 5,
            discovery_timeout_seconds: 5,
            ..Config::default()
        }
    }

    #[test]
    fn test_extract_referral() {
        let data = "Domain Name: GOOGLE.COM\r\n   Registrar WHOIS Server: whois.markmonitor.com\r\n";
        assert_eq!(
            extract_referral(data),
            Some("whois.markmonitor.com".to_string())
        );

        assert_eq!(
            extract_referral("% IANA WHOIS server\nrefer:        whois.nic.be\n"),
            Some("whois.nic.be".to_string())
        );

        assert_eq!(extract_referral("Registrar WHOIS Server:\nStatus: ok"), None);
    }

    #[test]
    fn test_parse_root_referral() {
        let iana = "% IANA WHOIS server\n\ndomain:       ZZ\n\nrefer:        whois.nic.zz\n";
        assert_eq!(parse_root_referral(iana), Some("whois.nic.zz".to_string()));

        let whois_line = "domain:       BE\nwhois:        whois.dns.be\nstatus:       ACTIVE\n";
        assert_eq!(parse_root_referral(whois_line), Some("whois.dns.be".to_string()));

        assert_eq!(parse_root_referral("refer:\nstatus: ACTIVE\n"), None);
        assert_eq!(parse_root_referral("domain: ZZ\n"), None);
    }

    #[tokio::test]
    async fn test_known_servers_resolve_without_network() {
        let transport = TcpTransport::new(Arc::new(Config::default()));

        assert_eq!(
            transport.find_whois_server("google.com").await.unwrap(),
            "whois.verisign-grs.com"
        );
        assert_eq!(
            transport.find_whois_server("bbc.co.uk").await.unwrap(),
            "whois.nic.uk"
        );
    }

    #[tokio::test]
    async fn test_no_suffix_has_no_server() {
        let transport = TcpTransport::new(Arc::new(Config::default()));

        let result = transport.find_whois_server("localhost").await;
        assert!(matches!(result, Err(TransportError::NoServer(_))));
    }

    #[tokio::test]
    async fn test_non_utf8_reply_still_reaches_rules() {
        let (port, _) = serve(vec![b"Domain: caf\xe9.be\nStatus:\tAVAILABLE\n".to_vec()]).await;
        let transport = TcpTransport::new(Arc::new(local_config(port)));

        let raw = transport
            .raw_whois_query("127.0.0.1", "cafe.be")
            .await
            .unwrap();
        assert!(raw.contains("caf\u{FFFD}.be"));

        let rule = Rule::compile(
            "be",
            &RuleDefinition {
                availability: r"(?m)^Status:\s+AVAILABLE".to_string(),
                expiration: r"Expir(?:y|ation) Date:\s*(\S+)".to_string(),
                expiration_format: "RFC3339".to_string(),
            },
        )
        .unwrap();
        assert!(extract(&raw, &rule).is_available);
    }

    #[tokio::test]
    async fn test_response_size_cap() {
        let (port, _) = serve(vec![vec![b'x'; 64]]).await;
        let transport = TcpTransport::new(Arc::new(Config {
            max_response_size: 16,
            ..local_config(port)
        }));

        let result = transport.raw_whois_query("127.0.0.1", "example.com").await;
        assert!(matches!(result, Err(TransportError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_referral_hop_limit() {
        let (port, queries) = serve(vec![
            b"Registrar WHOIS Server: localhost\n".to_vec(),
            b"Registrar WHOIS Server: 127.0.0.1\nExpiry: hop one\n".to_vec(),
            b"Expiry: hop two\n".to_vec(),
        ])
        .await;
        let transport = TcpTransport::new(Arc::new(Config {
            max_referrals: 1,
            ..local_config(port)
        }));

        let data = transport
            .raw_whois_query("127.0.0.1", "example.com")
            .await
            .unwrap();
        let data = transport
            .follow_referrals("127.0.0.1".to_string(), data, "example.com")
            .await;

        assert!(data.contains("hop one"));
        assert_eq!(queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_referral_keeps_last_good_response() {
        let mut oversized = b"Registrar WHOIS Server: 127.0.0.1\n".to_vec();
        oversized.extend(vec![b'x'; 256]);
        let (port, queries) = serve(vec![
            b"Registrar WHOIS Server: localhost\nExpiry: first\n".to_vec(),
            oversized,
        ])
        .await;
        let transport = TcpTransport::new(Arc::new(Config {
            max_referrals: 5,
            max_response_size: 128,
            ..local_config(port)
        }));

        let data = transport
            .raw_whois_query("127.0.0.1", "example.com")
            .await
            .unwrap();
        let data = transport
            .follow_referrals("127.0.0.1".to_string(), data, "example.com")
            .await;

        assert!(data.contains("Expiry: first"));
        assert_eq!(queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_discovered_server_is_remembered() {
        let (port, queries) =
            serve(vec![b"domain:       ZZ\nrefer:        whois.nic.zz\n".to_vec()]).await;
        let transport = TcpTransport::new(Arc::new(local_config(port)));

        let first = transport.find_whois_server("example.zz").await.unwrap();
        let second = transport.find_whois_server("other.ZZ").await.unwrap();

        assert_eq!(first, "whois.nic.zz");
        assert_eq!(second, "whois.nic.zz");
        assert_eq!(*queries.lock().unwrap(), vec!["zz".to_string()]);
    }
}
