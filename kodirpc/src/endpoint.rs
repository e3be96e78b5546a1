use url::Url;

use crate::errors::RpcError;

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_HTTPS_PORT: u16 = 443;
const RPC_PATH: &str = "jsonrpc";

/// Location of the Kodi web server.
///
/// Accepts a full URL (`http://192.168.1.10:555`, with or without a trailing
/// `/jsonrpc`) or a bare host (`192.168.1.10`, `kodi.local:8081`). A path
/// prefix in front of `/jsonrpc` is kept, for Kodi behind a reverse proxy.
/// Credentials embedded in the URL are dropped; queries and fragments are
/// rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KodiEndpoint {
    url: Url,
    port: u16,
}

impl KodiEndpoint {
    pub fn parse(input: &str) -> Result<Self, RpcError> {
        let input = input.trim();
        let invalid = || RpcError::InvalidUrl(input.to_string());

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{}", input)
        };
        let mut url = Url::parse(&with_scheme).map_err(|_| invalid())?;

        let default_port = match url.scheme() {
            "http" => DEFAULT_HTTP_PORT,
            "https" => DEFAULT_HTTPS_PORT,
            _ => return Err(invalid()),
        };
        if url.host_str().is_none_or(str::is_empty)
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(invalid());
        }

        // The parser folds the scheme's well-known port into "no port".
        let port = match url.port() {
            Some(port) => port,
            None if has_explicit_port(&with_scheme) => {
                url.port_or_known_default().ok_or_else(invalid)?
            }
            None => default_port,
        };

        let path = url.path().trim_end_matches('/');
        let prefix = path
            .strip_suffix(RPC_PATH)
            .and_then(|p| p.strip_suffix('/'))
            .unwrap_or(path)
            .to_string();
        url.set_path(&prefix);
        url.set_username("").map_err(|_| invalid())?;
        url.set_password(None).map_err(|_| invalid())?;

        Ok(Self { url, port })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host as it goes into a URL; IPv6 addresses keep their brackets.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `scheme://host:port[/prefix]` without trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.host(),
            self.port,
            self.url.path().trim_end_matches('/')
        )
    }

    pub fn rpc_url(&self) -> String {
        format!("{}/{}", self.base_url(), RPC_PATH)
    }
}

/// True when the authority of `url` spells out a port, even the scheme default.
fn has_explicit_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    match host_port.rfind(':') {
        Some(colon) => !host_port[colon..].contains(']'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let ep = KodiEndpoint::parse("http://192.168.1.10:555").unwrap();
        assert_eq!(ep.host(), "192.168.1.10");
        assert_eq!(ep.port(), 555);
        assert_eq!(ep.rpc_url(), "http://192.168.1.10:555/jsonrpc");
    }

    #[test]
    fn test_parse_defaults_and_paths() {
        assert_eq!(KodiEndpoint::parse("kodi.local").unwrap().port(), 8080);
        assert_eq!(KodiEndpoint::parse("https://kodi.example").unwrap().port(), 443);

        let ep = KodiEndpoint::parse("http://user:pw@kodi.local:8081/jsonrpc").unwrap();
        assert_eq!(ep.base_url(), "http://kodi.local:8081");

        let ep = KodiEndpoint::parse("http://[fe80::1]:8080").unwrap();
        assert_eq!(ep.host(), "[fe80::1]");
        assert_eq!(ep.rpc_url(), "http://[fe80::1]:8080/jsonrpc");

        let ep = KodiEndpoint::parse("kodi.local:8081/").unwrap();
        assert_eq!(ep.rpc_url(), "http://kodi.local:8081/jsonrpc");
    }

    #[test]
    fn test_explicit_well_known_port_is_kept() {
        let ep = KodiEndpoint::parse("http://kodi.local:80").unwrap();
        assert_eq!(ep.port(), 80);
        assert_eq!(ep.base_url(), "http://kodi.local:80");

        assert_eq!(KodiEndpoint::parse("http://[::1]").unwrap().port(), 8080);
    }

    #[test]
    fn test_reverse_proxy_prefix_is_kept() {
        let ep = KodiEndpoint::parse("https://home.example/kodi/jsonrpc").unwrap();
        assert_eq!(ep.base_url(), "https://home.example:443/kodi");
        assert_eq!(ep.rpc_url(), "https://home.example:443/kodi/jsonrpc");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(KodiEndpoint::parse("ftp://kodi").is_err());
        assert!(KodiEndpoint::parse("http://kodi:notaport").is_err());
        assert!(KodiEndpoint::parse("http://kodi:70000").is_err());
        assert!(KodiEndpoint::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_query_and_fragment() {
        assert!(matches!(
            KodiEndpoint::parse("http://kodi.local?x=1"),
            Err(RpcError::InvalidUrl(_))
        ));
        assert!(KodiEndpoint::parse("http://kodi.local#top").is_err());
        assert!(KodiEndpoint::parse("kodi.local:8080/jsonrpc?debug").is_err());
    }
}
