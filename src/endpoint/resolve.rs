use crate::models::{BackendEndpoint, EndpointSource};
use reqwest::Url;

pub const FALLBACK_BACKEND_HOST: &str = "localhost";
pub const FALLBACK_BACKEND_PORT: &str = "8080";

/// The backend endpoint in effect, with the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub endpoint: BackendEndpoint,
    pub source: EndpointSource,
}

/// Pick the backend endpoint: user override, then environment, then the
/// built-in fallback. Entries with an empty host are skipped.
pub fn resolve_backend(
    user: Option<&BackendEndpoint>,
    environment: Option<&BackendEndpoint>,
) -> ResolvedBackend {
    if let Some(endpoint) = user.filter(|e| !e.is_empty()) {
        return ResolvedBackend {
            endpoint: endpoint.clone(),
            source: EndpointSource::User,
        };
    }
    if let Some(endpoint) = environment.filter(|e| !e.is_empty()) {
        return ResolvedBackend {
            endpoint: endpoint.clone(),
            source: EndpointSource::Environment,
        };
    }
    ResolvedBackend {
        endpoint: BackendEndpoint::new(FALLBACK_BACKEND_HOST, FALLBACK_BACKEND_PORT),
        source: EndpointSource::Fallback,
    }
}

/// Build a base URL (no trailing slash) from a host/port pair.
///
/// A host that already carries a scheme keeps it. Otherwise port 443 means
/// https and anything else http. The port is left out when it is the
/// scheme's default or when the host already names one.
pub fn compose_base_url(endpoint: &BackendEndpoint) -> String {
    let host = endpoint.host.trim().trim_end_matches('/');
    let port = endpoint.port_number();

    let candidate = if host.contains("://") {
        host.to_string()
    } else if port == Some(443) {
        format!("https://{host}")
    } else {
        format!("http://{host}")
    };

    match Url::parse(&candidate) {
        Ok(mut url) => {
            if let Some(port) = port {
                if !names_port(&candidate) && url.port_or_known_default() != Some(port) {
                    let _ = url.set_port(Some(port));
                }
            }
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(err) => {
            tracing::warn!("Backend host {:?} is not a valid URL: {}", host, err);
            candidate
        }
    }
}

/// Whether the authority of `url` spells out a port. Colons inside an IPv6
/// literal do not count.
fn names_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    authority
        .rsplit_once(']')
        .map_or(authority, |(_, after)| after)
        .contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(host: &str, port: &str) -> String {
        compose_base_url(&BackendEndpoint::new(host, port))
    }

    #[test]
    fn infers_scheme_from_port() {
        assert_eq!(url("api.example.com", "443"), "https://api.example.com");
        assert_eq!(url("api.example.com", "80"), "http://api.example.com");
        assert_eq!(url("localhost", "8080"), "http://localhost:8080");
        assert_eq!(url("10.0.0.5", ""), "http://10.0.0.5");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        assert_eq!(url("https://api.example.com/", ""), "https://api.example.com");
        assert_eq!(url("https://api.example.com", "8443"), "https://api.example.com:8443");
        assert_eq!(url("http://api.example.com", "80"), "http://api.example.com");
        assert_eq!(url("http://backend:9000", "7000"), "http://backend:9000");
    }

    #[test]
    fn path_and_embedded_port_survive() {
        assert_eq!(url("gw.internal/proxy-api/", "8081"), "http://gw.internal:8081/proxy-api");
        assert_eq!(url("localhost:3000", "8080"), "http://localhost:3000");
        assert_eq!(url("[::1]", "8080"), "http://[::1]:8080");
        assert_eq!(url("[::1]:9000", "8080"), "http://[::1]:9000");
        assert_eq!(url("[fd00::5]/api", "443"), "https://[fd00::5]/api");
    }

    #[test]
    fn precedence_is_user_then_environment_then_fallback() {
        let user = BackendEndpoint::new("user.example.com", "443");
        let env = BackendEndpoint::new("env.example.com", "8000");
        let blank = BackendEndpoint::new("  ", "443");

        let resolved = resolve_backend(Some(&user), Some(&env));
        assert_eq!(resolved.source, EndpointSource::User);
        assert_eq!(resolved.endpoint, user);

        let resolved = resolve_backend(Some(&blank), Some(&env));
        assert_eq!(resolved.source, EndpointSource::Environment);

        let resolved = resolve_backend(None, None);
        assert_eq!(resolved.source, EndpointSource::Fallback);
        assert_eq!(compose_base_url(&resolved.endpoint), "http://localhost:8080");
    }
}
