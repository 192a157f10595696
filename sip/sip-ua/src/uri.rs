/// Normalize a SIP URI so it can be used as key of the call table.
///
/// Accepts plain URIs, name-addr (`"Bob" <sip:bob@example.com>`) and URIs without scheme.
/// Scheme and host are lowercased, the user part is kept as is, URI parameters and headers are
/// removed. Returns `None` if no host or user remains.
pub fn normalize(uri: &str) -> Option<String> {
    let mut uri = uri.trim();

    if let Some(start) = uri.find('<') {
        let end = uri[start..].find('>')? + start;
        uri = uri[start + 1..end].trim();
    }

    let (scheme, rest) = match uri.split_once(':') {
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("sip") || scheme.eq_ignore_ascii_case("sips") =>
        {
            (scheme.to_ascii_lowercase(), rest)
        }
        _ => (String::from("sip"), uri),
    };

    let rest = rest.split([';', '?']).next().unwrap_or_default();

    let (user, host) = match rest.rsplit_once('@') {
        Some((user, host)) => (Some(user), host),
        None => (None, rest),
    };

    let host = host.to_ascii_lowercase();

    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }

    match user {
        Some("") => None,
        Some(user) => Some(format!("{scheme}:{user}@{host}")),
        None => Some(format!("{scheme}:{host}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_uri() {
        assert_eq!(
            normalize("sip:bob@example.com").as_deref(),
            Some("sip:bob@example.com")
        );
    }

    #[test]
    fn case_of_scheme_and_host() {
        assert_eq!(
            normalize("SIP:Bob@Example.COM:5060").as_deref(),
            Some("sip:Bob@example.com:5060")
        );
        assert_eq!(
            normalize("sips:alice@HOST").as_deref(),
            Some("sips:alice@host")
        );
    }

    #[test]
    fn name_addr() {
        assert_eq!(
            normalize("\"Bob\" <sip:bob@example.com;transport=udp>;tag=1234").as_deref(),
            Some("sip:bob@example.com")
        );
        assert_eq!(normalize("<sip:bob@example.com"), None);
    }

    #[test]
    fn params_and_headers_are_removed() {
        assert_eq!(
            normalize(" sip:bob@10.0.0.1:5070;transport=tcp?subject=hi ").as_deref(),
            Some("sip:bob@10.0.0.1:5070")
        );
    }

    #[test]
    fn missing_scheme() {
        assert_eq!(
            normalize("bob@example.com").as_deref(),
            Some("sip:bob@example.com")
        );
        assert_eq!(normalize("peer").as_deref(), Some("sip:peer"));
    }

    #[test]
    fn invalid() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("sip:"), None);
        assert_eq!(normalize("sip:@example.com"), None);
        assert_eq!(normalize("sip:bob@"), None);
    }
}
