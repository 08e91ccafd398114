use std::collections::BTreeMap;

use aiflow_core::ToolAuth;

/// Header used for `api_key` auth without an explicit `header_key`.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Build the auth headers for a tool.
///
/// `api_key` falls back to `global_api_key` when the tool carries no key of
/// its own; no header is produced when neither exists. `oauth2` expects a
/// token that was already exchanged.
pub fn build_auth_headers(
    auth: Option<&ToolAuth>,
    global_api_key: Option<&str>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    match auth {
        None | Some(ToolAuth::None) => {}
        Some(ToolAuth::ApiKey { key, header_key }) => {
            let key = non_blank(key.as_deref()).or_else(|| non_blank(global_api_key));
            if let Some(key) = key {
                let header = non_blank(header_key.as_deref()).unwrap_or(DEFAULT_API_KEY_HEADER);
                headers.insert(header.to_string(), key.to_string());
            }
        }
        Some(ToolAuth::Bearer { token }) | Some(ToolAuth::OAuth2 { token, .. }) => {
            if let Some(token) = non_blank(token.as_deref()) {
                headers.insert("Authorization".to_string(), bearer_value(token));
            }
        }
    }

    headers
}

/// `Bearer <token>`, without doubling an existing prefix.
pub fn bearer_value(token: &str) -> String {
    let token = token.trim();
    match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => {
            format!("Bearer {}", token[7..].trim_start())
        }
        _ => format!("Bearer {token}"),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_api_key_with_explicit_header() {
        let auth = ToolAuth::ApiKey {
            key: Some("SECRET-123".into()),
            header_key: Some("X-API-Key".into()),
        };
        assert_eq!(
            build_auth_headers(Some(&auth), None),
            headers(&[("X-API-Key", "SECRET-123")])
        );
    }

    #[test]
    fn test_api_key_falls_back_to_global_key() {
        let auth = ToolAuth::ApiKey {
            key: None,
            header_key: Some("X-API-Key".into()),
        };
        assert_eq!(
            build_auth_headers(Some(&auth), Some("GLOBAL-KEY")),
            headers(&[("X-API-Key", "GLOBAL-KEY")])
        );
    }

    #[test]
    fn test_api_key_default_header_and_missing_key() {
        let auth = ToolAuth::ApiKey {
            key: Some("k".into()),
            header_key: None,
        };
        assert_eq!(
            build_auth_headers(Some(&auth), None),
            headers(&[(DEFAULT_API_KEY_HEADER, "k")])
        );

        let auth = ToolAuth::ApiKey {
            key: Some("  ".into()),
            header_key: None,
        };
        assert!(build_auth_headers(Some(&auth), None).is_empty());
    }

    #[test]
    fn test_bearer_is_not_double_prefixed() {
        let h1 = build_auth_headers(
            Some(&ToolAuth::Bearer {
                token: Some("abc123".into()),
            }),
            None,
        );
        assert_eq!(h1, headers(&[("Authorization", "Bearer abc123")]));

        let h2 = build_auth_headers(
            Some(&ToolAuth::Bearer {
                token: Some("Bearer xyz".into()),
            }),
            None,
        );
        assert_eq!(h2, headers(&[("Authorization", "Bearer xyz")]));
    }

    #[test]
    fn test_oauth2_with_ready_token() {
        let auth = ToolAuth::OAuth2 {
            token: Some("Bearer oauth_token".into()),
            client_id: None,
            client_secret: None,
            token_endpoint: None,
            scope: None,
        };
        assert_eq!(
            build_auth_headers(Some(&auth), None),
            headers(&[("Authorization", "Bearer oauth_token")])
        );
    }

    #[test]
    fn test_no_auth() {
        assert!(build_auth_headers(None, Some("GLOBAL")).is_empty());
        assert!(build_auth_headers(Some(&ToolAuth::None), Some("GLOBAL")).is_empty());
    }
}
