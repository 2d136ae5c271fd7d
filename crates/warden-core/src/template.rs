//! Closed token grammar for identity-derived condition values
//!
//! Rule conditions may embed tokens of the form `{{identity.id}}`,
//! `{{identity.username}}`, `{{identity.metadata.<key>}}`, or
//! `{{identity.auth.<key>}}`. The grammar is closed: any other token is
//! rejected when the rule set is validated, so there is no ambient
//! "missing key" behavior to reason about at evaluation time.

const TOKEN_OPEN: &str = "{{";
const TOKEN_CLOSE: &str = "}}";

/// Token referencing the resolved principal's id
pub const TOKEN_IDENTITY_ID: &str = "identity.id";
/// Token referencing the resolved principal's username
pub const TOKEN_IDENTITY_USERNAME: &str = "identity.username";
/// Prefix for tokens referencing principal metadata entries
pub const TOKEN_METADATA_PREFIX: &str = "identity.metadata.";
/// Prefix for tokens referencing auth-session claims
pub const TOKEN_AUTH_PREFIX: &str = "identity.auth.";

/// Whether the value embeds at least one template token
pub fn has_tokens(value: &str) -> bool {
    !tokens(value).is_empty()
}

/// Extract the inner text of every `{{...}}` token in the value, in order.
pub fn tokens(value: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find(TOKEN_OPEN) {
        let after = &rest[open + TOKEN_OPEN.len()..];
        match after.find(TOKEN_CLOSE) {
            Some(close) => {
                found.push(after[..close].trim());
                rest = &after[close + TOKEN_CLOSE.len()..];
            }
            None => break,
        }
    }
    found
}

/// Whether a token belongs to the closed grammar
pub fn is_known_token(token: &str) -> bool {
    if token == TOKEN_IDENTITY_ID || token == TOKEN_IDENTITY_USERNAME {
        return true;
    }
    for prefix in [TOKEN_METADATA_PREFIX, TOKEN_AUTH_PREFIX] {
        if let Some(key) = token.strip_prefix(prefix) {
            return !key.is_empty();
        }
    }
    false
}

/// Substitute every token the resolver can answer, leaving unresolved
/// tokens in place as the fail-closed sentinel.
pub fn render<F>(value: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open) = rest.find(TOKEN_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + TOKEN_OPEN.len()..];
        match after.find(TOKEN_CLOSE) {
            Some(close) => {
                let token = after[..close].trim();
                match resolve(token) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push_str(TOKEN_OPEN);
                        out.push_str(token);
                        out.push_str(TOKEN_CLOSE);
                    }
                }
                rest = &after[close + TOKEN_CLOSE.len()..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
