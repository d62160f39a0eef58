/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// Validates connection tokens. An unset token allows every connection.
pub struct Authenticator {
    token: Option<String>,
}

impl Authenticator {
    pub fn new(token: &str) -> Self {
        Self {
            token: if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            },
        }
    }

    /// Check the token from the `?token=` query parameter or the
    /// `Authorization` header (with or without a `Bearer ` prefix).
    pub fn check(&self, query_token: Option<&str>, authorization: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };

        let provided = match query_token.filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => {
                let header = authorization.unwrap_or("");
                header.strip_prefix("Bearer ").unwrap_or(header)
            },
        };
        safe_equal(provided, expected)
    }
}
