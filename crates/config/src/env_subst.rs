/// Replace `${ENV_VAR}` and `${ENV_VAR:default}` placeholders in raw config
/// text before parsing.
///
/// Unresolvable variables without a default are left as-is.
pub fn substitute_env(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut inner = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                inner.push(c);
            }
            if closed && !inner.is_empty() {
                let (name, default) = match inner.split_once(':') {
                    Some((n, d)) => (n, Some(d)),
                    None => (inner.as_str(), None),
                };
                match std::env::var(name) {
                    Ok(val) => result.push_str(&val),
                    Err(_) => match default {
                        Some(d) => result.push_str(d),
                        None => {
                            // Leave unresolved placeholder as-is.
                            result.push_str("${");
                            result.push_str(&inner);
                            result.push('}');
                        },
                    },
                }
            } else {
                // Malformed — emit literal.
                result.push_str("${");
                result.push_str(&inner);
            }
        } else {
            result.push(ch);
        }
    }

    result
}
