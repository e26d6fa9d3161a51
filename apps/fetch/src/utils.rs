//! Configuration text helpers.

/// Expand `${VAR}` and `${VAR:-default}` patterns with environment values.
///
/// Unknown variables without a default are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// [`expand_env_vars`] against an arbitrary lookup.
pub fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                expr.push(c);
            }
            let (name, default) = match expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (expr.as_str(), None),
            };
            match lookup(name).filter(|value| !value.is_empty()) {
                Some(value) => result.push_str(&value),
                None => result.push_str(default.unwrap_or_default()),
            }
        } else {
            result.push(ch);
        }
    }

    result
}
