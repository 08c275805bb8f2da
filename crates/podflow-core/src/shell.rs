//! POSIX shell quoting for commands executed on the pod.

/// Quote `value` as a single POSIX shell word.
///
/// Wraps in single quotes and rewrites embedded single quotes as `'\''`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_words() {
        assert_eq!(quote("/runpod-volume/abc"), "'/runpod-volume/abc'");
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn keeps_spaces_inside_one_word() {
        assert_eq!(quote("my project"), "'my project'");
    }
}
