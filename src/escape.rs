//! Escaping at the process and query boundary
//!
//! Every externally supplied string that reaches a command line or a query
//! string goes through one of these functions. Nothing else in the crate
//! builds such strings by hand.

/// Escape double quotes for a command-line argument (`"` becomes `\"`)
pub fn shell_input(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// Double embedded single quotes (`'` becomes `''`)
///
/// This is the escaping rule for single-quoted WQL literals.
pub fn double_single_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a single-quoted WQL literal with its content escaped
pub fn single_quoted(value: &str) -> String {
    format!("'{}'", double_single_quotes(value))
}

/// Characters PowerShell accepts as a single quote
pub const POWERSHELL_SINGLE_QUOTES: [char; 5] =
    ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Render a single-quoted PowerShell literal
///
/// PowerShell closes a single-quoted string at any of
/// [`POWERSHELL_SINGLE_QUOTES`], so each of them is doubled.
pub fn powershell_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if POWERSHELL_SINGLE_QUOTES.contains(&ch) {
            out.push(ch);
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHABET: [char; 9] = [
        'a', '\'', '"', '\\', '$', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}',
    ];

    /// Every string over `ALPHABET` up to `max_len` characters
    fn all_strings(max_len: usize) -> Vec<String> {
        let mut out = vec![String::new()];
        let mut frontier = vec![String::new()];
        for _ in 0..max_len {
            let mut next = Vec::new();
            for prefix in &frontier {
                for ch in ALPHABET {
                    let mut s = prefix.clone();
                    s.push(ch);
                    next.push(s);
                }
            }
            out.extend(next.iter().cloned());
            frontier = next;
        }
        out
    }

    /// Parse a single-quoted literal back, rejecting any unpaired quote
    fn parse_single_quoted(literal: &str) -> Option<String> {
        let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
        let mut out = String::new();
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.next() != Some('\'') {
                    return None;
                }
            }
            out.push(ch);
        }
        Some(out)
    }

    /// Parse a PowerShell single-quoted literal back, treating every
    /// single-quote variant as a delimiter
    fn parse_powershell_quoted(literal: &str) -> Option<String> {
        let is_quote = |c: char| POWERSHELL_SINGLE_QUOTES.contains(&c);
        let mut chars = literal.chars();
        if !chars.next().is_some_and(is_quote) {
            return None;
        }
        let mut out = String::new();
        while let Some(ch) = chars.next() {
            if is_quote(ch) {
                match chars.next() {
                    // closing quote must be the last character
                    None => return Some(out),
                    Some(next) if is_quote(next) => out.push(ch),
                    Some(_) => return None,
                }
            } else {
                out.push(ch);
            }
        }
        None
    }

    #[test]
    fn test_shell_input_escapes_quotes() {
        assert_eq!(shell_input(r#"Pa"ss"#), r#"Pa\"ss"#);
        assert_eq!(shell_input("plain"), "plain");
        assert_eq!(shell_input(""), "");
    }

    #[test]
    fn test_double_single_quotes() {
        assert_eq!(double_single_quotes("O'Brien"), "O''Brien");
        assert_eq!(single_quoted("Ethernet 'x'"), "'Ethernet ''x'''");
    }

    #[test]
    fn test_single_quoted_never_terminates_early() {
        for input in all_strings(4) {
            let literal = single_quoted(&input);
            assert_eq!(
                parse_single_quoted(&literal).as_deref(),
                Some(input.as_str()),
                "literal {literal:?} does not round-trip"
            );
        }
    }

    #[test]
    fn test_powershell_quoted_doubles_typographic_quotes() {
        assert_eq!(
            powershell_quoted("x\u{2019}$(calc)\u{2019}"),
            "'x\u{2019}\u{2019}$(calc)\u{2019}\u{2019}'"
        );
        assert_eq!(powershell_quoted("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_powershell_quoted_never_terminates_early() {
        for input in all_strings(4) {
            let literal = powershell_quoted(&input);
            assert_eq!(
                parse_powershell_quoted(&literal).as_deref(),
                Some(input.as_str()),
                "literal {literal:?} does not round-trip"
            );
        }
    }

    #[test]
    fn test_shell_input_quotes_always_escaped() {
        for input in all_strings(4) {
            let escaped = shell_input(&input);
            let chars: Vec<char> = escaped.chars().collect();
            for (i, ch) in chars.iter().enumerate() {
                if *ch == '"' {
                    assert!(i > 0 && chars[i - 1] == '\\', "bare quote in {escaped:?}");
                }
            }
            assert_eq!(escaped.replace("\\\"", "\""), input);
        }
    }
}
