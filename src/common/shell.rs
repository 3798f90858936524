//! Printing commands so they can be pasted into a shell.

/// Quote `s` for a POSIX shell, leaving it bare when nothing needs escaping.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+'))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn format_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
