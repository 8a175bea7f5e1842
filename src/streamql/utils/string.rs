//! String helpers for projection-argument extraction.

/// Check whether the parentheses in `s` are balanced.
///
/// A closing parenthesis with no matching opener fails immediately; the
/// string is balanced only when every opener has been closed by the end.
pub fn is_balanced(s: &str) -> bool {
    let mut balance = 0i32;
    for ch in s.chars() {
        match ch {
            '(' => balance += 1,
            ')' => balance -= 1,
            _ => {}
        }
        if balance < 0 {
            return false;
        }
    }
    balance == 0
}

/// Split an argument list on commas, keeping commas that sit inside
/// parentheses with their argument.
///
/// Each returned argument is trimmed, and a surrounding pair of single
/// quotes is stripped.
pub fn split_args(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut start = 0usize;

    for (i, ch) in s.char_indices() {
        if ch == ',' && is_balanced(&s[start..i]) {
            result.push(s[start..i].to_string());
            start = i + 1;
        }
    }
    if start < s.len() {
        result.push(s[start..].to_string());
    }

    result
        .into_iter()
        .map(|arg| strip_quotes(arg.trim()).to_string())
        .collect()
}

/// Strip one surrounding pair of single quotes, if present.
pub fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_check() {
        let cases = [
            ("avg(temperature/10)", true),
            ("format_time(window_start(avg,", false),
            ("cast(temperature,  'bigint') as big_temp", true),
            ("lag(temperature) OVER (PARTITION BY deviceId)", true),
            ("a)b(", false),
        ];
        for (expr, expected) in cases {
            assert_eq!(is_balanced(expr), expected, "expr: {}", expr);
        }
    }

    #[test]
    fn test_split_args() {
        let cases: [(&str, &[&str]); 3] = [
            ("temperature/10", &["temperature/10"]),
            (
                " window_start(avg, 'bigint'), 'YYYY-MM-dd HH:mm:ss' ",
                &["window_start(avg, 'bigint')", "YYYY-MM-dd HH:mm:ss"],
            ),
            ("temperature,  'bigint' ", &["temperature", "bigint"]),
        ];
        for (input, expected) in cases {
            assert_eq!(split_args(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'aa'"), "aa");
        assert_eq!(strip_quotes("aa"), "aa");
        assert_eq!(strip_quotes("'"), "'");
    }
}
