use std::time::Duration;

pub fn format_human_elapsed(elapsed: Duration) -> String {
    let elapsed_secs = elapsed.as_secs();
    let elapsed_subsec_millis = elapsed.subsec_millis();
    if elapsed_secs >= 3600 {
        // Format as h:mm:ss
        let hours = elapsed_secs / 3600;
        let minutes = (elapsed_secs % 3600) / 60;
        let seconds = elapsed_secs % 60;
        format!("{hours}:{minutes:02}:{seconds:02}.{elapsed_subsec_millis:03} (h:mm:ss.mmm)")
    } else if elapsed_secs >= 60 {
        // Format as m:ss
        let minutes = elapsed_secs / 60;
        let seconds = elapsed_secs % 60;
        format!("{minutes}:{seconds:02}.{elapsed_subsec_millis:03} (m:ss.mmm)")
    } else {
        format!("{}.{:03} seconds", elapsed_secs, elapsed_subsec_millis)
    }
}

/// Splits `line` on whitespace, keeping `"double"` and `'single'` quoted
/// runs together (without their quotes).
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    for quote in ['\'', '"'] {
        if line.chars().filter(|&c| c == quote).count() % 2 != 0 {
            return Err(format!("\"{line}\" contains an unbalanced {quote} quote"));
        }
    }

    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' || c == '\'' {
            chars.next();
            for inner in chars.by_ref() {
                if inner == c {
                    break;
                }
                token.push(inner);
            }
        } else {
            while let Some(&inner) = chars.peek() {
                if inner.is_whitespace() {
                    break;
                }
                token.push(inner);
                chars.next();
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_human_elapsed(Duration::from_millis(1500)), "1.500 seconds");
        assert_eq!(format_human_elapsed(Duration::from_secs(61)), "1:01.000 (m:ss.mmm)");
        assert_eq!(
            format_human_elapsed(Duration::from_secs(3723)),
            "1:02:03.000 (h:mm:ss.mmm)"
        );
    }

    #[test]
    fn tokenize_plain_and_quoted() {
        assert_eq!(tokenize("dump  /tmp/x").unwrap(), vec!["dump", "/tmp/x"]);
        assert_eq!(
            tokenize("load \"/tmp/my dump\" 'a b'").unwrap(),
            vec!["load", "/tmp/my dump", "a b"]
        );
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn tokenize_rejects_unbalanced_quotes() {
        assert!(tokenize("load \"/tmp/x").is_err());
        assert!(tokenize("load '/tmp/x").is_err());
    }
}
