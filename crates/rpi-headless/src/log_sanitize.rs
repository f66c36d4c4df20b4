const MAX_VALUE_CHARS: usize = 128;

/// Makes a user-supplied value (SSID, path, ...) safe to put on a log line.
///
/// Control characters and bidi overrides are shown as `\u{..}` escapes so a
/// crafted SSID cannot forge log lines or reorder what the terminal shows.
pub fn sanitize_log_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_VALUE_CHARS));
    for (count, c) in input.chars().enumerate() {
        if count >= MAX_VALUE_CHARS {
            out.push_str("...");
            break;
        }
        if c.is_control() || is_format_control(c) {
            out.extend(c.escape_unicode());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_format_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_value;

    #[test]
    fn escapes_controls_and_bidi_overrides() {
        assert_eq!(sanitize_log_value("home\nnet"), "home\\u{a}net");
        assert_eq!(sanitize_log_value("a\u{1b}[31m"), "a\\u{1b}[31m");
        assert_eq!(sanitize_log_value("x\u{202e}y"), "x\\u{202e}y");
    }

    #[test]
    fn keeps_ordinary_text_and_truncates_long_values() {
        assert_eq!(sanitize_log_value("Café Wi-Fi"), "Café Wi-Fi");
        let long = "s".repeat(200);
        let got = sanitize_log_value(&long);
        assert_eq!(got.len(), 128 + 3);
        assert!(got.ends_with("..."));
    }
}
