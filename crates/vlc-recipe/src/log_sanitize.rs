use std::sync::LazyLock;

use regex::Regex;

const MAX_LOG_CHARS: usize = 4096;

// CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL|ST`), string commands terminated by ST,
// and any other two-byte escape.
static ESCAPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[PX^_][^\x1b]*(?:\x1b\\)?|\x1b.?",
    )
    .expect("escape pattern is valid")
});

/// Make a subprocess output line safe to print: escape sequences and control characters
/// are removed, tabs become spaces, and very long lines are truncated.
pub fn sanitize_log_line(input: &str) -> String {
    let stripped = ESCAPES.replace_all(input, "");

    let mut out = String::with_capacity(stripped.len().min(MAX_LOG_CHARS));
    let mut count = 0usize;
    for c in stripped.chars() {
        match c {
            '\t' => out.push(' '),
            c if c.is_control() || is_bidi_control(c) => continue,
            c => out.push(c),
        }
        count += 1;
        if count >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }
    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_line;

    #[test]
    fn strips_color_codes_from_compiler_output() {
        let input = "\u{1b}[01m\u{1b}[Kvlc_threads.h:42:\u{1b}[m\u{1b}[K warning";
        assert_eq!(sanitize_log_line(input), "vlc_threads.h:42: warning");
    }

    #[test]
    fn strips_osc_titles() {
        let input = "ok \u{1b}]0;make\u{7}done";
        assert_eq!(sanitize_log_line(input), "ok done");
    }

    #[test]
    fn drops_control_characters_and_expands_tabs() {
        let input = "a\tb\r\u{202e}c";
        assert_eq!(sanitize_log_line(input), "a bc");
    }

    #[test]
    fn truncates_long_lines() {
        let input = "x".repeat(5000);
        let out = sanitize_log_line(&input);
        assert!(out.ends_with("...[truncated]"));
        assert!(out.len() < 5000);
    }
}
