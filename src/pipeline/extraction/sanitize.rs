use std::sync::LazyLock;

use regex::Regex;

const SOFT_HYPHEN: char = '\u{00AD}';

/// Letter, hyphen, line break (or other whitespace), lowercase letter.
/// Latin script so umlauts and accented letters join like ASCII ones.
static HYPHEN_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\p{Latin}&&\p{L}])-\s+([\p{Latin}&&\p{Ll}])").unwrap()
});

static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").unwrap());

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean raw recognized or extracted text before code extraction.
///
/// Removes soft hyphens, rejoins words hyphenated across line breaks,
/// strips spaces before newlines, caps blank runs at one empty line and trims.
/// Idempotent: `normalize_text(&normalize_text(t)) == normalize_text(t)`.
pub fn normalize_text(raw: &str) -> String {
    let without_soft: String = raw.chars().filter(|&c| c != SOFT_HYPHEN).collect();
    let joined = join_hyphen_breaks(without_soft);
    let tightened = TRAILING_SPACE.replace_all(&joined, "\n");
    let collapsed = BLANK_RUN.replace_all(&tightened, "\n\n");
    collapsed.trim().to_string()
}

/// Repeat the hyphen join until nothing changes.
/// A single pass misses chains such as `a-\nb-\nc` because matches cannot overlap.
fn join_hyphen_breaks(mut text: String) -> String {
    while HYPHEN_BREAK.is_match(&text) {
        text = HYPHEN_BREAK.replace_all(&text, "$1$2").into_owned();
    }
    text
}

/// A text layer is "mostly empty" when fewer than `min_chars`
/// non-whitespace characters remain.
pub fn is_mostly_empty(text: &str, min_chars: usize) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() < min_chars
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_soft_hyphens() {
        assert_eq!(normalize_text("Diagnose\u{00AD}gruppe"), "Diagnosegruppe");
    }

    #[test]
    fn joins_hyphenated_line_break() {
        assert_eq!(normalize_text("Diagnose-\ngruppe SB1"), "Diagnosegruppe SB1");
        assert_eq!(normalize_text("Befund-   \n  bericht"), "Befundbericht");
    }

    #[test]
    fn joins_umlauts_and_accents() {
        assert_eq!(normalize_text("Über-\nweisung"), "Überweisung");
        assert_eq!(normalize_text("Gefä-\nße"), "Gefäße");
        assert_eq!(normalize_text("prescri-\nption médi-\ncale"), "prescription médicale");
    }

    #[test]
    fn keeps_hyphen_before_uppercase() {
        // Compound nouns keep their hyphen: the continuation starts uppercase
        assert_eq!(normalize_text("Kranken-\nKasse"), "Kranken-\nKasse");
    }

    #[test]
    fn keeps_hyphen_without_whitespace() {
        assert_eq!(normalize_text("Sars-cov"), "Sars-cov");
    }

    #[test]
    fn joins_chained_breaks() {
        assert_eq!(normalize_text("a-\nb-\nc"), "abc");
    }

    #[test]
    fn removes_trailing_spaces_before_newline() {
        assert_eq!(normalize_text("Zeile eins  \t\nZeile zwei"), "Zeile eins\nZeile zwei");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(normalize_text("eins\n\n\n\n\nzwei"), "eins\n\nzwei");
        assert_eq!(normalize_text("eins\n\nzwei"), "eins\n\nzwei");
    }

    #[test]
    fn trims_outer_whitespace() {
        assert_eq!(normalize_text("  \n Patient \n\n "), "Patient");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "   ",
            "a-\nb-\nc-\nd",
            "Diagnose-\n\n\n\ngruppe:  \n\n\n P S2 ",
            "x- -\ny",
            "Wort-\u{00AD}\nteil",
            "Ä-\nö-\nü \t \n\n\n\nEnde",
            "\r\n\r\n\r\n",
            "Gruppe - \n sb1\n \n \n \nweiter",
            "Kranken-\nKasse-\nbeitrag",
            "tab\t\t\n\n\n\n\t\t\tende   ",
        ];
        for sample in samples {
            let once = normalize_text(sample);
            let twice = normalize_text(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn mostly_empty_boundary() {
        let twenty_nine = "a".repeat(29);
        let thirty = "a".repeat(30);
        assert!(is_mostly_empty(&twenty_nine, 30));
        assert!(!is_mostly_empty(&thirty, 30));
    }

    #[test]
    fn mostly_empty_ignores_whitespace() {
        let spaced = format!("{}\n\n   \t{}", "b".repeat(15), "c".repeat(14));
        assert!(is_mostly_empty(&spaced, 30));
        assert!(is_mostly_empty("", 30));
        assert!(is_mostly_empty(" \n\t ", 30));
    }

    #[test]
    fn mostly_empty_counts_characters_not_bytes() {
        // 29 umlauts are 58 bytes but still 29 characters
        assert!(is_mostly_empty(&"ü".repeat(29), 30));
    }

    #[test]
    fn safe_file_name_replaces_unsafe_characters() {
        assert_eq!(safe_file_name("Befund März 2024.pdf"), "Befund_M_rz_2024.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(safe_file_name("scan-01_a.PNG"), "scan-01_a.PNG");
    }
}
