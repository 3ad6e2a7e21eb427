//! Diagnosis-group code extraction from noisy OCR or text-layer output.
//!
//! Stages, first hit wins:
//! 1. Anchored: marker word ("gruppe"), up to 10 separators, 1-3 letters,
//!    optional space, 1-2 digits.
//! 2. Anchored, tolerant spacing: `P S 2` style runs after the marker.
//! 3. Token scan: any 2-6 character alphanumeric token that normalizes
//!    to an allowed code.
//! 4. Fuzzy: Levenshtein distance <= 1 between a token and an allowed code.
//!
//! Candidates are normalized first: uppercase, alphanumerics only,
//! `Z` read as `2`, and `5` read as `S` when a digit follows.

use std::sync::LazyLock;

use regex::Regex;

/// Marker word preceding the code on German clinical forms ("Diagnosegruppe").
pub const DEFAULT_GROUP_MARKER: &str = "gruppe";

/// Codes accepted when no deployment override is configured.
pub const DEFAULT_ALLOWED_CODES: &[&str] = &["SB1", "PS2"];

/// Separators allowed between the marker and the code.
const MAX_MARKER_GAP: usize = 10;

/// Fuzzy matches further away than this are rejected.
const MAX_FUZZY_DISTANCE: usize = 1;

static FANCY_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[“”„"']"#).unwrap());

static HORIZONTAL_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\r\n]+").unwrap());

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]{2,6}\b").unwrap());

/// Ordered, de-duplicated set of valid diagnosis-group codes.
///
/// Order matters: it breaks ties in the fuzzy stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCodeSet {
    codes: Vec<String>,
}

impl AllowedCodeSet {
    /// Codes are trimmed and uppercased; blanks and duplicates are dropped.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for code in codes {
            let code = code.as_ref().trim().to_uppercase();
            if !code.is_empty() && !unique.contains(&code) {
                unique.push(code);
            }
        }
        Self { codes: unique }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for AllowedCodeSet {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_CODES)
    }
}

/// Finds the diagnosis group in cleaned document text.
#[derive(Debug, Clone)]
pub struct DiagnosisGroupExtractor {
    allowed: AllowedCodeSet,
    anchored: Regex,
    anchored_spaced: Regex,
}

impl DiagnosisGroupExtractor {
    /// Build an extractor for `allowed` codes introduced by `marker`
    /// (matched case-insensitively, also inside compounds such as "Diagnosegruppe").
    pub fn new(allowed: AllowedCodeSet, marker: &str) -> Result<Self, regex::Error> {
        let marker = regex::escape(marker);
        // Code classes stay ASCII: under Unicode case folding `[A-Za-z]`
        // would also take `ſ` (U+017F) and the Kelvin sign.
        let anchored = Regex::new(&format!(
            r"(?i){marker}[^A-Za-z0-9]{{0,{MAX_MARKER_GAP}}}((?-u:[A-Za-z]){{1,3}}\s?[0-9]{{1,2}})"
        ))?;
        let anchored_spaced = Regex::new(&format!(
            r"(?i){marker}[^A-Za-z0-9]{{0,{MAX_MARKER_GAP}}}((?-u:[A-Za-z0-9])(?:\s?(?-u:[A-Za-z0-9])){{1,5}})"
        ))?;
        Ok(Self {
            allowed,
            anchored,
            anchored_spaced,
        })
    }

    pub fn allowed_codes(&self) -> &AllowedCodeSet {
        &self.allowed
    }

    /// Return the first allowed code found, or `None` when every stage misses.
    pub fn extract(&self, text: &str) -> Option<String> {
        if text.is_empty() || self.allowed.is_empty() {
            return None;
        }
        let text = pre_clean(text);

        if let Some(code) = self.anchored_match(&text) {
            tracing::debug!(code = %code, stage = "anchored", "Diagnosis group found");
            return Some(code);
        }
        if let Some(code) = self.anchored_spaced_match(&text) {
            tracing::debug!(code = %code, stage = "anchored_spaced", "Diagnosis group found");
            return Some(code);
        }

        let tokens: Vec<String> = TOKEN
            .find_iter(&text)
            .map(|m| normalize_code(m.as_str()))
            .collect();

        if let Some(code) = tokens.iter().find(|t| self.allowed.contains(t)) {
            tracing::debug!(code = %code, stage = "token", "Diagnosis group found");
            return Some(code.clone());
        }

        let fuzzy = self.fuzzy_match(&tokens);
        if let Some(ref code) = fuzzy {
            tracing::debug!(code = %code, stage = "fuzzy", "Diagnosis group found");
        }
        fuzzy
    }

    fn anchored_match(&self, text: &str) -> Option<String> {
        self.anchored
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| normalize_code(m.as_str()))
            .find(|code| self.allowed.contains(code))
    }

    /// Longest allowed prefix of the compacted run following the marker.
    fn anchored_spaced_match(&self, text: &str) -> Option<String> {
        self.anchored_spaced
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| {
                let compact: Vec<char> = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
                (2..=compact.len())
                    .rev()
                    .map(|len| normalize_code(&compact[..len].iter().collect::<String>()))
                    .find(|code| self.allowed.contains(code))
            })
    }

    /// Closest allowed code within `MAX_FUZZY_DISTANCE`.
    /// On equal distance the earliest token, then the earliest allowed code, wins.
    fn fuzzy_match(&self, tokens: &[String]) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for token in tokens {
            for code in self.allowed.iter() {
                let distance = levenshtein(token, code);
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((code, distance));
                }
            }
        }
        best.filter(|&(_, d)| d <= MAX_FUZZY_DISTANCE)
            .map(|(code, _)| code.to_string())
    }
}

/// Unify quotes, drop soft hyphens and collapse horizontal whitespace.
fn pre_clean(text: &str) -> String {
    let quoted = FANCY_QUOTES.replace_all(text, "\"");
    let without_soft: String = quoted.chars().filter(|&c| c != '\u{00AD}').collect();
    HORIZONTAL_SPACE.replace_all(&without_soft, " ").into_owned()
}

/// Normalize a code candidate, correcting the usual OCR confusions.
pub fn normalize_code(candidate: &str) -> String {
    let chars: Vec<char> = candidate
        .to_uppercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| if c == 'Z' { '2' } else { c })
        .collect();

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let digit_follows = chars.get(i + 1).is_some_and(char::is_ascii_digit);
            if c == '5' && digit_follows {
                'S'
            } else {
                c
            }
        })
        .collect()
}

/// Compute Levenshtein edit distance between two strings.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 { return n; }
    if n == 0 { return m; }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
