//! Combined identity matcher compiled once per repository pass.

use std::borrow::Cow;

use regex::{Captures, Regex, RegexBuilder};
use tracing::debug;

use crate::errors::MappingValidationError;
use crate::identity::IdentityMapping;

const PATTERN_SIZE_LIMIT: usize = 256 * (1 << 20);
const DFA_SIZE_LIMIT: usize = 64 * (1 << 20);

/// One case-insensitive alternation over every mapping key, longest first.
///
/// Keys are anchored with `\b` on each edge that is a word character, so a
/// key only matches as a whole token ("an" never matches inside
/// "anonymous") while keys that start or end with punctuation still match
/// next to whitespace.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    pattern: Option<Regex>,
    /// Token per capture group, same order as the alternation.
    group_tokens: Vec<String>,
}

impl IdentityMatcher {
    /// Validate `mapping` and compile it.
    pub fn compile(mapping: &IdentityMapping) -> Result<Self, MappingValidationError> {
        let entries = mapping.entries();
        for entry in &entries {
            if entry.variant.trim().is_empty() {
                return Err(MappingValidationError::EmptyKey(entry.variant.clone()));
            }
            if entry.token.trim().is_empty() {
                return Err(MappingValidationError::EmptyToken(entry.variant.clone()));
            }
        }

        let group_tokens: Vec<String> = entries.iter().map(|e| e.token.clone()).collect();

        if entries.is_empty() {
            debug!("empty mapping, matcher is a no-op");
            return Ok(Self {
                pattern: None,
                group_tokens,
            });
        }

        let alternatives: Vec<String> = entries
            .iter()
            .map(|e| format!("({})", whole_token(&e.variant)))
            .collect();
        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .dfa_size_limit(DFA_SIZE_LIMIT)
            .build()?;

        debug!(keys = entries.len(), "compiled identity matcher");
        Ok(Self {
            pattern: Some(pattern),
            group_tokens,
        })
    }

    /// Number of keys the matcher recognizes.
    pub fn len(&self) -> usize {
        self.group_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_tokens.is_empty()
    }

    /// Whether `text` contains any key as a whole token.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }

    /// Replace every whole-token key occurrence in `text` with its token.
    /// Borrows `text` unchanged when nothing matches.
    ///
    /// The token comes from the capture group that matched, so matched text
    /// is never copied to the output.
    pub fn replace<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(pattern) = &self.pattern else {
            return Cow::Borrowed(text);
        };

        let mut matches = pattern.captures_iter(text).peekable();
        if matches.peek().is_none() {
            return Cow::Borrowed(text);
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in matches {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(self.group_token(&caps));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Cow::Owned(out)
    }

    /// Token of the single alternative that participated in the match.
    fn group_token(&self, caps: &Captures<'_>) -> &str {
        let token = caps
            .iter()
            .skip(1)
            .zip(&self.group_tokens)
            .find_map(|(group, token)| group.map(|_| token.as_str()));
        debug_assert!(token.is_some(), "match without a participating group");
        token.unwrap_or_default()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn whole_token(variant: &str) -> String {
    let escaped = regex::escape(variant);
    let starts_word = variant.chars().next().is_some_and(is_word_char);
    let ends_word = variant.chars().last().is_some_and(is_word_char);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MatchSource;

    fn mapping(pairs: &[(&str, &str)]) -> IdentityMapping {
        let mut mapping = IdentityMapping::new();
        for (variant, token) in pairs {
            mapping.insert(*variant, *token, MatchSource::Automated);
        }
        mapping
    }

    #[test]
    fn test_whole_token_only() {
        let matcher = IdentityMatcher::compile(&mapping(&[("an", "T")])).unwrap();
        assert_eq!(matcher.replace("anonymous an plan"), "anonymous T plan");
    }

    #[test]
    fn test_longest_match_wins() {
        let matcher =
            IdentityMatcher::compile(&mapping(&[("Mario", "SHORT"), ("Mario Mauer", "LONG")]))
                .unwrap();
        assert_eq!(matcher.replace("Mario Mauer committed"), "LONG committed");
        assert_eq!(matcher.replace("Mario Mauerhofer"), "SHORT Mauerhofer");
    }

    #[test]
    fn test_case_insensitive_uses_variant_token() {
        let matcher = IdentityMatcher::compile(&mapping(&[("jdoe", "T1")])).unwrap();
        assert_eq!(matcher.replace("JDoe and jdoe"), "T1 and T1");
    }

    #[test]
    fn test_email_and_local_part() {
        let matcher =
            IdentityMatcher::compile(&mapping(&[("mario@x.com", "T1"), ("mario", "T1")]))
                .unwrap();
        assert_eq!(
            matcher.replace("<mario@x.com> aka mario"),
            "<T1> aka T1"
        );
    }

    #[test]
    fn test_mixed_case_output_never_keeps_key() {
        let matcher = IdentityMatcher::compile(&mapping(&[
            ("Øyvind Ström", "T1"),
            ("ström", "T2"),
            ("ss", "T3"),
        ]))
        .unwrap();
        let out = matcher.replace("ØYVIND STRÖM, Ström and SS");
        assert_eq!(out, "T1, T2 and T3");
        for key in ["øyvind", "ström", "ss"] {
            assert!(!out.to_lowercase().contains(key));
        }
    }

    #[test]
    fn test_punctuation_edges() {
        let matcher = IdentityMatcher::compile(&mapping(&[("[bot]", "T")])).unwrap();
        assert_eq!(matcher.replace("by [bot]!"), "by T!");
    }

    #[test]
    fn test_unchanged_is_borrowed() {
        let matcher = IdentityMatcher::compile(&mapping(&[("jdoe", "T1")])).unwrap();
        assert!(matches!(matcher.replace("nobody here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rejects_blank_key() {
        let result = IdentityMatcher::compile(&mapping(&[("   ", "T")]));
        assert!(matches!(result, Err(MappingValidationError::EmptyKey(_))));
    }

    #[test]
    fn test_rejects_blank_token() {
        let result = IdentityMatcher::compile(&mapping(&[("jdoe", "")]));
        assert!(matches!(result, Err(MappingValidationError::EmptyToken(_))));
    }

    #[test]
    fn test_empty_mapping_is_noop() {
        let matcher = IdentityMatcher::compile(&IdentityMapping::new()).unwrap();
        assert!(matcher.is_empty());
        assert_eq!(matcher.replace("jdoe"), "jdoe");
        assert!(!matcher.is_match("jdoe"));
    }
}
