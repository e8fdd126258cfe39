//! Lexical URL features fed to the classifier.
//!
//! The slot order in [`FEATURE_LAYOUT`] is the contract with the trained model.
//! Adding, removing or reordering a slot silently corrupts every prediction, so
//! the layout only changes together with a retrained model.

use once_cell::sync::Lazy;
use regex::RegexSet;
use tracing::warn;

use crate::{error::Error, Result};

pub const FEATURE_COUNT: usize = 6;

pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [
    "has_https",             // 0: raw string starts with "https"
    "url_length",            // 1: character count
    "num_digits",            // 2: ASCII digits
    "num_special_chars",     // 3: non-alphanumeric characters
    "suspicious_word_count", // 4: distinct vocabulary hits
    "reserved",              // 5: always 0
];

pub const SUSPICIOUS_KEYWORDS: [&str; 14] = [
    "login", "verify", "update", "secure", "bank", "password", "account",
    "confirm", "free", "urgent", "webscr", "signin", "ebayisapi", "wp-admin",
];

static KEYWORD_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(
        SUSPICIOUS_KEYWORDS
            .iter()
            .map(|word| format!("(?i){}", regex::escape(word))),
    )
    .expect("Invalid keyword pattern")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn zeroed() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Name/value pairs in layout order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_LAYOUT.iter().copied().zip(self.0.iter().copied())
    }
}

/// Never fails: input that cannot be featurized yields the all-zero vector.
pub fn extract_features(url: &str) -> FeatureVector {
    try_extract(url).unwrap_or_else(|e| {
        warn!(error = %e, "feature extraction failed, using zero vector");
        FeatureVector::zeroed()
    })
}

fn try_extract(url: &str) -> Result<FeatureVector> {
    if url.is_empty() {
        return Err(Error::ParseError("empty url".to_owned()));
    }

    let has_https = if url.starts_with("https") { 1.0 } else { 0.0 };
    let url_length = url.chars().count();
    let num_digits = url.chars().filter(|c| c.is_ascii_digit()).count();
    let num_special = url.chars().filter(|c| !c.is_alphanumeric()).count();

    Ok(FeatureVector([
        has_https,
        url_length as f64,
        num_digits as f64,
        num_special as f64,
        suspicious_word_count(url) as f64,
        0.0,
    ]))
}

/// Each vocabulary entry counts once, however often it repeats.
pub fn suspicious_word_count(url: &str) -> usize {
    KEYWORD_SET.matches(url).iter().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    impl FeatureVector {
        pub(crate) fn get_by_name(&self, name: &str) -> Option<f64> {
            FEATURE_LAYOUT
                .iter()
                .position(|n| *n == name)
                .map(|i| self.0[i])
        }
    }

    #[test]
    fn https_prefix_sets_first_slot() {
        assert_eq!(extract_features("https://example.com").get_by_name("has_https"), Some(1.0));
        assert_eq!(extract_features("http://example.com").get_by_name("has_https"), Some(0.0));
    }

    #[test]
    fn https_check_is_a_raw_prefix_match() {
        assert_eq!(extract_features("httpsx://example.com").as_slice()[0], 1.0);
        assert_eq!(extract_features("HTTPS://example.com").as_slice()[0], 0.0);
    }

    #[test]
    fn empty_url_falls_back_to_zero_vector() {
        assert_eq!(extract_features(""), FeatureVector::zeroed());
        assert_eq!(extract_features("").as_slice(), &[0.0; 6]);
    }

    #[test]
    fn counts_length_digits_and_specials() {
        let v = extract_features("http://a1.b2/c?d=3");
        assert_eq!(v.get_by_name("url_length"), Some(18.0));
        assert_eq!(v.get_by_name("num_digits"), Some(3.0));
        // ':' '/' '/' '.' '/' '?' '='
        assert_eq!(v.get_by_name("num_special_chars"), Some(7.0));
        assert_eq!(v.get_by_name("reserved"), Some(0.0));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let v = extract_features("http://bücher.de");
        assert_eq!(v.get_by_name("url_length"), Some(16.0));
        assert_eq!(v.get_by_name("num_special_chars"), Some(4.0));
    }

    #[test]
    fn keywords_are_case_insensitive_substrings() {
        assert_eq!(extract_features("http://secure-login.biz").get_by_name("suspicious_word_count"), Some(2.0));
        assert_eq!(extract_features("HTTP://SECURE-LOGIN.BIZ").get_by_name("suspicious_word_count"), Some(2.0));
    }

    #[test]
    fn repeated_keyword_counts_once() {
        assert_eq!(suspicious_word_count("http://login.example.com/login/login"), 1);
    }

    #[test]
    fn overlapping_keywords_all_count() {
        assert_eq!(suspicious_word_count("https://x.com/wp-admin/signin?login"), 3);
        assert_eq!(suspicious_word_count("https://x.com/wpadmin"), 0);
    }

    #[test]
    fn plain_ip_with_keywords() {
        let v = extract_features("http://192.0.2.1/verify-account-update");
        assert_eq!(v.get_by_name("has_https"), Some(0.0));
        assert_eq!(v.get_by_name("suspicious_word_count"), Some(3.0));
        assert_eq!(v.get_by_name("num_digits"), Some(6.0));
    }

    #[test]
    fn always_six_slots() {
        for url in ["", " ", "::::", "https://", "\u{0}", "http://例え.テスト/ログイン"] {
            assert_eq!(extract_features(url).as_slice().len(), FEATURE_COUNT);
        }
    }

    #[test]
    fn named_follows_layout_order() {
        let names: Vec<_> = extract_features("https://a.b").named().map(|(n, _)| n).collect();
        assert_eq!(names, FEATURE_LAYOUT);
    }
}
