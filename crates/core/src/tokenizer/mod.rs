//! Multilingual tokenization: language detection, English whitespace
//! tokenization, Chinese forward maximum matching, and mixed-text handling.
//!
//! The detector classifies input by character ratios; each path filters
//! against its own stopword list. All behavior is driven by a
//! [`TokenizerConfig`] so indexes can tokenize consistently across fits.

mod lexicon;

use lexicon::{CHINESE_LEXICON, CHINESE_STOPWORDS, ENGLISH_STOPWORDS};
use std::collections::{HashMap, HashSet};

/// Language classification for a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Detect per input.
    #[default]
    Auto,
    English,
    Chinese,
    /// Interleaved ASCII and CJK runs, tokenized per run.
    Mixed,
}

/// Tokenizer behavior switches.
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Language override; `Auto` detects per input.
    pub language: Language,
    /// Case-fold English text.
    pub lowercase: bool,
    /// Replace ASCII punctuation with spaces before splitting.
    pub remove_punctuation: bool,
    /// Drop tokens found in the per-language stopword set.
    pub filter_stopwords: bool,
    /// Run the lexicon segmenter on Chinese text.
    pub enable_chinese_segmentation: bool,
    /// Emit unmatched CJK characters as single-character tokens instead of
    /// accumulating them into a running buffer.
    pub keep_single_char: bool,
    /// Minimum token length in characters.
    pub min_token_length: usize,
    /// Maximum token length in characters.
    pub max_token_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            language: Language::Auto,
            lowercase: true,
            remove_punctuation: true,
            filter_stopwords: true,
            enable_chinese_segmentation: true,
            keep_single_char: false,
            min_token_length: 1,
            max_token_length: 50,
        }
    }
}

/// Turns UTF-8 text into a sequence of filtered tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    english_stopwords: HashSet<String>,
    chinese_stopwords: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

/// ASCII punctuation class replaced with spaces by the English path:
/// `!"#$%&'()*+,-./:;<=>?@[\]^_` backtick `{|}~`.
fn is_punctuation(c: char) -> bool {
    matches!(c, '!'..='/' | ':'..='@' | '['..='`' | '{'..='~')
}

/// The CJK byte class: characters that encode to three UTF-8 bytes.
fn is_three_byte(c: char) -> bool {
    c.len_utf8() == 3
}

/// CJK Unified Ideographs as seen by the detector (UTF-8 lead byte
/// 0xE4..=0xE9, i.e. U+4000..=U+9FFF).
fn is_cjk_ideograph(c: char) -> bool {
    matches!(c as u32, 0x4000..=0x9FFF)
}

impl Tokenizer {
    /// Creates a tokenizer with the built-in stopword lists.
    pub fn new(config: TokenizerConfig) -> Self {
        Self {
            config,
            english_stopwords: ENGLISH_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            chinese_stopwords: CHINESE_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Classifies text by scanning character classes.
    ///
    /// Counts ASCII-alphabetic characters and CJK ideographs, then decides
    /// on the ratios: Chinese > 0.3 with English > 0.1 is mixed, Chinese
    /// > 0.3 alone is Chinese, English > 0.3 is English, anything else is
    /// mixed. Empty input is English.
    pub fn detect_language(&self, text: &str) -> Language {
        if text.is_empty() {
            return Language::English;
        }

        let mut chinese = 0usize;
        let mut english = 0usize;
        let mut total = 0usize;
        for c in text.chars() {
            if c.is_ascii() {
                if c.is_ascii_alphabetic() {
                    english += 1;
                }
            } else if is_three_byte(c) && is_cjk_ideograph(c) {
                chinese += 1;
            }
            total += 1;
        }
        if total == 0 {
            return Language::English;
        }

        let chinese_ratio = chinese as f64 / total as f64;
        let english_ratio = english as f64 / total as f64;
        if chinese_ratio > 0.3 {
            if english_ratio > 0.1 {
                Language::Mixed
            } else {
                Language::Chinese
            }
        } else if english_ratio > 0.3 {
            Language::English
        } else {
            Language::Mixed
        }
    }

    /// Tokenizes with the configured language (detecting when `Auto`).
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_as(text, self.config.language)
    }

    /// Tokenizes with an explicit language override.
    pub fn tokenize_as(&self, text: &str, language: Language) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let language = match language {
            Language::Auto => self.detect_language(text),
            other => other,
        };
        match language {
            Language::English | Language::Auto => self.tokenize_english(text),
            Language::Chinese => self.tokenize_chinese(text),
            Language::Mixed => self.tokenize_mixed(text),
        }
    }

    /// Term-frequency map over the tokenized text.
    pub fn token_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for token in self.tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts
    }

    /// Adds custom stopwords to a language's set.
    pub fn add_stopwords<I: IntoIterator<Item = String>>(&mut self, words: I, language: Language) {
        let set = match language {
            Language::Chinese => &mut self.chinese_stopwords,
            _ => &mut self.english_stopwords,
        };
        set.extend(words);
    }

    /// Removes stopwords from a language's set.
    pub fn remove_stopwords<'a, I: IntoIterator<Item = &'a str>>(
        &mut self,
        words: I,
        language: Language,
    ) {
        let set = match language {
            Language::Chinese => &mut self.chinese_stopwords,
            _ => &mut self.english_stopwords,
        };
        for word in words {
            set.remove(word);
        }
    }

    fn is_stopword(&self, token: &str, language: Language) -> bool {
        if !self.config.filter_stopwords {
            return false;
        }
        match language {
            Language::English => self.english_stopwords.contains(token),
            Language::Chinese => self.chinese_stopwords.contains(token),
            _ => {
                self.english_stopwords.contains(token) || self.chinese_stopwords.contains(token)
            }
        }
    }

    fn filter(&self, tokens: Vec<String>, language: Language) -> Vec<String> {
        tokens
            .into_iter()
            .filter(|t| !t.is_empty() && !self.is_stopword(t, language))
            .collect()
    }

    fn tokenize_english(&self, text: &str) -> Vec<String> {
        let mut processed = clean_whitespace(text);
        if self.config.lowercase {
            processed = processed.to_lowercase();
        }
        if self.config.remove_punctuation {
            processed = processed
                .chars()
                .map(|c| if is_punctuation(c) { ' ' } else { c })
                .collect();
        }

        let tokens = processed
            .split_whitespace()
            .filter(|t| {
                let len = t.chars().count();
                len >= self.config.min_token_length && len <= self.config.max_token_length
            })
            .map(|t| t.to_string())
            .collect();
        self.filter(tokens, Language::English)
    }

    /// Forward maximum matching over the built-in lexicon, longest first
    /// (4 down to 2 characters). ASCII alphanumerics inside Chinese text
    /// accumulate as Latin tokens; other characters flush the buffer.
    fn tokenize_chinese(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii() {
                if c.is_ascii_alphanumeric() {
                    current.push(c);
                } else if !current.is_empty() {
                    if current.chars().count() >= self.config.min_token_length {
                        tokens.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
                i += 1;
            } else if is_three_byte(c) {
                let mut matched = false;
                if self.config.enable_chinese_segmentation {
                    for len in (2..=4).rev() {
                        if i + len > chars.len() {
                            continue;
                        }
                        let word: String = chars[i..i + len].iter().collect();
                        if CHINESE_LEXICON.contains(word.as_str()) {
                            if !current.is_empty() {
                                tokens.push(std::mem::take(&mut current));
                            }
                            tokens.push(word);
                            i += len;
                            matched = true;
                            break;
                        }
                    }
                }
                if !matched {
                    if self.config.keep_single_char {
                        if !current.is_empty() {
                            tokens.push(std::mem::take(&mut current));
                        }
                        tokens.push(c.to_string());
                    } else {
                        current.push(c);
                    }
                    i += 1;
                }
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                i += 1;
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }

        self.filter(tokens, Language::Chinese)
    }

    /// Splits into maximal ASCII and CJK byte-class runs; each run is
    /// tokenized by its language path and results keep original order.
    fn tokenize_mixed(&self, text: &str) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        let mut segment = String::new();
        let mut current = Language::English;

        for c in text.chars() {
            if c.is_ascii() {
                if current == Language::Chinese && !segment.is_empty() {
                    all.extend(self.tokenize_chinese(&segment));
                    segment.clear();
                }
                current = Language::English;
                segment.push(c);
            } else if is_three_byte(c) {
                if current == Language::English && !segment.is_empty() {
                    all.extend(self.tokenize_english(&segment));
                    segment.clear();
                }
                current = Language::Chinese;
                segment.push(c);
            }
        }
        if !segment.is_empty() {
            match current {
                Language::Chinese => all.extend(self.tokenize_chinese(&segment)),
                _ => all.extend(self.tokenize_english(&segment)),
            }
        }
        all
    }
}

/// Collapses whitespace runs and trims the ends.
fn clean_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        let t = Tokenizer::default();
        assert_eq!(
            t.detect_language("machine learning algorithms"),
            Language::English
        );
    }

    #[test]
    fn test_detect_chinese() {
        let t = Tokenizer::default();
        assert_eq!(t.detect_language("机器学习是人工智能的分支"), Language::Chinese);
    }

    #[test]
    fn test_detect_mixed() {
        let t = Tokenizer::default();
        assert_eq!(t.detect_language("机器学习深度学习 AI模型"), Language::Mixed);
    }

    #[test]
    fn test_detect_empty_is_english() {
        let t = Tokenizer::default();
        assert_eq!(t.detect_language(""), Language::English);
    }

    #[test]
    fn test_english_lowercase_and_punctuation() {
        let t = Tokenizer::default();
        let tokens = t.tokenize("Machine-Learning, rocks!");
        assert_eq!(tokens, vec!["machine", "learning", "rocks"]);
    }

    #[test]
    fn test_english_stopwords_removed() {
        let t = Tokenizer::default();
        let tokens = t.tokenize("the quick brown fox is in the barn");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"barn".to_string()));
    }

    #[test]
    fn test_english_length_filter() {
        let config = TokenizerConfig {
            min_token_length: 3,
            max_token_length: 6,
            filter_stopwords: false,
            ..TokenizerConfig::default()
        };
        let t = Tokenizer::new(config);
        let tokens = t.tokenize("go tokens elephants run");
        assert_eq!(tokens, vec!["tokens", "run"]);
    }

    #[test]
    fn test_chinese_lexicon_segmentation() {
        let t = Tokenizer::default();
        let tokens = t.tokenize_as("机器学习是人工智能的核心", Language::Chinese);
        assert!(tokens.contains(&"机器学习".to_string()));
        assert!(tokens.contains(&"人工智能".to_string()));
        // "是" is a Chinese stopword
        assert!(!tokens.contains(&"是".to_string()));
    }

    #[test]
    fn test_chinese_keep_single_char() {
        let config = TokenizerConfig {
            keep_single_char: true,
            filter_stopwords: false,
            ..TokenizerConfig::default()
        };
        let t = Tokenizer::new(config);
        let tokens = t.tokenize_as("深度学习好", Language::Chinese);
        assert!(tokens.contains(&"深度学习".to_string()));
        assert!(tokens.contains(&"好".to_string()));
    }

    #[test]
    fn test_chinese_latin_run() {
        let t = Tokenizer::default();
        let tokens = t.tokenize_as("GPU 加速训练", Language::Chinese);
        assert!(tokens.contains(&"GPU".to_string()));
        assert!(tokens.contains(&"训练".to_string()));
    }

    #[test]
    fn test_mixed_preserves_run_order() {
        let t = Tokenizer::default();
        let tokens = t.tokenize_as("deep learning 深度学习 models", Language::Mixed);
        let deep = tokens.iter().position(|t| t == "deep").unwrap();
        let zh = tokens.iter().position(|t| t == "深度学习").unwrap();
        let models = tokens.iter().position(|t| t == "models").unwrap();
        assert!(deep < zh && zh < models);
    }

    #[test]
    fn test_empty_input() {
        let t = Tokenizer::default();
        assert!(t.tokenize("").is_empty());
    }

    #[test]
    fn test_token_counts() {
        let t = Tokenizer::default();
        let counts = t.token_counts("rust loves rust");
        assert_eq!(counts.get("rust"), Some(&2));
        assert_eq!(counts.get("loves"), Some(&1));
    }

    #[test]
    fn test_add_and_remove_stopwords() {
        let mut t = Tokenizer::default();
        t.add_stopwords(vec!["rust".to_string()], Language::English);
        assert!(!t.tokenize("rust rocks").contains(&"rust".to_string()));
        t.remove_stopwords(["rust"], Language::English);
        assert!(t.tokenize("rust rocks").contains(&"rust".to_string()));
    }

    #[test]
    fn test_stopword_filter_disabled() {
        let config = TokenizerConfig {
            filter_stopwords: false,
            ..TokenizerConfig::default()
        };
        let t = Tokenizer::new(config);
        assert!(t.tokenize("the fox").contains(&"the".to_string()));
    }
}
