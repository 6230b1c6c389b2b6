//! Language and document-type classification from configured vocabularies

use scrapeforge_common::config::ClassifierConfig;
use std::collections::HashSet;

use crate::models::{DocumentType, Language};

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Space-padded token string so phrases only match on word boundaries
fn padded(text: &str) -> String {
    let mut out = String::from(" ");
    for token in tokens(text) {
        out.push_str(&token);
        out.push(' ');
    }
    out
}

#[derive(Debug, Clone)]
pub struct Classifier {
    primary: Language,
    primary_terms: HashSet<String>,
    secondary: Language,
    secondary_terms: HashSet<String>,
    fallback: Language,
    rules: Vec<(DocumentType, Vec<String>)>,
}

impl Classifier {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let term_set = |terms: &[String]| -> HashSet<String> {
            terms.iter().flat_map(|t| tokens(t)).collect()
        };
        Self {
            primary: Language::from_code(&config.primary_language),
            primary_terms: term_set(&config.primary_terms),
            secondary: Language::from_code(&config.secondary_language),
            secondary_terms: term_set(&config.secondary_terms),
            fallback: Language::from_code(&config.fallback_language),
            rules: config
                .type_rules
                .iter()
                .map(|rule| {
                    let keywords = rule
                        .keywords
                        .iter()
                        .map(|k| padded(k))
                        .filter(|k| !k.trim().is_empty())
                        .collect();
                    (DocumentType::from_name(&rule.document_type), keywords)
                })
                .collect(),
        }
    }

    /// Vocabulary overlap vote; a tie goes to the fallback language
    pub fn language(&self, text: &str) -> Language {
        let mut primary = 0usize;
        let mut secondary = 0usize;
        let mut any = false;
        for token in tokens(text) {
            any = true;
            if self.primary_terms.contains(&token) {
                primary += 1;
            }
            if self.secondary_terms.contains(&token) {
                secondary += 1;
            }
        }

        if !any {
            return Language::Unknown;
        }
        match primary.cmp(&secondary) {
            std::cmp::Ordering::Greater => self.primary,
            std::cmp::Ordering::Less => self.secondary,
            std::cmp::Ordering::Equal => self.fallback,
        }
    }

    /// First rule with a keyword in the title or the extracted text wins
    pub fn document_type(&self, title: &str, text: &str) -> DocumentType {
        let mut haystack = padded(title);
        haystack.push_str(&padded(text));

        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|(document_type, _)| *document_type)
            .unwrap_or(DocumentType::Document)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}
