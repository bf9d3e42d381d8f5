//! Word queries over one column of a normalized table
//!
//! Words are maximal runs of non-whitespace characters. Matching is exact:
//! case, accents and attached punctuation all distinguish words.

use crate::schema::NormalizedTable;
use std::collections::HashMap;

/// Column names in canonical order; empty for an empty table
pub fn list_columns(table: &NormalizedTable) -> Vec<String> {
    table.columns().to_vec()
}

/// Distinct words of a column in first-occurrence order
///
/// Rows are read top to bottom and words left to right within a cell. An
/// unknown column yields no words. Empty cells contribute nothing; there is
/// no placeholder word such as `nan` for them.
pub fn distinct_words(table: &NormalizedTable, column: &str) -> Vec<String> {
    match FrequencyIndex::for_column(table, column) {
        Some(index) => index.words().map(str::to_string).collect(),
        None => Vec::new(),
    }
}

/// Number of occurrences of `word` in a column
///
/// Zero for an unknown column, an empty table, or a word that never occurs.
pub fn count_word(table: &NormalizedTable, column: &str, word: &str) -> usize {
    FrequencyIndex::for_column(table, column)
        .map(|index| index.count(word))
        .unwrap_or(0)
}

/// The sentence reported for a selected word
pub fn admission_message(word: &str, count: usize) -> String {
    format!("L'école {} a eu {} admis !", word, count)
}

/// Count `word` in `column` and phrase the result
pub fn word_count_message(table: &NormalizedTable, column: &str, word: &str) -> String {
    admission_message(word, count_word(table, column, word))
}

/// Word counts for one column, remembering first-occurrence order
#[derive(Debug, Clone, Default)]
pub struct FrequencyIndex {
    counts: HashMap<String, usize>,
    order: Vec<String>,
}

impl FrequencyIndex {
    /// Build an index over cell texts
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for text in texts {
            for word in text.split_whitespace() {
                index.add(word);
            }
        }
        index
    }

    /// Build an index over one column, `None` if the column does not exist
    pub fn for_column(table: &NormalizedTable, column: &str) -> Option<Self> {
        let index = Self::from_texts(table.column_values(column)?);
        log::debug!(
            "indexed column {:?}: {} distinct words, {} total",
            column,
            index.len(),
            index.total()
        );
        Some(index)
    }

    fn add(&mut self, word: &str) {
        match self.counts.get_mut(word) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(word.to_string(), 1);
                self.order.push(word.to_string());
            }
        }
    }

    /// Occurrences of an exact word
    pub fn count(&self, word: &str) -> usize {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// Distinct words in first-occurrence order
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Words by descending count; ties keep first-occurrence order
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self.words().map(|w| (w, self.count(w))).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of words counted
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
