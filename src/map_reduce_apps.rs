use std::collections::BTreeSet;

use anyhow::Context;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::{KeyValue, MapReduceApp};

static WORDS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("invalid regex"));

pub struct WordCount {}

impl MapReduceApp for WordCount {
    fn map(&self, _filename: &str, contents: &str) -> Vec<KeyValue> {
        WORDS_REGEX
            .find_iter(contents)
            .map(|w| KeyValue::new(w.as_str(), "1"))
            .collect()
    }

    fn reduce(&self, _key: &str, values: &[String]) -> anyhow::Result<String> {
        let mut sum: u64 = 0;
        for value in values {
            sum += value
                .parse::<u64>()
                .with_context(|| format!("not a count: {:?}", value))?;
        }
        Ok(sum.to_string())
    }
}

/// Percent-escapes `%` and whitespace so a file name stays one field.
fn escape_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '%' || c.is_whitespace() {
            for byte in c.encode_utf8(&mut [0; 4]).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Inverted index: which inputs mention each word. File names are reported
/// with whitespace percent-escaped.
pub struct Indexer {}

impl MapReduceApp for Indexer {
    fn map(&self, filename: &str, contents: &str) -> Vec<KeyValue> {
        let filename = escape_file_name(filename);
        WORDS_REGEX
            .find_iter(contents)
            .map(|w| w.as_str())
            .unique()
            .map(|w| KeyValue::new(w, filename.as_str()))
            .collect()
    }

    fn reduce(&self, _key: &str, values: &[String]) -> anyhow::Result<String> {
        let files: BTreeSet<&str> = values.iter().map(String::as_str).collect();
        Ok(format!("{} {}", files.len(), files.iter().join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_map_emits_one_per_word() {
        let kva = WordCount {}.map("in.txt", "a a b");
        assert_eq!(
            kva,
            vec![
                KeyValue::new("a", "1"),
                KeyValue::new("a", "1"),
                KeyValue::new("b", "1"),
            ]
        );
    }

    #[test]
    fn test_word_count_map_splits_on_non_word_characters() {
        let keys: Vec<String> = WordCount {}
            .map("in.txt", "  hello, world!\nhello-again ")
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["hello", "world", "hello", "again"]);
    }

    #[test]
    fn test_word_count_map_of_empty_input() {
        assert!(WordCount {}.map("in.txt", "").is_empty());
    }

    #[test]
    fn test_word_count_reduce_sums() {
        let values = vec!["1".to_string(), "1".to_string()];
        assert_eq!(WordCount {}.reduce("a", &values).unwrap(), "2");

        let values = vec!["2".to_string(), "3".to_string()];
        assert_eq!(WordCount {}.reduce("a", &values).unwrap(), "5");
    }

    #[test]
    fn test_word_count_reduce_rejects_garbage() {
        let values = vec!["1".to_string(), "x".to_string()];
        assert!(WordCount {}.reduce("a", &values).is_err());
    }

    #[test]
    fn test_indexer_emits_each_word_once_per_file() {
        let kva = Indexer {}.map("doc1", "to be or not to be");
        assert_eq!(kva.len(), 4);
        assert!(kva.iter().all(|kv| kv.value == "doc1"));
    }

    #[test]
    fn test_indexer_escapes_whitespace_in_file_names() {
        let kva = Indexer {}.map("/tmp/my doc\t100%.txt", "hello");
        assert_eq!(
            kva,
            vec![KeyValue::new("hello", "/tmp/my%20doc%09100%25.txt")]
        );
    }

    #[test]
    fn test_indexer_reduce_lists_files() {
        let values = vec!["b.txt".to_string(), "a.txt".to_string(), "b.txt".to_string()];
        assert_eq!(Indexer {}.reduce("w", &values).unwrap(), "2 a.txt,b.txt");
    }
}
