//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::Result;

use super::words;

pub fn map(_source: &str, contents: &str) -> Result<Vec<KeyValue>> {
    Ok(words(contents).map(|word| KeyValue::new(word, "1")).collect())
}

pub fn reduce(_key: &str, values: &[String]) -> Result<String> {
    Ok(values.len().to_string())
}
