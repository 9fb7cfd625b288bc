//! An inverted index: for every word, the documents that contain it.
//!

use crate::*;
use anyhow::Result;
use itertools::Itertools;
use std::collections::BTreeSet;

use super::words;

/// Emit `(word, source)` once for every distinct word in the document.
pub fn map(source: &str, contents: &str) -> Result<Vec<KeyValue>> {
    let distinct: BTreeSet<&str> = words(contents).collect();
    Ok(distinct
        .into_iter()
        .map(|word| KeyValue::new(word, source))
        .collect())
}

/// `<number of documents> <documents, sorted and comma separated>`.
pub fn reduce(_key: &str, values: &[String]) -> Result<String> {
    let docs = values.iter().sorted().join(",");
    Ok(format!("{} {}", values.len(), docs))
}
