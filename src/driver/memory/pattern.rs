//! MySQL `LIKE` matching (case-insensitive, `%` and `_` wildcards, `\` escape).

use crate::core::{DbError, DbResult};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(size) => size,
    None => unreachable!(),
};

lazy_static::lazy_static! {
    static ref LIKE_CACHE: Mutex<LruCache<String, Arc<Regex>>> = Mutex::new(LruCache::new(CACHE_SIZE));
}

fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Patterns without wildcards, or with a single leading/trailing `%`, skip the regex.
fn fast_path(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();

    match pattern.matches('%').count() {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

fn compiled(pattern: &str) -> DbResult<Arc<Regex>> {
    if let Ok(mut cache) = LIKE_CACHE.lock()
        && let Some(regex) = cache.get(pattern)
    {
        return Ok(Arc::clone(regex));
    }

    let regex = RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| DbError::ExecutionError(format!("Invalid LIKE pattern: {}", e)))?;
    let regex = Arc::new(regex);

    if let Ok(mut cache) = LIKE_CACHE.lock() {
        cache.put(pattern.to_string(), Arc::clone(&regex));
    }
    Ok(regex)
}

pub fn like(text: &str, pattern: &str) -> DbResult<bool> {
    if let Some(result) = fast_path(text, pattern) {
        return Ok(result);
    }
    Ok(compiled(pattern)?.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like("Ada Lovelace", "ada%").unwrap());
        assert!(like("Ada Lovelace", "%LACE").unwrap());
        assert!(like("Ada Lovelace", "%love%").unwrap());
        assert!(like("Ada", "A_a").unwrap());
        assert!(!like("Adda", "A_a").unwrap());
        assert!(like("a.b", "a.b").unwrap());
        assert!(!like("axb", "a.b").unwrap());
    }

    #[test]
    fn test_like_escape() {
        assert!(like("100%", r"100\%").unwrap());
        assert!(!like("1000", r"100\%").unwrap());
        assert!(like("a_b", r"a\_b").unwrap());
    }
}
