use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_CONTEXT_CHARS: usize = 100;

/// Builds the lookup key for a hovered token: the token text plus a bounded
/// prefix of its surrounding text.
pub fn cache_key(token: &str, context: &str, context_chars: usize) -> String {
    let prefix: String = context.chars().take(context_chars).collect();
    format!("{token}:{prefix}")
}

/// Explanation cache with first-in-first-out eviction. Lookups never refresh
/// an entry, so an old entry is evicted on schedule no matter how often it
/// is hit.
#[derive(Debug)]
pub struct AnnotationCache {
    capacity: usize,
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

impl AnnotationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn put(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.map.get_mut(&key) {
            *existing = value;
            return;
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
        while self.map.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl Default for AnnotationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_first_inserted_regardless_of_hits() {
        let mut cache = AnnotationCache::default();
        cache.put("key-0".to_string(), "first".to_string());
        for index in 1..100 {
            assert_eq!(cache.get("key-0").as_deref(), Some("first"));
            cache.put(format!("key-{index}"), format!("value-{index}"));
        }
        assert_eq!(cache.len(), 100);

        cache.put("key-100".to_string(), "value-100".to_string());
        assert_eq!(cache.len(), 100);
        assert!(!cache.contains("key-0"));
        for index in 1..=100 {
            assert!(cache.contains(&format!("key-{index}")), "key-{index} missing");
        }
    }

    #[test]
    fn overwrite_keeps_original_position() {
        let mut cache = AnnotationCache::new(2);
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.put("a".to_string(), "3".to_string());
        cache.put("c".to_string(), "4".to_string());
        assert!(!cache.contains("a"));
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("4"));
    }

    #[test]
    fn key_truncates_context_by_chars() {
        let context = "ř".repeat(150);
        let key = cache_key("Vltava", &context, 100);
        assert_eq!(key, format!("Vltava:{}", "ř".repeat(100)));
        assert_eq!(cache_key("API", "short", 100), "API:short");
    }
}
