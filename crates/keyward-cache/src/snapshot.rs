//! Tag sets and cache snapshots

use std::collections::BTreeSet;

use keyward_core::{KeywardResult, TagId, DEFAULT_MAX_CACHED_TAGS};
use keyward_wire::{parse_body, AuthorisedTags};

/// Ordered set of tags with a hard size cap. Never holds `TagId::NONE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<TagId>,
    cap: usize,
}

impl TagSet {
    pub fn with_cap(cap: usize) -> Self {
        TagSet {
            tags: BTreeSet::new(),
            cap,
        }
    }

    /// Build from a list, dropping zeros and anything past the cap.
    /// Returns the set and the number of tags dropped for the cap.
    pub fn from_tags(tags: impl IntoIterator<Item = TagId>, cap: usize) -> (Self, usize) {
        let mut set = Self::with_cap(cap);
        let mut dropped = 0;
        for tag in tags {
            if tag.is_none() || set.contains(tag) {
                continue;
            }
            if !set.insert(tag) {
                dropped += 1;
            }
        }
        (set, dropped)
    }

    /// Insert a tag; false if it is `NONE` or the set is full
    pub fn insert(&mut self, tag: TagId) -> bool {
        if tag.is_none() || (self.tags.len() >= self.cap && !self.tags.contains(&tag)) {
            return false;
        }
        self.tags.insert(tag);
        true
    }

    #[inline]
    pub fn contains(&self, tag: TagId) -> bool {
        self.tags.contains(&tag)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = TagId> + '_ {
        self.tags.iter().copied()
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::with_cap(DEFAULT_MAX_CACHED_TAGS)
    }
}

/// Authorized tags plus the authority's hash of them. Replaced whole,
/// never edited.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CacheSnapshot {
    tags: TagSet,
    hash: String,
}

impl CacheSnapshot {
    pub fn new(tags: TagSet, hash: impl Into<String>) -> Self {
        CacheSnapshot {
            tags,
            hash: hash.into(),
        }
    }

    pub fn empty(cap: usize) -> Self {
        CacheSnapshot {
            tags: TagSet::with_cap(cap),
            hash: String::new(),
        }
    }

    /// Build from the authority document, logging anything dropped for the cap
    pub fn from_document(doc: AuthorisedTags, cap: usize) -> Self {
        let offered = doc.authorised_tags.len();
        let (tags, dropped) = TagSet::from_tags(doc.authorised_tags, cap);
        if dropped > 0 {
            tracing::warn!(offered, cap, dropped, "authorized tag list exceeds cache cap");
        }
        CacheSnapshot {
            tags,
            hash: doc.authorised_tags_hash,
        }
    }

    pub fn to_document(&self) -> AuthorisedTags {
        AuthorisedTags {
            authorised_tags: self.tags.iter().collect(),
            authorised_tags_hash: self.hash.clone(),
        }
    }

    /// Persisted form: one JSON line terminated by a newline
    pub fn to_json_line(&self) -> KeywardResult<String> {
        let mut line = serde_json::to_string(&self.to_document())?;
        line.push('\n');
        Ok(line)
    }

    /// Parse the persisted form; only the first line is read
    pub fn from_json_line(contents: &str, cap: usize) -> KeywardResult<Self> {
        let line = contents.lines().next().unwrap_or_default();
        let doc: AuthorisedTags = parse_body(line)?;
        Ok(Self::from_document(doc, cap))
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::KeywardError;
    use proptest::prelude::*;

    #[test]
    fn test_tag_set_skips_zero_and_caps() {
        let (set, dropped) = TagSet::from_tags([TagId(0), TagId(3), TagId(1), TagId(2)], 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![TagId(1), TagId(3)]);
        assert_eq!(dropped, 1);
        assert!(!set.contains(TagId::NONE));
    }

    #[test]
    fn test_tag_set_duplicates_do_not_count() {
        let (set, dropped) = TagSet::from_tags([TagId(5), TagId(5), TagId(6)], 2);
        assert_eq!(set.len(), 2);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_full_set_still_accepts_existing_tag() {
        let mut set = TagSet::with_cap(1);
        assert!(set.insert(TagId(9)));
        assert!(set.insert(TagId(9)));
        assert!(!set.insert(TagId(10)));
    }

    #[test]
    fn test_json_line_roundtrip() {
        let (tags, _) = TagSet::from_tags([TagId(10), TagId(20)], 200);
        let snapshot = CacheSnapshot::new(tags, "abc");
        let line = snapshot.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(
            line.trim_end(),
            r#"{"authorised_tags":[10,20],"authorised_tags_hash":"abc"}"#
        );
        assert_eq!(CacheSnapshot::from_json_line(&line, 200).unwrap(), snapshot);
    }

    #[test]
    fn test_only_first_line_is_read() {
        let contents = "{\"authorised_tags\":[1],\"authorised_tags_hash\":\"h\"}\ngarbage";
        let snapshot = CacheSnapshot::from_json_line(contents, 200).unwrap();
        assert_eq!(snapshot.hash(), "h");
    }

    #[test]
    fn test_corrupt_line_rejected() {
        assert!(matches!(
            CacheSnapshot::from_json_line("{\"authorised_tags\": [1,", 200),
            Err(KeywardError::ParseFailure(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_tag_set_respects_cap(
            tags in proptest::collection::btree_set(any::<u32>(), 0..400),
            cap in 1usize..250,
        ) {
            let (set, dropped) = TagSet::from_tags(tags.iter().copied().map(TagId), cap);
            let nonzero = tags.iter().filter(|t| **t != 0).count();

            prop_assert!(set.len() <= cap);
            prop_assert!(!set.contains(TagId::NONE));
            prop_assert_eq!(set.len() + dropped, nonzero);
        }
    }
}
