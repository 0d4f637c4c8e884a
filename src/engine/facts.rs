use rustc_hash::FxHashMap;

/// Position of a tag inside a [`FactStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(usize);

/// A typed fact written by a rule (or by activation, for the root)
#[derive(Debug, Clone, PartialEq)]
pub struct Tag<V> {
    pub id: TagId,
    pub tag_type: &'static str,
    pub value: V,
    /// The tag this one was derived from; `None` only for the root
    pub parent: Option<TagId>,
}

/// Facts of one session activation, grouped by tag type
///
/// Tags form a lineage tree rooted at the activation fact, so a multi-valued
/// tag fans out into independent branches of downstream results.
#[derive(Debug)]
pub struct FactStore<V> {
    tags: Vec<Tag<V>>,
    by_type: FxHashMap<&'static str, Vec<TagId>>,
}

impl<V> Default for FactStore<V> {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            by_type: FxHashMap::default(),
        }
    }
}

impl<V> FactStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn insert(&mut self, tag_type: &'static str, value: V, parent: Option<TagId>) -> TagId {
        let id = TagId(self.tags.len());
        self.tags.push(Tag {
            id,
            tag_type,
            value,
            parent,
        });
        self.by_type.entry(tag_type).or_default().push(id);
        id
    }

    /// Drops every fact but keeps the allocated buckets for the next activation
    pub(super) fn clear(&mut self) {
        self.tags.clear();
        for ids in self.by_type.values_mut() {
            ids.clear();
        }
    }

    pub fn get(&self, id: TagId) -> Option<&Tag<V>> {
        self.tags.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The activation fact
    pub fn root(&self) -> Option<&Tag<V>> {
        self.tags.first()
    }

    pub fn ids(&self, tag_type: &str) -> &[TagId] {
        self.by_type.get(tag_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tags(&self, tag_type: &str) -> impl Iterator<Item = &Tag<V>> + '_ {
        self.ids(tag_type).iter().filter_map(move |id| self.get(*id))
    }

    pub fn values(&self, tag_type: &str) -> impl Iterator<Item = &V> + '_ {
        self.tags(tag_type).map(|tag| &tag.value)
    }

    /// Walks from `id` up to the root, `id` included
    pub fn lineage(&self, id: TagId) -> Lineage<'_, V> {
        Lineage {
            store: self,
            next: Some(id),
        }
    }

    /// Nearest tag of `tag_type` on the lineage of `id`
    pub fn find_in_lineage(&self, id: TagId, tag_type: &str) -> Option<&Tag<V>> {
        self.lineage(id).find(|tag| tag.tag_type == tag_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag<V>> + '_ {
        self.tags.iter()
    }
}

pub struct Lineage<'a, V> {
    store: &'a FactStore<V>,
    next: Option<TagId>,
}

impl<'a, V> Iterator for Lineage<'a, V> {
    type Item = &'a Tag<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.store.get(self.next?)?;
        self.next = tag.parent;
        Some(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_walks_to_root() {
        let mut store = FactStore::new();
        let root = store.insert("root", 1, None);
        let a = store.insert("a", 2, Some(root));
        let b1 = store.insert("b", 3, Some(a));
        let _b2 = store.insert("b", 4, Some(a));

        let chain: Vec<_> = store.lineage(b1).map(|tag| tag.value).collect();
        assert_eq!(chain, vec![3, 2, 1]);
        assert_eq!(store.values("b").copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(store.find_in_lineage(b1, "a").map(|tag| tag.value), Some(2));
        assert!(store.find_in_lineage(root, "b").is_none());
    }

    #[test]
    fn test_clear_keeps_no_values() {
        let mut store = FactStore::new();
        let root = store.insert("root", 1, None);
        store.insert("a", 2, Some(root));
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.values("a").count(), 0);
        assert!(store.root().is_none());
    }
}
