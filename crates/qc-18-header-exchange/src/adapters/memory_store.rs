//! In-memory header store.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::Hash;
use std::collections::{BTreeMap, HashMap};

use crate::domain::{ExtendedHeader, StoreError};
use crate::ports::HeaderStore;

#[derive(Default)]
struct Inner {
    by_height: BTreeMap<u64, ExtendedHeader>,
    by_hash: HashMap<Hash, u64>,
    head: Option<u64>,
}

/// Header store backed by a height-ordered map and a hash index.
#[derive(Default)]
pub struct InMemoryHeaderStore {
    inner: RwLock<Inner>,
}

impl InMemoryHeaderStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `headers`.
    pub fn with_headers(headers: Vec<ExtendedHeader>) -> Self {
        let store = Self::new();
        store.insert_all(headers);
        store
    }

    /// Number of stored headers.
    pub fn len(&self) -> usize {
        self.inner.read().by_height.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_height.is_empty()
    }

    fn insert_all(&self, headers: Vec<ExtendedHeader>) {
        let mut inner = self.inner.write();
        for header in headers {
            let height = header.height();
            let replaced = inner.by_height.get(&height).map(ExtendedHeader::hash);
            if let Some(old_hash) = replaced {
                inner.by_hash.remove(&old_hash);
            }
            inner.by_hash.insert(header.hash(), height);
            inner.by_height.insert(height, header);
            if inner.head.map_or(true, |head| height > head) {
                inner.head = Some(height);
            }
        }
    }
}

#[async_trait]
impl HeaderStore for InMemoryHeaderStore {
    async fn head(&self) -> Result<ExtendedHeader, StoreError> {
        let inner = self.inner.read();
        let head = inner.head.ok_or(StoreError::Empty)?;
        inner
            .by_height
            .get(&head)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get(&self, hash: &Hash) -> Result<ExtendedHeader, StoreError> {
        let inner = self.inner.read();
        let height = inner.by_hash.get(hash).ok_or(StoreError::NotFound)?;
        inner
            .by_height
            .get(height)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_height(&self, height: u64) -> Result<ExtendedHeader, StoreError> {
        self.inner
            .read()
            .by_height
            .get(&height)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_range_by_height(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ExtendedHeader>, StoreError> {
        if from >= to {
            return Err(StoreError::InvalidRange { from, to });
        }
        let inner = self.inner.read();
        let headers: Vec<_> = inner.by_height.range(from..to).map(|(_, h)| h.clone()).collect();
        // any gap means a missing height
        if headers.len() as u64 != to - from {
            return Err(StoreError::NotFound);
        }
        Ok(headers)
    }

    async fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.inner.read().by_hash.contains_key(hash))
    }

    async fn append(&self, headers: Vec<ExtendedHeader>) -> Result<(), StoreError> {
        self.insert_all(headers);
        Ok(())
    }
}
