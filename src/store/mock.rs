//! An in-memory [`Store`] for tests and local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use url::Url;

use crate::errors::StoreError;
use crate::store::Store;

const MOCK_BASE_URL: &str = "https://mock-store.invalid/";

#[derive(Default)]
pub struct MockStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, String)>>,
    failing: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every subsequent operation fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Inserts an object directly, bypassing failure injection.
    pub fn insert(&self, key: impl Into<String>, raw: impl Into<Vec<u8>>, content_type: &str) {
        self.objects
            .write()
            .unwrap()
            .insert(key.into(), (raw.into(), content_type.to_owned()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().unwrap().contains_key(key)
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(key).map(|(raw, _)| raw.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().unwrap().keys().cloned().collect()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("mock store set to fail".to_owned()))
        } else {
            Ok(())
        }
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check()?;

        self.content(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_owned(),
        })
    }
}

impl Store for MockStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        future::ready(self.read(key)).boxed()
    }

    fn get_range<'a>(
        &'a self,
        key: &'a str,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'a, Result<(Vec<u8>, u64), StoreError>> {
        // like S3, a range starting past the end is not satisfiable
        let result = self.read(key).and_then(|raw| {
            let total = raw.len() as u64;

            if offset >= total {
                return Err(StoreError::Unavailable(format!(
                    "range {}+{} not satisfiable for {} bytes",
                    offset, len, total
                )));
            }

            let end = offset.saturating_add(len).min(total) as usize;

            Ok((raw[offset as usize..end].to_vec(), total))
        });

        future::ready(result).boxed()
    }

    fn size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        future::ready(self.read(key).map(|raw| raw.len() as u64)).boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        raw: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self.check().map(|_| self.insert(key, raw, content_type));

        future::ready(result).boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = self.check().map(|_| {
            self.objects.write().unwrap().remove(key);
        });

        future::ready(result).boxed()
    }

    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        let result = self.check().map(|_| {
            self.objects
                .read()
                .unwrap()
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect()
        });

        future::ready(result).boxed()
    }

    fn signed_upload_url(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Result<Url, StoreError> {
        self.check()?;

        let mut url = Url::parse(MOCK_BASE_URL)
            .and_then(|base| base.join(key))
            .map_err(|e| StoreError::SigningFailed(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("expires_in", &ttl.as_secs().to_string());

        if let Some(content_type) = content_type {
            url.query_pairs_mut().append_pair("content_type", content_type);
        }

        Ok(url)
    }
}
