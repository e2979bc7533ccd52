//! An in-memory [`ObjectStore`] for tests.
//!
//! Objects live in a sorted map so listings come out in key order, like S3.
//! Every call is counted and failures can be injected per key, which is what the
//! read-through and error-mapping tests need.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::RwLock;

use crate::error::{ErrorKind, ProxyError, ProxyResult};
use crate::store::{ListOutput, ListedObject, ObjectBody, ObjectStore, PutOutput, StoredObject};

/// A stored object and its metadata.
#[derive(Debug, Clone, Default)]
pub struct MemoryObject {
    /// Object data.
    pub data: Bytes,
    /// Stored `Cache-Control`.
    pub cache_control: Option<String>,
    /// Stored `Content-Disposition`.
    pub content_disposition: Option<String>,
    /// Stored `Content-Encoding`.
    pub content_encoding: Option<String>,
    /// Stored `Content-Language`.
    pub content_language: Option<String>,
    /// Stored `Content-Type`.
    pub content_type: Option<String>,
    /// Stored `Expires`.
    pub expires: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl MemoryObject {
    /// An object with the given data and no metadata.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// In-memory bucket.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    failures: RwLock<HashMap<String, ErrorKind>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(HashMap::new()),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    /// Insert an object.
    pub fn insert(&self, key: impl Into<String>, object: MemoryObject) {
        self.objects.write().insert(key.into(), object);
    }

    /// Insert an object with data only.
    pub fn insert_bytes(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.insert(key, MemoryObject::new(data));
    }

    /// Make every operation on `key` fail with `kind`.
    pub fn fail_with(&self, key: impl Into<String>, kind: ErrorKind) {
        self.failures.write().insert(key.into(), kind);
    }

    /// A stored object, if present.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.objects.read().get(key).cloned()
    }

    /// Number of `get` calls so far.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put` calls so far.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `list` calls so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, key: &str) -> ProxyResult<()> {
        match self.failures.read().get(key) {
            Some(kind) => Err(ProxyError::new(*kind, format!("injected {kind} for {key}"))),
            None => Ok(()),
        }
    }
}

/// Parse a single `bytes=start-end` range against an object of `len` bytes.
fn parse_range(range: &str, len: usize) -> ProxyResult<(usize, usize)> {
    let invalid = || ProxyError::new(ErrorKind::RangeNotSatisfiable, format!("invalid range: {range}"));

    let bounds = range.strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start, end) = bounds.split_once('-').ok_or_else(invalid)?;
    let (start, end) = if start.is_empty() {
        let suffix: usize = end.parse().map_err(|_| invalid())?;
        (len.saturating_sub(suffix), len.checked_sub(1).ok_or_else(invalid)?)
    } else {
        let start: usize = start.parse().map_err(|_| invalid())?;
        let end = if end.is_empty() {
            len.saturating_sub(1)
        } else {
            end.parse::<usize>().map_err(|_| invalid())?.min(len.saturating_sub(1))
        };
        (start, end)
    };
    if start >= len || start > end {
        return Err(invalid());
    }
    Ok((start, end))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str, range: Option<&str>) -> ProxyResult<StoredObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.injected_failure(key)?;

        let object = self.object(key).ok_or_else(|| ProxyError::not_found(key))?;
        let total = object.data.len();

        let (data, content_range) = match range {
            Some(range) => {
                let (start, end) = parse_range(range, total)?;
                (
                    object.data.slice(start..=end),
                    Some(format!("bytes {start}-{end}/{total}")),
                )
            }
            None => (object.data.clone(), None),
        };

        let mut stored = StoredObject::new(ObjectBody::from_bytes(data.clone()));
        stored.content_length = i64::try_from(data.len()).ok();
        stored.content_range = content_range;
        stored.cache_control = object.cache_control;
        stored.content_disposition = object.content_disposition;
        stored.content_encoding = object.content_encoding;
        stored.content_language = object.content_language;
        stored.content_type = object.content_type;
        stored.e_tag = Some(format!("\"{}\"", hex::encode(Md5::digest(&object.data))));
        stored.expires = object.expires;
        stored.last_modified = object.last_modified;
        Ok(stored)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> ProxyResult<PutOutput> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.injected_failure(key)?;

        let e_tag = format!("\"{}\"", hex::encode(Md5::digest(&body)));
        self.insert(
            key,
            MemoryObject {
                data: body,
                content_type: content_type.map(ToOwned::to_owned),
                last_modified: Some(Utc::now()),
                ..MemoryObject::default()
            },
        );
        Ok(PutOutput {
            e_tag: Some(e_tag),
            ..PutOutput::default()
        })
    }

    async fn list(&self, prefix: &str) -> ProxyResult<ListOutput> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.injected_failure(prefix)?;

        let objects = self.objects.read();
        let mut common_prefixes = BTreeSet::new();
        let mut contents = Vec::new();

        for (key, object) in objects.range(prefix.to_owned()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find('/') {
                Some(idx) => {
                    common_prefixes.insert(format!("{prefix}{}", &rest[..=idx]));
                }
                None => contents.push(ListedObject {
                    key: key.clone(),
                    last_modified: object.last_modified,
                }),
            }
        }

        Ok(ListOutput {
            common_prefixes: common_prefixes.into_iter().collect(),
            contents,
        })
    }
}
