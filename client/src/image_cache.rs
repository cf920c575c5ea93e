//! URL -> decoded bitmap cache with single-flight loading.
//!
//! Loads run as futures owned by the cache. The frame loop calls
//! [`ImageCache::pump`] once per frame to collect finished loads; nothing
//! calls back into the renderer when a decode completes.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use lru::LruCache;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A decoded bitmap whose backing memory must be freed explicitly.
pub trait DecodedImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Free the decoded pixels. The image must not be drawn afterwards.
    fn release(&self);
}

/// Fetches and decodes one URL.
pub trait ImageSource {
    type Image: DecodedImage + 'static;

    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Self::Image, LoadError>>;
}

/// Identity of one decoded bitmap. A URL that is evicted and loaded again
/// gets a new id, so GPU textures never outlive the bitmap they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

pub struct CachedImage<I> {
    pub id: ImageId,
    pub image: Rc<I>,
    pub loaded_at_ms: f64,
}

impl<I> Clone for CachedImage<I> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            image: Rc::clone(&self.image),
            loaded_at_ms: self.loaded_at_ms,
        }
    }
}

type LoadOutcome<I> = Result<Rc<I>, Rc<LoadError>>;
type InFlight<I> = Shared<LocalBoxFuture<'static, LoadOutcome<I>>>;

/// Handle to a load. Resolves to `None` when the URL failed.
pub enum LoadTicket<I> {
    Done(Option<Rc<I>>),
    Pending(InFlight<I>),
}

impl<I> Future for LoadTicket<I> {
    type Output = Option<Rc<I>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            LoadTicket::Done(image) => Poll::Ready(image.clone()),
            LoadTicket::Pending(shared) => shared.poll_unpin(cx).map(Result::ok),
        }
    }
}

/// What one [`ImageCache::pump`] call observed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PumpReport {
    pub completed: usize,
    pub failed: usize,
    pub evicted: Vec<ImageId>,
}

pub struct ImageCache<S: ImageSource> {
    source: S,
    entries: LruCache<String, CachedImage<S::Image>>,
    in_flight: HashMap<String, InFlight<S::Image>>,
    failed: HashSet<String>,
    capacity: usize,
    evict_batch: usize,
    next_id: u64,
}

impl<S: ImageSource> ImageCache<S> {
    pub fn new(source: S, capacity: usize, evict_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            in_flight: HashMap::new(),
            failed: HashSet::new(),
            capacity,
            evict_batch: evict_batch.clamp(1, capacity),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Cache hit, promoted to most recently used.
    pub fn get(&mut self, url: &str) -> Option<CachedImage<S::Image>> {
        self.entries.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    pub fn is_pending(&self, url: &str) -> bool {
        self.in_flight.contains_key(url)
    }

    pub fn is_failed(&self, url: &str) -> bool {
        self.failed.contains(url)
    }

    /// Start loading `url` unless it is cached, in flight, or failed before.
    /// Every caller of a pending URL shares the same underlying fetch.
    pub fn load(&mut self, url: &str) -> LoadTicket<S::Image> {
        if let Some(hit) = self.entries.get(url) {
            return LoadTicket::Done(Some(Rc::clone(&hit.image)));
        }
        if self.failed.contains(url) {
            return LoadTicket::Done(None);
        }
        if let Some(pending) = self.in_flight.get(url) {
            return LoadTicket::Pending(pending.clone());
        }

        let shared = self
            .source
            .fetch(url)
            .map(|result| result.map(Rc::new).map_err(Rc::new))
            .boxed_local()
            .shared();
        self.in_flight.insert(url.to_string(), shared.clone());
        LoadTicket::Pending(shared)
    }

    /// Collect finished loads into the cache. Never blocks.
    pub fn pump(&mut self, now_ms: f64) -> PumpReport {
        let mut report = PumpReport::default();
        if self.in_flight.is_empty() {
            return report;
        }

        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let mut finished = Vec::new();
        for (url, pending) in self.in_flight.iter_mut() {
            if let Poll::Ready(outcome) = pending.poll_unpin(&mut cx) {
                finished.push((url.clone(), outcome));
            }
        }

        for (url, outcome) in finished {
            self.in_flight.remove(&url);
            match outcome {
                Ok(image) => {
                    report.evicted.extend(self.insert(url, image, now_ms));
                    report.completed += 1;
                }
                Err(err) => {
                    tracing::debug!(%url, error = %err, "image load failed");
                    self.failed.insert(url);
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn insert(&mut self, url: String, image: Rc<S::Image>, now_ms: f64) -> Vec<ImageId> {
        let mut evicted = Vec::new();
        if !self.entries.contains(&url) && self.entries.len() >= self.capacity {
            evicted = self.evict_lru(self.evict_batch);
        }
        let id = ImageId(self.next_id);
        self.next_id += 1;
        let entry = CachedImage {
            id,
            image,
            loaded_at_ms: now_ms,
        };
        if let Some((_, old)) = self.entries.push(url, entry) {
            old.image.release();
            evicted.push(old.id);
        }
        evicted
    }

    /// Drop up to `count` least recently used bitmaps, releasing each one.
    pub fn evict_lru(&mut self, count: usize) -> Vec<ImageId> {
        let evicted: Vec<ImageId> = std::iter::from_fn(|| self.entries.pop_lru())
            .take(count)
            .map(|(_, entry)| {
                entry.image.release();
                entry.id
            })
            .collect();
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), remaining = self.entries.len(), "evicted images");
        }
        evicted
    }

    /// Release every cached bitmap. Pending loads are forgotten; failed URLs
    /// stay failed for the session.
    pub fn clear(&mut self) -> Vec<ImageId> {
        self.in_flight.clear();
        std::iter::from_fn(|| self.entries.pop_lru())
            .map(|(_, entry)| {
                entry.image.release();
                entry.id
            })
            .collect()
    }
}

impl<S: ImageSource> Drop for ImageCache<S> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use futures::channel::oneshot;
    use futures::executor::block_on;
    use futures::future::join_all;

    use super::*;

    struct FakeImage {
        w: u32,
        released: Rc<Cell<bool>>,
    }

    impl DecodedImage for FakeImage {
        fn width(&self) -> u32 {
            self.w
        }
        fn height(&self) -> u32 {
            self.w * 2
        }
        fn release(&self) {
            self.released.set(true);
        }
    }

    type Pending = Vec<(String, oneshot::Sender<Result<FakeImage, LoadError>>)>;

    /// Loads complete only when the test resolves them.
    #[derive(Default, Clone)]
    struct ManualSource {
        fetches: Rc<Cell<usize>>,
        pending: Rc<RefCell<Pending>>,
    }

    impl ManualSource {
        fn resolve(&self, url: &str, result: Result<FakeImage, LoadError>) {
            let mut pending = self.pending.borrow_mut();
            let at = pending.iter().position(|(u, _)| u == url).unwrap();
            let (_, tx) = pending.remove(at);
            tx.send(result).ok().unwrap();
        }
    }

    impl ImageSource for ManualSource {
        type Image = FakeImage;

        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<FakeImage, LoadError>> {
            self.fetches.set(self.fetches.get() + 1);
            let (tx, rx) = oneshot::channel();
            self.pending.borrow_mut().push((url.to_string(), tx));
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(LoadError::Network("dropped".to_string())))
            }
            .boxed_local()
        }
    }

    /// Loads complete immediately.
    #[derive(Default, Clone)]
    struct InstantSource {
        released: Rc<RefCell<HashMap<String, Rc<Cell<bool>>>>>,
    }

    impl ImageSource for InstantSource {
        type Image = FakeImage;

        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<FakeImage, LoadError>> {
            let released = Rc::new(Cell::new(false));
            self.released
                .borrow_mut()
                .insert(url.to_string(), Rc::clone(&released));
            futures::future::ready(Ok(FakeImage { w: 16, released })).boxed_local()
        }
    }

    fn image() -> FakeImage {
        FakeImage {
            w: 320,
            released: Rc::new(Cell::new(false)),
        }
    }

    #[test]
    fn concurrent_loads_share_one_fetch() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone(), 10, 2);
        let tickets: Vec<_> = (0..5).map(|_| cache.load("a.jpg")).collect();
        assert_eq!(source.fetches.get(), 1);
        assert!(cache.is_pending("a.jpg"));

        source.resolve("a.jpg", Ok(image()));
        let results = block_on(join_all(tickets));
        assert!(results.iter().all(|r| r.as_ref().map(|i| i.width()) == Some(320)));

        let report = cache.pump(5.0);
        assert_eq!(report.completed, 1);
        assert!(!cache.is_pending("a.jpg"));
        let hit = cache.get("a.jpg").unwrap();
        assert_eq!(hit.loaded_at_ms, 5.0);
        // Cached now, so no further fetches.
        assert!(block_on(cache.load("a.jpg")).is_some());
        assert_eq!(source.fetches.get(), 1);
    }

    #[test]
    fn pump_leaves_unfinished_loads_alone() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone(), 10, 2);
        let _a = cache.load("a.jpg");
        let _b = cache.load("b.jpg");
        source.resolve("b.jpg", Ok(image()));
        let report = cache.pump(1.0);
        assert_eq!(report.completed, 1);
        assert!(cache.is_pending("a.jpg"));
        assert!(cache.get("a.jpg").is_none());
        assert!(cache.get("b.jpg").is_some());
    }

    #[test]
    fn failed_urls_are_never_retried() {
        let source = ManualSource::default();
        let mut cache = ImageCache::new(source.clone(), 10, 2);
        let ticket = cache.load("bad.jpg");
        source.resolve("bad.jpg", Err(LoadError::Status(404)));
        assert!(block_on(ticket).is_none());
        assert_eq!(cache.pump(0.0).failed, 1);
        assert!(cache.is_failed("bad.jpg"));

        assert!(block_on(cache.load("bad.jpg")).is_none());
        assert_eq!(source.fetches.get(), 1);
        assert!(cache.get("bad.jpg").is_none());
    }

    #[test]
    fn eviction_drops_least_recently_used_batch() {
        let source = InstantSource::default();
        let mut cache = ImageCache::new(source.clone(), 4, 2);
        for i in 0..4 {
            let _ = cache.load(&format!("u{i}"));
            cache.pump(i as f64);
        }
        // u0 becomes the most recent; u1 and u2 are now the coldest.
        assert!(cache.get("u0").is_some());
        for i in 4..6 {
            let _ = cache.load(&format!("u{i}"));
            cache.pump(i as f64);
        }

        assert_eq!(cache.len(), 4);
        for gone in ["u1", "u2"] {
            assert!(cache.get(gone).is_none(), "{gone} should be evicted");
            assert!(source.released.borrow()[gone].get(), "{gone} not released");
        }
        for kept in ["u0", "u3", "u4", "u5"] {
            assert!(cache.get(kept).is_some(), "{kept} should survive");
            assert!(!source.released.borrow()[kept].get());
        }
    }

    #[test]
    fn pump_reports_evicted_ids_and_new_ids_on_reload() {
        let source = InstantSource::default();
        let mut cache = ImageCache::new(source, 1, 1);
        let _ = cache.load("a");
        cache.pump(0.0);
        let first = cache.get("a").unwrap().id;
        let _ = cache.load("b");
        let report = cache.pump(1.0);
        assert_eq!(report.evicted, vec![first]);

        let _ = cache.load("a");
        cache.pump(2.0);
        assert_ne!(cache.get("a").unwrap().id, first);
    }

    #[test]
    fn clear_releases_everything() {
        let source = InstantSource::default();
        let mut cache = ImageCache::new(source.clone(), 8, 2);
        for url in ["a", "b", "c"] {
            let _ = cache.load(url);
        }
        cache.pump(0.0);
        assert_eq!(cache.clear().len(), 3);
        assert!(cache.is_empty());
        assert!(source.released.borrow().values().all(|r| r.get()));
    }
}
