//! Generic reconciliation loop
//!
//! A thin layer over [`kube_runtime::Controller`]:
//!
//! - the watch stream feeds a reflector store, and a trigger stream derived
//!   from it schedules the keys whose `resourceVersion` changed, the deleted
//!   keys and the keys that vanished during a relist
//! - the controller runs one reconcile at a time and only after the first
//!   complete listing reached the store
//! - failures are requeued with [`ItemBackoff`] until `max_retries` is spent,
//!   then the key is handed to the [`DroppedKey`] sink
//!
//! A key that is no longer cached is reconciled with `None`.

use crate::backoff::ItemBackoff;
use crate::config::LoopConfig;
use crate::error::LoopError;
use crate::key::ObjectKey;
use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt, stream};
use kube::{Api, Resource};
use kube_runtime::controller::{self, Action, Config as ControllerConfig};
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::watcher::{self, Event, watcher};
use kube_runtime::{Controller, WatchStreamExt, predicates};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Business logic run for each scheduled key
#[async_trait]
pub trait Reconcile<K: Send + Sync + 'static>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Bring the cluster in line with `object`; `None` means it no longer exists.
    async fn reconcile(&self, key: &ObjectKey, object: Option<Arc<K>>) -> Result<(), Self::Error>;
}

/// A key abandoned after exhausting its retries
#[derive(Debug)]
pub struct DroppedKey<E> {
    /// The abandoned key
    pub key: ObjectKey,
    /// Error of the last attempt
    pub error: E,
    /// Failed attempts, the first one included
    pub attempts: u32,
}

pub struct ReconcileLoop<K, R>
where
    K: Resource + Send + Sync + 'static,
    R: Reconcile<K>,
{
    name: String,
    reconciler: Arc<R>,
    dyntype: K::DynamicType,
    config: LoopConfig,
    dropped: mpsc::UnboundedSender<DroppedKey<R::Error>>,
}

impl<K, R> ReconcileLoop<K, R>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Clone + Debug + Eq + Hash + Unpin + Send + Sync + 'static,
    R: Reconcile<K> + 'static,
{
    /// `dropped` receives every key given up after `config.max_retries` requeues.
    pub fn new(
        name: impl Into<String>,
        reconciler: Arc<R>,
        dyntype: K::DynamicType,
        config: LoopConfig,
        dropped: mpsc::UnboundedSender<DroppedKey<R::Error>>,
    ) -> Self {
        Self {
            name: name.into(),
            reconciler,
            dyntype,
            config,
            dropped,
        }
    }

    /// Watch `api` and reconcile until `cancel` fires.
    pub async fn run_with_api(self, api: Api<K>, cancel: CancellationToken) -> Result<(), LoopError> {
        let events = watcher(api, watcher::Config::default()).default_backoff();
        self.run(events, cancel).await
    }

    /// Reconcile the objects announced by `events` until `cancel` fires or
    /// the stream ends.
    ///
    /// # Errors
    ///
    /// [`LoopError::CacheSync`] when the stream ends before the first listing
    /// completed.
    pub async fn run<S>(self, events: S, cancel: CancellationToken) -> Result<(), LoopError>
    where
        S: Stream<Item = Result<Event<K>, watcher::Error>> + Send + 'static,
    {
        let writer = Writer::new(self.dyntype.clone());
        let store = writer.as_reader();
        let trigger = triggers(events, writer, self.dyntype.clone());
        let context = Arc::new(Context {
            name: self.name.clone(),
            reconciler: self.reconciler,
            backoff: self.config.backoff(),
            max_retries: self.config.max_retries,
            failures: Mutex::new(HashMap::new()),
            dropped: self.dropped,
            _object: PhantomData,
        });

        info!(controller = %self.name, "Starting controller");
        let controller = Controller::for_stream_with(trigger, store.clone(), self.dyntype)
            .with_config(ControllerConfig::default().concurrency(1))
            .graceful_shutdown_on(cancel.clone().cancelled_owned())
            .run(reconcile::<K, R>, error_policy::<K, R>, context.clone());
        let mut controller = std::pin::pin!(controller);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled(), if !is_synced(&store) => {
                    info!(controller = %self.name, "Cancelled before cache sync");
                    return Ok(());
                }
                next = controller.next() => next,
            };
            match next {
                None => break,
                Some(Ok((object, _))) => {
                    debug!(controller = %self.name, object = %object, "Reconcile finished");
                }
                Some(Err(controller::Error::ObjectNotFound(object))) => {
                    let key = ObjectKey::new(object.namespace.as_deref(), &object.name);
                    debug!(controller = %self.name, key = %key, "Object no longer cached");
                    context.reconcile_gone(key).await;
                }
                Some(Err(controller::Error::ReconcilerFailed(error, object))) => {
                    debug!(controller = %self.name, object = %object, error = %error, "Reconcile requeued");
                }
                Some(Err(controller::Error::QueueError(error))) => {
                    warn!(controller = %self.name, error = %error, "Watch stream error");
                }
                Some(Err(controller::Error::RunnerError(error))) => {
                    error!(controller = %self.name, error = %error, "Watch ended before cache sync");
                    return Err(LoopError::CacheSync(self.name));
                }
            }
        }

        if !is_synced(&store) {
            error!(controller = %self.name, "Watch ended before cache sync");
            return Err(LoopError::CacheSync(self.name));
        }
        info!(controller = %self.name, "Controller stopped");
        Ok(())
    }
}

fn is_synced<K>(store: &Store<K>) -> bool
where
    K: Resource + Clone + 'static,
    K::DynamicType: Clone + Eq + Hash,
{
    matches!(store.wait_until_ready().now_or_never(), Some(Ok(())))
}

/// State shared by the reconcile and error policy callbacks
struct Context<K, R>
where
    K: Send + Sync + 'static,
    R: Reconcile<K>,
{
    name: String,
    reconciler: Arc<R>,
    backoff: ItemBackoff,
    max_retries: u32,
    /// Consecutive failures per key, cleared on success or drop
    failures: Mutex<HashMap<ObjectKey, u32>>,
    dropped: mpsc::UnboundedSender<DroppedKey<R::Error>>,
    _object: PhantomData<fn() -> K>,
}

impl<K, R> Context<K, R>
where
    K: Send + Sync + 'static,
    R: Reconcile<K>,
{
    /// Run the reconciler once. An `Err` asks for a requeue; a key out of
    /// retries is handed to the sink and reported as done.
    async fn attempt(&self, key: ObjectKey, object: Option<Arc<K>>) -> Result<Action, R::Error> {
        match self.reconciler.reconcile(&key, object).await {
            Ok(()) => {
                self.failures().remove(&key);
                debug!(controller = %self.name, key = %key, "Reconciled");
                Ok(Action::await_change())
            }
            Err(error) => {
                let attempts = {
                    let mut failures = self.failures();
                    let count = failures.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                if attempts <= self.max_retries {
                    warn!(
                        controller = %self.name,
                        key = %key,
                        attempt = attempts,
                        error = %error,
                        "Reconcile failed, requeueing"
                    );
                    return Err(error);
                }
                self.failures().remove(&key);
                if let Err(unsent) = self.dropped.send(DroppedKey { key, error, attempts }) {
                    error!(
                        controller = %self.name,
                        key = %unsent.0.key,
                        error = %unsent.0.error,
                        "Dropping key, error sink closed"
                    );
                }
                Ok(Action::await_change())
            }
        }
    }

    /// Reconcile a key that left the cache, retrying in place.
    async fn reconcile_gone(&self, key: ObjectKey) {
        while self.attempt(key.clone(), None).await.is_err() {
            tokio::time::sleep(self.retry_delay(&key)).await;
        }
    }

    fn retry_delay(&self, key: &ObjectKey) -> Duration {
        let failures = self.failures().get(key).copied().unwrap_or(1);
        self.backoff.delay(failures.saturating_sub(1))
    }

    fn failures(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn reconcile<K, R>(object: Arc<K>, context: Arc<Context<K, R>>) -> Result<Action, R::Error>
where
    K: Resource + Send + Sync + 'static,
    R: Reconcile<K>,
{
    let key = ObjectKey::from_resource(object.as_ref());
    context.attempt(key, Some(object)).await
}

fn error_policy<K, R>(object: Arc<K>, _error: &R::Error, context: Arc<Context<K, R>>) -> Action
where
    K: Resource + Send + Sync + 'static,
    R: Reconcile<K>,
{
    Action::requeue(context.retry_delay(&ObjectKey::from_resource(object.as_ref())))
}

/// Keys seen during an in-progress relist
struct Relist<K> {
    previous: Vec<Arc<K>>,
    seen: HashSet<ObjectKey>,
}

/// Turns watch events into the objects to schedule
struct Triggers<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Clone + Eq + Hash,
{
    store: Store<K>,
    dyntype: K::DynamicType,
    /// Last `resourceVersion` hash scheduled per object
    versions: HashMap<ObjectRef<K>, u64>,
    relist: Option<Relist<K>>,
}

impl<K> Triggers<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Clone + Eq + Hash,
{
    /// Called after the event reached the store.
    fn on_event(&mut self, event: Event<K>) -> Vec<K> {
        match event {
            Event::Apply(object) => self.changed(object).into_iter().collect(),
            Event::InitApply(object) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.seen.insert(ObjectKey::from_resource(&object));
                }
                self.changed(object).into_iter().collect()
            }
            Event::Delete(object) => {
                self.versions
                    .remove(&ObjectRef::from_obj_with(&object, self.dyntype.clone()));
                vec![object]
            }
            Event::Init => {
                // The store still holds the previous listing until InitDone.
                self.relist = Some(Relist {
                    previous: self.store.state(),
                    seen: HashSet::new(),
                });
                Vec::new()
            }
            Event::InitDone => {
                let Some(relist) = self.relist.take() else {
                    return Vec::new();
                };
                relist
                    .previous
                    .into_iter()
                    .filter(|object| !relist.seen.contains(&ObjectKey::from_resource(object.as_ref())))
                    .map(|object| {
                        self.versions
                            .remove(&ObjectRef::from_obj_with(object.as_ref(), self.dyntype.clone()));
                        object.as_ref().clone()
                    })
                    .collect()
            }
        }
    }

    /// `object` unless its `resourceVersion` matches the last one scheduled.
    fn changed(&mut self, object: K) -> Option<K> {
        let Some(version) = predicates::resource_version(&object) else {
            return Some(object);
        };
        let reference = ObjectRef::from_obj_with(&object, self.dyntype.clone());
        if self.versions.insert(reference, version) == Some(version) {
            debug!(key = %ObjectKey::from_resource(&object), "resourceVersion unchanged, skipping");
            return None;
        }
        Some(object)
    }
}

/// Objects to schedule, in watch order. Errors pass through to the
/// controller, which reports them as `QueueError`.
fn triggers<K, S>(
    events: S,
    writer: Writer<K>,
    dyntype: K::DynamicType,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send + 'static
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Clone + Eq + Hash + Send + Sync + 'static,
    S: Stream<Item = Result<Event<K>, watcher::Error>> + Send + 'static,
{
    let mut state = Triggers {
        store: writer.as_reader(),
        dyntype,
        versions: HashMap::new(),
        relist: None,
    };
    reflector::reflector(writer, events)
        .map(move |event| match event {
            Ok(event) => state.on_event(event).into_iter().map(Ok).collect::<Vec<_>>(),
            Err(error) => vec![Err(error)],
        })
        .flat_map(stream::iter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as stream_channel;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    #[derive(Debug, thiserror::Error)]
    #[error("reconcile of {0} failed")]
    struct TestError(String);

    /// Reports every call and fails for names starting with `fail`
    struct Recorder {
        calls: mpsc::UnboundedSender<(ObjectKey, Option<String>)>,
    }

    #[async_trait]
    impl Reconcile<ConfigMap> for Recorder {
        type Error = TestError;

        async fn reconcile(
            &self,
            key: &ObjectKey,
            object: Option<Arc<ConfigMap>>,
        ) -> Result<(), TestError> {
            let version = object.and_then(|cm| cm.resource_version());
            let _ = self.calls.send((key.clone(), version));
            if key.name.starts_with("fail") {
                return Err(TestError(key.to_string()));
            }
            Ok(())
        }
    }

    type EventSender = stream_channel::UnboundedSender<Result<Event<ConfigMap>, watcher::Error>>;

    struct Harness {
        events: EventSender,
        calls: mpsc::UnboundedReceiver<(ObjectKey, Option<String>)>,
        dropped: mpsc::UnboundedReceiver<DroppedKey<TestError>>,
        cancel: CancellationToken,
        handle: JoinHandle<Result<(), LoopError>>,
    }

    impl Harness {
        fn start(max_retries: u32) -> Self {
            let (events, stream) = stream_channel::unbounded();
            let (calls_tx, calls) = mpsc::unbounded_channel();
            let (dropped_tx, dropped) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let config = LoopConfig::default()
                .with_max_retries(max_retries)
                .with_delays(Duration::from_millis(1), Duration::from_millis(5));
            let reconcile_loop = ReconcileLoop::new(
                "configmaps",
                Arc::new(Recorder { calls: calls_tx }),
                (),
                config,
                dropped_tx,
            );
            let handle = tokio::spawn(reconcile_loop.run(stream, cancel.clone()));
            Self {
                events,
                calls,
                dropped,
                cancel,
                handle,
            }
        }

        fn send(&self, event: Event<ConfigMap>) {
            self.events.unbounded_send(Ok(event)).unwrap();
        }

        fn sync(&self, objects: Vec<ConfigMap>) {
            self.send(Event::Init);
            for object in objects {
                self.send(Event::InitApply(object));
            }
            self.send(Event::InitDone);
        }

        async fn next_call(&mut self) -> (ObjectKey, Option<String>) {
            timeout(Duration::from_secs(2), self.calls.recv())
                .await
                .expect("timed out waiting for reconcile")
                .unwrap()
        }

        /// The next `n` calls, sorted by key
        async fn next_calls(&mut self, n: usize) -> Vec<(ObjectKey, Option<String>)> {
            let mut calls = Vec::with_capacity(n);
            for _ in 0..n {
                calls.push(self.next_call().await);
            }
            calls.sort();
            calls
        }

        async fn next_dropped(&mut self) -> DroppedKey<TestError> {
            timeout(Duration::from_secs(2), self.dropped.recv())
                .await
                .expect("timed out waiting for dropped key")
                .unwrap()
        }

        async fn assert_idle(&mut self) {
            let extra = timeout(Duration::from_millis(100), self.calls.recv()).await;
            assert!(extra.is_err(), "unexpected reconcile: {extra:?}");
        }
    }

    fn config_map(name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(Some("default"), name)
    }

    fn call(name: &str, version: Option<&str>) -> (ObjectKey, Option<String>) {
        (key(name), version.map(str::to_string))
    }

    #[tokio::test]
    async fn test_initial_listing_reconciles_every_object() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1"), config_map("b", "1")]);

        assert_eq!(
            harness.next_calls(2).await,
            vec![call("a", Some("1")), call("b", Some("1"))]
        );
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_nothing_runs_before_cache_sync() {
        let mut harness = Harness::start(1);
        harness.send(Event::Init);
        harness.send(Event::InitApply(config_map("a", "1")));
        harness.assert_idle().await;

        harness.send(Event::InitDone);
        assert_eq!(harness.next_call().await, call("a", Some("1")));
    }

    #[tokio::test]
    async fn test_unchanged_resource_version_is_skipped() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1")]);
        harness.next_call().await;

        harness.send(Event::Apply(config_map("a", "1")));
        harness.assert_idle().await;

        harness.send(Event::Apply(config_map("a", "2")));
        assert_eq!(harness.next_call().await, call("a", Some("2")));
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_relist_with_same_versions_is_a_no_op() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1"), config_map("b", "1")]);
        harness.next_calls(2).await;

        harness.sync(vec![config_map("a", "1"), config_map("b", "3")]);
        assert_eq!(harness.next_call().await, call("b", Some("3")));
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_delete_reconciles_with_none() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1")]);
        harness.next_call().await;

        harness.send(Event::Delete(config_map("a", "1")));
        assert_eq!(harness.next_call().await, call("a", None));
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_relist_delivers_vanished_key_as_gone() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1"), config_map("b", "1")]);
        harness.next_calls(2).await;

        // "b" was deleted while the watch was down; no Delete event is seen.
        harness.sync(vec![config_map("a", "1")]);
        assert_eq!(harness.next_call().await, call("b", None));
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_recreated_object_is_reconciled_again() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1")]);
        harness.next_call().await;

        harness.send(Event::Delete(config_map("a", "1")));
        assert_eq!(harness.next_call().await, call("a", None));
        harness.send(Event::Apply(config_map("a", "1")));
        assert_eq!(harness.next_call().await, call("a", Some("1")));
    }

    #[tokio::test]
    async fn test_failing_key_is_dropped_after_retries() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("fail-a", "1")]);

        assert_eq!(harness.next_call().await.0, key("fail-a"));
        assert_eq!(harness.next_call().await.0, key("fail-a"));
        let dropped = harness.next_dropped().await;
        assert_eq!(dropped.key, key("fail-a"));
        assert_eq!(dropped.attempts, 2);
        assert_eq!(dropped.error.to_string(), "reconcile of default/fail-a failed");
        harness.assert_idle().await;

        // A fresh change gets a fresh budget
        harness.send(Event::Apply(config_map("fail-a", "2")));
        assert_eq!(harness.next_call().await, call("fail-a", Some("2")));
        assert_eq!(harness.next_call().await, call("fail-a", Some("2")));
        assert_eq!(harness.next_dropped().await.attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_drops_on_first_failure() {
        let mut harness = Harness::start(0);
        harness.sync(vec![config_map("fail-a", "1")]);

        harness.next_call().await;
        assert_eq!(harness.next_dropped().await.attempts, 1);
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_failing_gone_key_uses_the_same_budget() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("fail-a", "1")]);
        harness.next_call().await;
        harness.next_call().await;
        harness.next_dropped().await;

        harness.send(Event::Delete(config_map("fail-a", "1")));
        assert_eq!(harness.next_call().await, call("fail-a", None));
        assert_eq!(harness.next_call().await, call("fail-a", None));
        let dropped = harness.next_dropped().await;
        assert_eq!(dropped.attempts, 2);
        harness.assert_idle().await;
    }

    #[tokio::test]
    async fn test_stream_end_before_sync_is_fatal() {
        let harness = Harness::start(1);
        harness.send(Event::Init);
        drop(harness.events);

        let result = timeout(Duration::from_secs(2), harness.handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(LoopError::CacheSync(name)) if name == "configmaps"));
    }

    #[tokio::test]
    async fn test_cancel_before_sync_stops_the_loop() {
        let harness = Harness::start(1);
        harness.send(Event::Init);

        harness.cancel.cancel();
        let result = timeout(Duration::from_secs(2), harness.handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_stops_the_loop() {
        let mut harness = Harness::start(1);
        harness.sync(vec![config_map("a", "1")]);
        harness.next_call().await;

        harness.cancel.cancel();
        let result = timeout(Duration::from_secs(2), harness.handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
