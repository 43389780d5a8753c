//! Classification of store responses and recovery of the routing cache.
//!
//! A [`RegionErrorHandler`] is built for one RPC attempt. It inspects the
//! outcome, repairs the shared [`RegionCache`] according to what the store
//! reported, tells the owning request about routing changes, and returns a
//! [`RequestFailure`] the retry loop can branch on.
//!
//! | Routing error        | Cache mutation                          | Notification            | Failure       |
//! |----------------------|-----------------------------------------|-------------------------|---------------|
//! | `NotLeader`          | `update_leader`                         | `on_leader_changed`     | `Unavailable` |
//! | `StoreNotMatch`      | `invalidate_region` + `invalidate_store`| `on_routing_invalidated`| `Unavailable` |
//! | `StaleEpoch`         | `mark_region_stale`                     | none                    | `RegionStale` |
//! | `ServerIsBusy`       | none                                    | none                    | `Unavailable` |
//! | `StaleCommand`       | none                                    | none                    | `Unavailable` |
//! | `RaftEntryTooLarge`  | none                                    | none                    | `Unavailable` |
//! | `KeyNotInRegion`     | none                                    | none                    | `Unavailable` |
//! | `Other`              | `invalidate_region` + `invalidate_store`| none                    | per policy    |
//!
//! Cache mutations and notifications always complete before the failure is
//! returned, so the next attempt reads a cache that already reflects them.
//!
//! # Example
//!
//! ```rust
//! use region_router::handler::{NoopReceiver, RegionErrorHandler, RequestContext};
//! use region_router::region::{RegionCache, RegionError};
//! use region_router::testing::three_replica_cluster;
//! use region_router::FailureKind;
//! use std::sync::Arc;
//!
//! struct GetResponse {
//!     region_error: Option<RegionError>,
//! }
//!
//! let cache = Arc::new(three_replica_cluster(42, 7));
//! let ctx = RequestContext::for_leader(cache.lookup_region(42).unwrap()).unwrap();
//! let handler = RegionErrorHandler::new(
//!     cache.clone(),
//!     Arc::new(NoopReceiver),
//!     ctx,
//!     |resp: &GetResponse| resp.region_error.clone(),
//! );
//!
//! let resp = GetResponse { region_error: Some(RegionError::StaleEpoch { new_regions: vec![] }) };
//! let failure = handler.handle(Some(&resp)).unwrap_err();
//! assert_eq!(failure.kind, FailureKind::RegionStale);
//! assert!(cache.lookup_region(42).is_none());
//! ```

mod context;
mod extractor;
mod receiver;

pub use context::RequestContext;
pub use extractor::ErrorExtractor;
pub use receiver::{NoopReceiver, RegionErrorReceiver};

use crate::config::{HandlerConfig, UnknownErrorPolicy};
use crate::error::{FailureKind, RequestFailure};
use crate::metrics::{RoutingEvent, RoutingMetrics};
use crate::region::{RegionCache, RegionError};
use crate::types::{format_key, StoreId};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Handles the outcome of a single attempt bound to a [`RequestContext`].
pub struct RegionErrorHandler<Resp: ?Sized, E> {
    cache: Arc<dyn RegionCache>,
    receiver: Arc<dyn RegionErrorReceiver>,
    context: RequestContext,
    extractor: E,
    config: HandlerConfig,
    metrics: Option<Arc<RoutingMetrics>>,
    _response: PhantomData<fn(&Resp)>,
}

impl<Resp: ?Sized, E> std::fmt::Debug for RegionErrorHandler<Resp, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionErrorHandler")
            .field("context", &self.context)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<Resp: ?Sized, E> RegionErrorHandler<Resp, E>
where
    E: ErrorExtractor<Resp>,
{
    /// Create a handler for one attempt.
    pub fn new(
        cache: Arc<dyn RegionCache>,
        receiver: Arc<dyn RegionErrorReceiver>,
        context: RequestContext,
        extractor: E,
    ) -> Self {
        Self {
            cache,
            receiver,
            context,
            extractor,
            config: HandlerConfig::default(),
            metrics: None,
            _response: PhantomData,
        }
    }

    /// Set the handler configuration.
    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Record outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The attempt this handler is bound to.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Process the outcome of the attempt.
    ///
    /// `None` means no response arrived (transport failure, timeout). The
    /// target store is marked suspect and `Ok(())` is returned: the retry
    /// loop already treats a missing response as its retry trigger.
    ///
    /// A response with no routing error returns `Ok(())` without touching the
    /// cache. Any routing error yields `Err` after its side effects are done.
    pub fn handle(&self, response: Option<&Resp>) -> Result<(), RequestFailure> {
        let Some(response) = response else {
            warn!(
                region_id = self.context.region_id(),
                store_id = self.context.store_id(),
                region = %self.context.region(),
                "Request failed without response"
            );
            self.cache
                .mark_store_suspect(self.context.region_id(), self.context.store_id());
            if let Some(metrics) = &self.metrics {
                metrics.record(RoutingEvent::ResponseMissing);
            }
            return Ok(());
        };

        match self.extractor.extract(response) {
            None => {
                if let Some(metrics) = &self.metrics {
                    metrics.record(RoutingEvent::ResponseOk);
                }
                Ok(())
            }
            Some(error) => {
                let failure = self.recover(&error);
                if let Some(metrics) = &self.metrics {
                    metrics.record_region_error(error.kind());
                    metrics.record_failure(failure.kind.as_str());
                }
                Err(failure)
            }
        }
    }

    /// Apply the cache mutation and notification for `error`, then classify it.
    fn recover(&self, error: &RegionError) -> RequestFailure {
        let region_id = self.context.region_id();
        let store_id = self.context.store_id();
        let description = format!("region {}: {}", region_id, error);

        match error {
            RegionError::NotLeader {
                leader: Some(leader),
                ..
            } => {
                warn!(
                    region_id,
                    store_id,
                    new_store_id = leader.store_id,
                    "NotLeader error"
                );
                self.redirect_to_leader(leader.store_id);
                RequestFailure::unavailable(description)
            }
            RegionError::NotLeader { leader: None, .. } => {
                warn!(region_id, store_id, "NotLeader error without known leader");
                RequestFailure::unavailable(description)
            }
            RegionError::StoreNotMatch { .. } => {
                warn!(region_id, store_id, "Store not match");
                self.drop_routing(store_id);
                self.receiver.on_routing_invalidated();
                RequestFailure::unavailable(description)
            }
            RegionError::StaleEpoch { .. } => {
                warn!(region_id, "Stale epoch");
                self.cache.mark_region_stale(region_id);
                RequestFailure::region_stale(description)
            }
            RegionError::ServerIsBusy { reason, .. } => {
                warn!(region_id, store_id, reason = %reason, "Server is busy");
                RequestFailure::unavailable(description)
            }
            RegionError::StaleCommand => {
                warn!(region_id, store_id, "Stale command");
                RequestFailure::unavailable(description)
            }
            RegionError::RaftEntryTooLarge { entry_size, .. } => {
                warn!(region_id, store_id, entry_size, "Raft entry too large");
                RequestFailure::unavailable(description)
            }
            RegionError::KeyNotInRegion { key, .. } => {
                warn!(region_id, key = %format_key(key), "Key not in region");
                RequestFailure::unavailable(description)
            }
            RegionError::Other { message } => {
                warn!(region_id, store_id, error = %message, "Unrecognized region error");
                self.drop_routing(store_id);
                let kind = match self.config.unknown_error_policy {
                    UnknownErrorPolicy::InvalidateAndRetry => FailureKind::Unavailable,
                    UnknownErrorPolicy::Fatal => FailureKind::Fatal,
                };
                RequestFailure::new(kind, description)
            }
        }
    }

    fn redirect_to_leader(&self, new_store_id: StoreId) {
        let region_id = self.context.region_id();
        self.cache.update_leader(region_id, new_store_id);

        match (
            self.cache.lookup_region(region_id),
            self.cache.lookup_store(new_store_id),
        ) {
            (Some(region), Some(store)) => self.receiver.on_leader_changed(&region, &store),
            _ => self.receiver.on_routing_invalidated(),
        }
    }

    fn drop_routing(&self, store_id: StoreId) {
        self.cache.invalidate_region(self.context.region_id());
        self.cache.invalidate_store(store_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Peer, Region, RegionManager, Store};
    use crate::testing::{
        three_replica_cluster, CacheCall, Notification, RecordingCache, RecordingReceiver,
    };
    use bytes::Bytes;

    #[derive(Debug, Default)]
    struct KvResponse {
        region_error: Option<RegionError>,
        value: Bytes,
    }

    impl KvResponse {
        fn ok(value: &'static [u8]) -> Self {
            Self {
                region_error: None,
                value: Bytes::from_static(value),
            }
        }

        fn failed(error: RegionError) -> Self {
            Self {
                region_error: Some(error),
                value: Bytes::new(),
            }
        }
    }

    fn extract(resp: &KvResponse) -> Option<RegionError> {
        resp.region_error.clone()
    }

    struct Fixture {
        cache: Arc<RecordingCache>,
        receiver: Arc<RecordingReceiver>,
        metrics: Arc<RoutingMetrics>,
    }

    impl Fixture {
        fn new(region_id: u64, leader_store: u64) -> Self {
            let metrics = Arc::new(RoutingMetrics::new());
            let manager =
                three_replica_cluster(region_id, leader_store).with_metrics(Arc::clone(&metrics));
            Self {
                cache: Arc::new(RecordingCache::new(Arc::new(manager))),
                receiver: Arc::new(RecordingReceiver::new()),
                metrics,
            }
        }

        fn handler(
            &self,
            region_id: u64,
        ) -> RegionErrorHandler<KvResponse, fn(&KvResponse) -> Option<RegionError>> {
            let region = self.cache.lookup_region(region_id).unwrap();
            let ctx = RequestContext::for_leader(region).unwrap();
            RegionErrorHandler::new(
                self.cache.clone(),
                self.receiver.clone(),
                ctx,
                extract as fn(&KvResponse) -> Option<RegionError>,
            )
            .with_metrics(Arc::clone(&self.metrics))
        }

        fn manager(&self) -> &Arc<RegionManager> {
            self.cache.inner()
        }
    }

    #[test]
    fn test_success_has_no_side_effects() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::ok(b"value");

        assert!(fx.handler(42).handle(Some(&resp)).is_ok());
        assert_eq!(resp.value, Bytes::from_static(b"value"));
        assert!(fx.cache.calls().is_empty());
        assert!(fx.receiver.is_empty());
        assert_eq!(fx.metrics.count(RoutingEvent::ResponseOk), 1);
    }

    #[test]
    fn test_missing_response_marks_store_suspect_once() {
        let fx = Fixture::new(42, 7);

        assert!(fx.handler(42).handle(None).is_ok());
        assert_eq!(fx.cache.calls(), vec![CacheCall::MarkStoreSuspect(42, 7)]);
        assert!(fx.receiver.is_empty());
        assert_eq!(fx.metrics.count(RoutingEvent::ResponseMissing), 1);
    }

    #[test]
    fn test_not_leader_updates_leader_and_notifies() {
        let fx = Fixture::new(42, 5);
        let resp = KvResponse::failed(RegionError::NotLeader {
            region_id: 42,
            leader: Some(Peer::new(4202, 7)),
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(fx.cache.calls(), vec![CacheCall::UpdateLeader(42, 7)]);

        let notifications = fx.receiver.notifications();
        assert_eq!(notifications.len(), 1);
        match &notifications[0] {
            Notification::LeaderChanged { region, store } => {
                assert_eq!(store.id, 7);
                assert_eq!(region.id, 42);
                assert_eq!(region.leader_store_id(), Some(7));
            }
            other => panic!("unexpected notification: {:?}", other),
        }
        assert_eq!(
            fx.manager().lookup_region(42).unwrap().leader_store_id(),
            Some(7)
        );
    }

    #[test]
    fn test_not_leader_outside_replicas_requests_reresolve() {
        let fx = Fixture::new(42, 5);
        let resp = KvResponse::failed(RegionError::NotLeader {
            region_id: 42,
            leader: Some(Peer::new(9999, 99)),
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(fx.receiver.notifications(), vec![Notification::RoutingInvalidated]);
        assert!(fx.manager().lookup_region(42).is_none());
    }

    #[test]
    fn test_not_leader_without_leader_hint() {
        let fx = Fixture::new(42, 5);
        let resp = KvResponse::failed(RegionError::NotLeader {
            region_id: 42,
            leader: None,
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert!(fx.cache.calls().is_empty());
        assert!(fx.receiver.is_empty());
    }

    #[test]
    fn test_stale_epoch_is_region_stale() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::failed(RegionError::StaleEpoch {
            new_regions: vec![Region::new(42, "", "m"), Region::new(43, "m", "")],
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::RegionStale);
        assert!(failure.requires_region_reload());
        assert_eq!(fx.cache.calls(), vec![CacheCall::MarkRegionStale(42)]);
        assert!(fx.receiver.is_empty());
        assert!(fx.manager().lookup_store(7).is_some());
        assert!(fx.manager().is_stale(42));
    }

    #[test]
    fn test_store_not_match_drops_region_and_store() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::failed(RegionError::StoreNotMatch {
            request_store_id: 7,
            actual_store_id: 8,
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(fx.cache.count(CacheCall::InvalidateRegion(42)), 1);
        assert_eq!(fx.cache.count(CacheCall::InvalidateStore(7)), 1);
        assert_eq!(fx.cache.calls().len(), 2);
        assert_eq!(fx.receiver.notifications(), vec![Notification::RoutingInvalidated]);
        assert!(fx.manager().lookup_region(42).is_none());
        assert!(fx.manager().lookup_store(7).is_none());
    }

    #[test]
    fn test_unrecognized_error_invalidates_like_store_not_match() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::failed(RegionError::Other {
            message: "region_not_found".into(),
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert!(failure.description.contains("region_not_found"));
        assert_eq!(
            fx.cache.calls(),
            vec![CacheCall::InvalidateRegion(42), CacheCall::InvalidateStore(7)]
        );
        assert!(fx.receiver.is_empty());
    }

    #[test]
    fn test_unrecognized_error_with_fatal_policy() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::failed(RegionError::Other {
            message: "data_corrupted".into(),
        });
        let config = HandlerConfig::new().with_unknown_error_policy(UnknownErrorPolicy::Fatal);

        let failure = fx
            .handler(42)
            .with_config(config)
            .handle(Some(&resp))
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Fatal);
        assert!(!failure.is_retryable());
        assert!(fx.manager().lookup_region(42).is_none());
    }

    #[test]
    fn test_transient_errors_leave_cache_alone() {
        let errors = vec![
            RegionError::ServerIsBusy {
                reason: "scheduler busy".into(),
                backoff_ms: 20,
            },
            RegionError::StaleCommand,
            RegionError::RaftEntryTooLarge {
                region_id: 42,
                entry_size: 16 * 1024 * 1024,
            },
        ];

        for error in errors {
            let fx = Fixture::new(42, 7);
            let resp = KvResponse::failed(error.clone());
            let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();

            assert_eq!(failure.kind, FailureKind::Unavailable, "{}", error);
            assert!(fx.cache.calls().is_empty(), "{}", error);
            assert!(fx.receiver.is_empty(), "{}", error);
            assert!(failure.description.contains(&error.to_string()));
        }
    }

    #[test]
    fn test_key_not_in_region_describes_key() {
        let fx = Fixture::new(42, 7);
        let resp = KvResponse::failed(RegionError::KeyNotInRegion {
            key: Bytes::from_static(b"t\x80_r\x01"),
            region_id: 42,
            start_key: Bytes::from_static(b"a"),
            end_key: Bytes::from_static(b"m"),
        });

        let failure = fx.handler(42).handle(Some(&resp)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert!(
            failure.description.contains("t\\x80_r\\x01"),
            "description: {}",
            failure.description
        );
        assert!(fx.cache.calls().is_empty());
        assert!(fx.receiver.is_empty());
    }

    #[test]
    fn test_metrics_by_kind() {
        let fx = Fixture::new(42, 7);
        let stale = KvResponse::failed(RegionError::StaleEpoch { new_regions: vec![] });
        let _ = fx.handler(42).handle(Some(&stale));

        assert_eq!(fx.metrics.region_errors.get(["stale_epoch"]), 1);
        assert_eq!(fx.metrics.failures.get(["region_stale"]), 1);
        assert_eq!(fx.metrics.count(RoutingEvent::RegionMarkedStale), 1);
    }

    /// Checks, from inside the callback, that the cache was updated first.
    struct CacheCheckingReceiver {
        manager: Arc<RegionManager>,
        observed_leader: parking_lot::Mutex<Option<StoreId>>,
        region_present_on_invalidate: parking_lot::Mutex<Option<bool>>,
    }

    impl RegionErrorReceiver for CacheCheckingReceiver {
        fn on_leader_changed(&self, region: &Region, _store: &Store) {
            let cached = self.manager.lookup_region(region.id).and_then(|r| r.leader_store_id());
            *self.observed_leader.lock() = cached;
        }

        fn on_routing_invalidated(&self) {
            *self.region_present_on_invalidate.lock() = Some(self.manager.lookup_region(42).is_some());
        }
    }

    #[test]
    fn test_cache_is_updated_before_notification() {
        let manager = Arc::new(three_replica_cluster(42, 5));
        let receiver = Arc::new(CacheCheckingReceiver {
            manager: Arc::clone(&manager),
            observed_leader: parking_lot::Mutex::new(None),
            region_present_on_invalidate: parking_lot::Mutex::new(None),
        });
        let ctx = RequestContext::for_leader(manager.lookup_region(42).unwrap()).unwrap();

        let handler = RegionErrorHandler::new(manager.clone(), receiver.clone(), ctx.clone(), extract);
        let resp = KvResponse::failed(RegionError::NotLeader {
            region_id: 42,
            leader: Some(Peer::new(4201, 6)),
        });
        assert!(handler.handle(Some(&resp)).is_err());
        assert_eq!(*receiver.observed_leader.lock(), Some(6));

        let handler = RegionErrorHandler::new(manager.clone(), receiver.clone(), ctx, extract);
        let resp = KvResponse::failed(RegionError::StoreNotMatch {
            request_store_id: 5,
            actual_store_id: 6,
        });
        assert!(handler.handle(Some(&resp)).is_err());
        assert_eq!(*receiver.region_present_on_invalidate.lock(), Some(false));
    }

    #[test]
    fn test_closure_extractor_and_noop_receiver() {
        let manager = Arc::new(three_replica_cluster(1, 1));
        let ctx = RequestContext::for_leader(manager.lookup_region(1).unwrap()).unwrap();
        let handler = RegionErrorHandler::new(
            manager.clone(),
            Arc::new(NoopReceiver),
            ctx,
            |resp: &Option<RegionError>| resp.clone(),
        );

        assert!(handler.handle(Some(&None)).is_ok());
        let failure = handler
            .handle(Some(&Some(RegionError::StaleCommand)))
            .unwrap_err();
        assert_eq!(failure.description, "region 1: stale_command");
        assert_eq!(handler.context().region_id(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_not_match_is_idempotent() {
        let fx = Arc::new(Fixture::new(42, 7));
        let ctx = RequestContext::for_leader(fx.cache.lookup_region(42).unwrap()).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let fx = Arc::clone(&fx);
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let handler = RegionErrorHandler::new(
                    fx.cache.clone(),
                    fx.receiver.clone(),
                    ctx,
                    extract,
                );
                let resp = KvResponse::failed(RegionError::StoreNotMatch {
                    request_store_id: 7,
                    actual_store_id: 8,
                });
                handler.handle(Some(&resp)).unwrap_err().kind
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), FailureKind::Unavailable);
        }

        assert_eq!(fx.cache.count(CacheCall::InvalidateRegion(42)), 32);
        assert_eq!(fx.metrics.count(RoutingEvent::RegionInvalidated), 1);
        assert_eq!(fx.metrics.count(RoutingEvent::StoreInvalidated), 1);
        assert_eq!(fx.receiver.notifications().len(), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_not_leader_converges() {
        let fx = Arc::new(Fixture::new(42, 5));
        let ctx = RequestContext::for_leader(fx.cache.lookup_region(42).unwrap()).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let fx = Arc::clone(&fx);
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let handler = RegionErrorHandler::new(
                    fx.cache.clone(),
                    fx.receiver.clone(),
                    ctx,
                    extract,
                );
                let resp = KvResponse::failed(RegionError::NotLeader {
                    region_id: 42,
                    leader: Some(Peer::new(4202, 7)),
                });
                handler.handle(Some(&resp)).is_err()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(fx.metrics.count(RoutingEvent::LeaderUpdated), 1);
        assert_eq!(
            fx.manager().lookup_region(42).unwrap().leader_store_id(),
            Some(7)
        );
        assert!(fx
            .receiver
            .notifications()
            .iter()
            .all(|n| matches!(n, Notification::LeaderChanged { store, .. } if store.id == 7)));
    }
}
