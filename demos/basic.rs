//! Basic example of routing requests through the region cache.
//!
//! A simulated backend moves a leader and then splits a region. Each attempt
//! is classified by the error handler, which repairs the cache before the
//! next attempt.

use parking_lot::Mutex;
use region_router::handler::{RegionErrorHandler, RegionErrorReceiver, RequestContext};
use region_router::region::{Peer, Region, RegionCache, RegionEpoch, RegionError, RegionManager, Store};
use region_router::{FailureKind, RequestFailure, RoutingMetrics, StoreId};
use std::sync::Arc;

const MAX_ATTEMPTS: usize = 4;

/// What a store answers for a read.
#[derive(Debug, Clone)]
enum Reply {
    Value(String),
    Rejected(RegionError),
}

/// The cluster as it really is, as opposed to what the client has cached.
struct Backend {
    leader: Mutex<StoreId>,
    split: Mutex<bool>,
}

impl Backend {
    fn epoch(&self) -> RegionEpoch {
        if *self.split.lock() {
            RegionEpoch::new(1, 2)
        } else {
            RegionEpoch::new(1, 1)
        }
    }

    /// Region layout as the placement driver would report it.
    fn regions(&self) -> Vec<Region> {
        let leader = *self.leader.lock();
        let replicas = |region: Region| {
            (1..=3)
                .fold(region, |r, store| {
                    let peer = Peer::new(r.id * 100 + store, store);
                    r.with_peer(peer)
                })
                .with_epoch(self.epoch())
                .with_leader(leader)
        };
        if *self.split.lock() {
            vec![replicas(Region::new(42, "", "m")), replicas(Region::new(43, "m", ""))]
        } else {
            vec![replicas(Region::new(42, "", ""))]
        }
    }

    fn serve(&self, ctx: &RequestContext, key: &[u8]) -> Reply {
        if ctx.region().epoch.is_stale_against(&self.epoch()) {
            return Reply::Rejected(RegionError::StaleEpoch { new_regions: self.regions() });
        }
        let leader = *self.leader.lock();
        if ctx.store_id() != leader {
            return Reply::Rejected(RegionError::NotLeader {
                region_id: ctx.region_id(),
                leader: ctx.region().peer_on_store(leader),
            });
        }
        Reply::Value(format!("value-of-{}", String::from_utf8_lossy(key)))
    }
}

/// Prints routing notifications as they arrive.
struct PrintingReceiver;

impl RegionErrorReceiver for PrintingReceiver {
    fn on_leader_changed(&self, region: &Region, store: &Store) {
        println!("  -> region {} now led from {}", region.id, store.address);
    }

    fn on_routing_invalidated(&self) {
        println!("  -> routing invalidated, re-resolving");
    }
}

fn load_regions(cache: &RegionManager, backend: &Backend) {
    for region in backend.regions() {
        cache.insert_region(region);
    }
}

fn get(
    cache: &Arc<RegionManager>,
    backend: &Backend,
    metrics: &Arc<RoutingMetrics>,
    key: &[u8],
) -> Result<String, RequestFailure> {
    let mut last_failure = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let region = match cache.region_for_key(key) {
            Some(region) => region,
            None => {
                load_regions(cache, backend);
                cache
                    .region_for_key(key)
                    .ok_or_else(|| RequestFailure::fatal("no region covers the key"))?
            }
        };
        let ctx = RequestContext::for_leader(region)
            .ok_or_else(|| RequestFailure::unavailable("region has no known leader"))?;
        println!("attempt {}: region {} on store {}", attempt, ctx.region_id(), ctx.store_id());

        let reply = backend.serve(&ctx, key);
        let cache_handle: Arc<dyn RegionCache> = cache.clone();
        let handler = RegionErrorHandler::new(
            cache_handle,
            Arc::new(PrintingReceiver),
            ctx,
            |reply: &Reply| match reply {
                Reply::Rejected(err) => Some(err.clone()),
                Reply::Value(_) => None,
            },
        )
        .with_metrics(Arc::clone(metrics));

        match handler.handle(Some(&reply)) {
            Ok(()) => {
                if let Reply::Value(value) = reply {
                    return Ok(value);
                }
            }
            Err(failure) if failure.kind == FailureKind::Fatal => return Err(failure),
            Err(failure) => {
                println!("  failed: {}", failure);
                last_failure = Some(failure);
            }
        }
    }
    Err(last_failure.unwrap_or_else(|| RequestFailure::unavailable("attempts exhausted")))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("region_router=debug,info")
        .init();

    let metrics = Arc::new(RoutingMetrics::new());
    let cache = Arc::new(RegionManager::with_defaults().with_metrics(Arc::clone(&metrics)));
    for id in 1..=3 {
        cache.insert_store(Store::new(id, format!("127.0.0.1:2016{}", id)));
    }

    let backend = Backend {
        leader: Mutex::new(1),
        split: Mutex::new(false),
    };
    load_regions(&cache, &backend);

    println!("--- Leader moves from store 1 to store 2 ---");
    *backend.leader.lock() = 2;
    let value = get(&cache, &backend, &metrics, b"user:1")?;
    println!("got {}", value);

    println!("\n--- Region 42 splits at \"m\" ---");
    *backend.split.lock() = true;
    let value = get(&cache, &backend, &metrics, b"user:2")?;
    println!("got {}", value);
    println!("cached regions: {}", cache.len());

    println!("\n--- Metrics ---");
    print!("{}", metrics.to_prometheus());

    Ok(())
}
