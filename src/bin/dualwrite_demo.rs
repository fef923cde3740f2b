//! dualwrite-demo: walks the three write patterns against configured stores.
//!
//! Each pattern writes one record and one session entry, once cleanly and
//! once with the relational write forced to fail, then logs what each store
//! holds afterwards.
//!
//! ## Configuration
//! - First argument: path to a YAML config file (optional)
//! - DUALWRITE_CONFIG: config file path (optional)
//! - DUALWRITE__*: overrides, e.g. DUALWRITE__CACHE__TYPE=redis
//! - DUALWRITE_LOG: tracing filter (default: info)

use tracing::{info, warn};

use dualwrite::cache::{init_cache, CacheEntry};
use dualwrite::config::Config;
use dualwrite::coordinator::{FaultHook, FaultPoint, WriteCoordinator};
use dualwrite::model::{Record, Session};
use dualwrite::storage::init_storage;
use dualwrite::utils::bootstrap::init_tracing;

#[derive(Debug, Clone, Copy)]
enum Pattern {
    BoundaryOnly,
    CommitInside,
    CommitDeferred,
    CommitDeferredThenCommit,
}

impl Pattern {
    const ALL: [Pattern; 4] = [
        Pattern::BoundaryOnly,
        Pattern::CommitInside,
        Pattern::CommitDeferred,
        Pattern::CommitDeferredThenCommit,
    ];
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;

    let store = init_storage(&config.storage).await?;
    let cache = init_cache(&config.cache).await?;
    let coordinator = WriteCoordinator::new(store, cache, config.transaction.options());

    info!(
        storage = ?config.storage.storage_type,
        cache = ?config.cache.cache_type,
        "dualwrite-demo started"
    );

    let mut next_user = 1_000i64;
    for pattern in Pattern::ALL {
        for fault in [
            FaultHook::none(),
            FaultHook::fail_at(FaultPoint::AfterRelationalWrite),
        ] {
            next_user += 1;
            run(&coordinator, pattern, next_user, fault).await?;
        }
    }

    Ok(())
}

async fn run(
    coordinator: &WriteCoordinator,
    pattern: Pattern,
    user_id: i64,
    fault: FaultHook,
) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = format!("session-{user_id}");
    let record = Record::new(user_id, format!("user-{user_id}"));
    let entry = CacheEntry::encode(&session_id, &Session::new(&session_id, user_id))?;

    let outcome = match pattern {
        Pattern::BoundaryOnly => coordinator
            .write_boundary_only(record, entry, fault)
            .await
            .map(|_| ()),
        Pattern::CommitInside => coordinator
            .write_commit_inside(record, entry, fault)
            .await
            .map(|_| ()),
        Pattern::CommitDeferred => {
            let deferred = coordinator
                .write_commit_deferred(record, entry, fault)
                .await?;
            deferred.finish().await.map(|_| ())
        }
        Pattern::CommitDeferredThenCommit => {
            let deferred = coordinator
                .write_commit_deferred(record, entry, fault)
                .await?;
            // Commits regardless of the relational outcome.
            deferred.pending.commit().await?;
            deferred.relational.map(|_| ())
        }
    };

    if let Err(err) = &outcome {
        warn!(?pattern, error = %err, "Unit of work failed");
    }

    let relational = coordinator.records().find_by_id(user_id).await?.is_some();
    let cached = coordinator.cache().get(&session_id).await?.is_some();
    let consistent = relational == cached;

    info!(
        ?pattern,
        ?fault,
        relational,
        cached,
        consistent,
        "Stores after write"
    );
    Ok(())
}
