//! End-to-end flow: CSV export → normalize → store → file-drop results →
//! settle. Exercises the real source and feed implementations against a
//! fresh in-memory database, including a second cycle to prove the whole
//! pipeline is idempotent.

use std::path::PathBuf;
use std::sync::Arc;

use baken::config::LookupTables;
use baken::engine::normalizer::Normalizer;
use baken::engine::sync::Syncer;
use baken::ingest::csv::CsvExportSource;
use baken::ingest::TicketSource;
use baken::results::file::FileResultFeed;
use baken::storage::TicketStore;

const EXPORT: &str = "\
ご購入履歴,,,,,,,
日付,場名,レース,式別,馬／組番,購入金額,払戻金額,的中／返還
20240114,中山,11,単勝,05,100,0,
20240114,中山,11,馬連ＢＯＸ,03；05；08,100／300,0,
20240114,中山,11,３連単１着ながし,05／03；08,100,0,
20240114,中山,11,複勝,12,100,0,
20240114,東京,10,単勝,07,100,0,
合計,,,,,600,0,
";

const NAKAYAMA_11R_RESULT: &str = r#"{
    "race_id": "202401140611",
    "finishers": [5, 3, 8],
    "payouts": {
        "WIN": [{"horses": [5], "payout_per_100": 250}],
        "PLACE": [
            {"horses": [5], "payout_per_100": 110},
            {"horses": [3], "payout_per_100": 180},
            {"horses": [8], "payout_per_100": 300}
        ],
        "QUINELLA": [{"horses": [3, 5], "payout_per_100": 540}],
        "TRIFECTA": [{"horses": [5, 3, 8], "payout_per_100": 5670}]
    }
}"#;

struct Dirs {
    exports: PathBuf,
    results: PathBuf,
}

async fn setup_dirs() -> Dirs {
    let root = std::env::temp_dir().join(format!("baken_flow_{}", uuid::Uuid::new_v4()));
    let dirs = Dirs {
        exports: root.join("exports"),
        results: root.join("results"),
    };
    tokio::fs::create_dir_all(&dirs.exports).await.unwrap();
    tokio::fs::create_dir_all(&dirs.results).await.unwrap();
    tokio::fs::write(dirs.exports.join("20240114.csv"), EXPORT)
        .await
        .unwrap();
    dirs
}

async fn make_syncer(dirs: &Dirs, store: TicketStore) -> Syncer {
    let sources: Vec<Arc<dyn TicketSource>> =
        vec![Arc::new(CsvExportSource::new(&dirs.exports))];
    Syncer::new(
        sources,
        Arc::new(FileResultFeed::new(&dirs.results)),
        store,
        Normalizer::new(LookupTables::default()),
    )
}

#[tokio::test]
async fn full_cycle_settles_decided_race_and_keeps_the_rest_pending() {
    let dirs = setup_dirs().await;
    let store = TicketStore::in_memory().await.unwrap();
    let syncer = make_syncer(&dirs, store.clone()).await;

    // Cycle 1, before any result is published: everything stays pending.
    let sync = syncer.sync_tickets().await;
    assert_eq!(sync.fetched, 5);
    assert_eq!(sync.written, 5);
    assert_eq!(sync.source_errors, 0);
    assert_eq!(store.pending_count().await.unwrap(), 5);

    let settle = syncer.settle_pending().await;
    assert_eq!(settle.races_checked, 2);
    assert_eq!(settle.races_resolved, 0);
    assert_eq!(store.pending_count().await.unwrap(), 5);

    // The 中山 11R result lands in the drop directory.
    tokio::fs::write(dirs.results.join("202401140611.json"), NAKAYAMA_11R_RESULT)
        .await
        .unwrap();

    // Cycle 2: the four 中山 tickets settle, the 東京 one stays pending.
    let settle = syncer.settle_pending().await;
    assert_eq!(settle.races_checked, 2);
    assert_eq!(settle.races_resolved, 1);
    assert_eq!(settle.wins, 3);
    assert_eq!(settle.losses, 1);
    // WIN straight 250 + quinella box 540 + fixed-position nagashi 5670.
    assert_eq!(settle.total_payout, 250 + 540 + 5670);
    assert_eq!(store.pending_count().await.unwrap(), 1);

    let leftover = store.pending_for_race("202401140510").await.unwrap();
    assert_eq!(leftover.len(), 1);
}

#[tokio::test]
async fn resync_of_the_same_export_is_idempotent() {
    let dirs = setup_dirs().await;
    let store = TicketStore::in_memory().await.unwrap();
    let syncer = make_syncer(&dirs, store.clone()).await;

    syncer.sync_tickets().await;
    tokio::fs::write(dirs.results.join("202401140611.json"), NAKAYAMA_11R_RESULT)
        .await
        .unwrap();
    syncer.settle_pending().await;

    // The same export file is still in the directory; a later cycle
    // re-reads it. Settled rows must not regress to pending.
    let resync = syncer.sync_tickets().await;
    assert_eq!(resync.fetched, 5);
    assert_eq!(resync.blocked_settled, 4);
    assert_eq!(resync.written, 1);
    assert_eq!(store.pending_count().await.unwrap(), 1);

    let settle = syncer.settle_pending().await;
    assert_eq!(settle.races_checked, 1);
    assert_eq!(settle.races_resolved, 0);
    assert_eq!(settle.wins, 0);
}
