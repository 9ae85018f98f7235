//! End-to-end cross-seed scenarios driven through the public API against
//! an in-memory client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockClient, complete_snapshot, multi_file_torrent, single_file_torrent};
use seedcross::client::FileEntry;
use seedcross::db::{CreateInstance, Database};
use seedcross::executor::{CrossSeedOptions, CrossSeedStatus, ExecutorTiming};
use seedcross::release::ReleaseCache;
use seedcross::service::CrossSeedService;

const SPACED: &str = "The Green Mile 1999 BluRay 1080p DTS 5.1 x264-VietHD";
const DOTTED: &str = "The.Green.Mile.1999.BluRay.1080p.DTS.5.1.x264-VietHD";

fn fast_timing() -> ExecutorTiming {
    ExecutorTiming {
        visibility_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
        recheck_timeout: Duration::from_millis(500),
        recheck_poll_interval: Duration::from_millis(10),
    }
}

async fn database_with_instance(create: CreateInstance) -> (Database, i64) {
    let db = Database::connect_in_memory().await.unwrap();
    let instance = db.instances().create(&create).await.unwrap();
    (db, instance.id)
}

fn plain_instance(name: &str) -> CreateInstance {
    CreateInstance {
        name: name.to_string(),
        enabled: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_movie_with_punctuation_difference_is_added_directly() {
    let (db, instance_id) = database_with_instance(plain_instance("main")).await;
    let client = MockClient::new();

    // The dotted flavor is complete on the client
    let mut candidate = complete_snapshot("cand00000001", DOTTED, 1434, "/downloads");
    candidate.category = "movies".to_string();
    client.add_snapshot(instance_id, candidate);
    client.set_files(
        instance_id,
        "cand00000001",
        vec![
            FileEntry {
                path: format!("{}/{}.mkv", DOTTED, DOTTED),
                size: 1234,
            },
            FileEntry {
                path: format!("{}/extras.mkv", DOTTED),
                size: 200,
            },
        ],
    );

    // The spaced flavor arrives from elsewhere
    let incoming = multi_file_torrent(
        SPACED,
        &[(&format!("{}.mkv", SPACED), 1234), ("extras.mkv", 200)],
        None,
    );

    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], CrossSeedOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.status, CrossSeedStatus::Added, "{}", result.message);
    assert_eq!(result.matched_hash.as_deref(), Some("cand00000001"));
    assert_eq!(result.expected_progress, Some(1.0));

    let state = client.state.lock();
    assert_eq!(state.added.len(), 1);
    let (_, options, _) = &state.added[0];
    assert!(options.skip_checking);
    assert_eq!(options.save_path.as_deref(), Some("/downloads"));
    assert!(options.tags.contains(&"cross-seed".to_string()));
    // Category inherited from the matched torrent
    assert_eq!(options.category.as_deref(), Some("movies"));

    // Alignment renamed the display and the differently punctuated file
    assert_eq!(state.renamed_torrents.len(), 1);
    assert_eq!(state.renamed_torrents[0].1, DOTTED);
    assert!(state.renamed_files.len() >= 2, "root and file renames expected");
}

#[tokio::test]
async fn test_existing_torrent_reports_exists_without_adding() {
    let (db, instance_id) = database_with_instance(plain_instance("main")).await;
    let client = MockClient::new();

    let incoming = single_file_torrent("movie.mkv", 5000);
    let meta = seedcross::torrents::parse_torrent(&incoming).unwrap();
    client.add_snapshot(
        instance_id,
        complete_snapshot(&meta.infohash_v1, "movie.mkv", 5000, "/downloads"),
    );

    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], CrossSeedOptions::default())
        .await
        .unwrap();

    assert_eq!(results[0].status, CrossSeedStatus::Exists);
    assert_eq!(client.added_count(), 0);
}

#[tokio::test]
async fn test_no_candidate_reports_no_match() {
    let (db, instance_id) = database_with_instance(plain_instance("main")).await;
    let client = MockClient::new();

    let incoming = multi_file_torrent("Totally.Unrelated.2021.1080p.WEB-DL", &[("x.mkv", 77)], None);
    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], CrossSeedOptions::default())
        .await
        .unwrap();

    assert_eq!(results[0].status, CrossSeedStatus::NoMatch);
    assert_eq!(client.added_count(), 0);
}

#[tokio::test]
async fn test_unsafe_reuse_without_link_modes_requires_links() {
    let (db, instance_id) = database_with_instance(plain_instance("main")).await;
    let client = MockClient::new();

    // Candidate carries a bonus file the new torrent has no counterpart for
    client.add_snapshot(
        instance_id,
        complete_snapshot("cand00000002", "Film.2020.1080p.BluRay.x264-GRP", 1700, "/downloads"),
    );
    client.set_files(
        instance_id,
        "cand00000002",
        vec![
            FileEntry { path: "Film.2020/film.mkv".to_string(), size: 1000 },
            FileEntry { path: "Film.2020/bonus.mkv".to_string(), size: 700 },
        ],
    );

    let incoming = multi_file_torrent("Film.2020.1080p.BluRay.x264-GRP", &[("film.mkv", 1000)], None);

    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], CrossSeedOptions::default())
        .await
        .unwrap();

    assert_eq!(results[0].status, CrossSeedStatus::RequiresHardlinkReflink);
    assert_eq!(client.added_count(), 0);
}

#[tokio::test]
async fn test_reflink_misconfiguration_fails_before_add() {
    // Reflinks enabled but no base directory configured
    let (db, instance_id) = database_with_instance(CreateInstance {
        name: "reflink".to_string(),
        enabled: true,
        has_local_filesystem_access: true,
        use_reflinks: true,
        fallback_to_regular_mode: false,
        hardlink_base_dir: String::new(),
        hardlink_dir_preset: "flat".to_string(),
        ..Default::default()
    })
    .await;
    let client = MockClient::new();

    client.add_snapshot(
        instance_id,
        complete_snapshot("cand00000003", "Film.2020.1080p.BluRay.x264-GRP", 1700, "/downloads"),
    );
    client.set_files(
        instance_id,
        "cand00000003",
        vec![
            FileEntry { path: "Film.2020/film.mkv".to_string(), size: 1000 },
            FileEntry { path: "Film.2020/bonus.mkv".to_string(), size: 700 },
        ],
    );

    // Rootless incoming torrent whose match leaves extras behind
    let incoming = multi_file_torrent("Film.2020.1080p.BluRay.x264-GRP", &[("film.mkv", 1000)], None);

    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], CrossSeedOptions::default())
        .await
        .unwrap();

    let result = &results[0];
    assert_eq!(result.status, CrossSeedStatus::ReflinkError, "{}", result.message);
    assert_ne!(result.status, CrossSeedStatus::RequiresHardlinkReflink);
    assert_eq!(client.added_count(), 0, "AddTorrent must never be called");
}

#[tokio::test]
async fn test_episode_added_from_season_pack_without_display_rename() {
    let (db, instance_id) = database_with_instance(plain_instance("main")).await;
    let client = MockClient::new();

    let pack_name = "Show.S01.1080p.WEB-DL.x264-GROUP";
    let pack_files: Vec<FileEntry> = (1..=10)
        .map(|e| FileEntry {
            path: format!("{}/Show.S01E{:02}.1080p.WEB-DL.x264-GROUP.mkv", pack_name, e),
            size: 500,
        })
        .collect();
    client.add_snapshot(
        instance_id,
        complete_snapshot("pack00000001", pack_name, 5000, "/downloads/tv"),
    );
    client.set_files(instance_id, "pack00000001", pack_files);

    let incoming = multi_file_torrent(
        "Show.S01E05.1080p.WEB-DL.x264-GROUP",
        &[("Show.S01E05.1080p.WEB-DL.x264-GROUP.mkv", 500)],
        None,
    );

    let mut options = CrossSeedOptions::default();
    options.find_individual_episodes = true;

    let service = CrossSeedService::new(db, client.clone(), Arc::new(ReleaseCache::default()))
        .with_timing(fast_timing());
    let results = service
        .cross_seed(incoming, None, None, &[instance_id], options)
        .await
        .unwrap();

    let result = &results[0];
    assert_eq!(result.status, CrossSeedStatus::Added, "{}", result.message);
    assert_eq!(result.matched_hash.as_deref(), Some("pack00000001"));

    let state = client.state.lock();
    assert_eq!(state.added.len(), 1);
    // An episode is never renamed into the pack's display name, and its
    // files are never folded into the pack layout
    assert!(state.renamed_torrents.is_empty());
    assert!(state.renamed_files.is_empty());
    // It attaches at the pack's save path
    assert_eq!(state.added[0].1.save_path.as_deref(), Some("/downloads/tv"));
}
