//! Cross-cluster search and point-in-time tests

mod common;

use common::{cluster, FaultyTransport};
use fanout::index::{Document, ShardId};
use fanout::query::{PointInTimeRef, SearchRequest, SortField, SortSpec};
use fanout::search::TotalHits;
use fanout::Config;
use fanout_cluster::{
    ClusterStatus, CoordinatorConfig, CrossClusterSearch, LocalTransport, PointInTimeId,
    RemoteClusterConfig, LOCAL_CLUSTER_ALIAS,
};
use std::sync::Arc;
use std::time::Duration;

fn remote_config(skip_unavailable: bool) -> CoordinatorConfig {
    CoordinatorConfig {
        remote_clusters: vec![RemoteClusterConfig {
            alias: "eu".into(),
            skip_unavailable,
        }],
        ..Default::default()
    }
}

fn local_only(local: &Arc<LocalTransport>) -> CrossClusterSearch {
    CrossClusterSearch::new(local.clone(), CoordinatorConfig::default(), &Config::default())
}

fn with_remote(local: Arc<LocalTransport>, skip_unavailable: bool) -> CrossClusterSearch {
    CrossClusterSearch::new(local, remote_config(skip_unavailable), &Config::default())
}

fn pit_request(id: &str) -> SearchRequest {
    SearchRequest {
        pit: Some(PointInTimeRef {
            id: id.to_string(),
            keep_alive_ms: None,
        }),
        ..SearchRequest::new(Vec::new())
    }
}

#[tokio::test]
async fn test_point_in_time_across_clusters_with_failed_remote_shard() {
    let local = cluster("local", "events", &[4, 4]);
    let remote =
        FaultyTransport::new(cluster("eu", "events", &[3, 3, 3])).fail(ShardId::new("events", 0));
    let mut search = with_remote(local.clone(), false);
    search.add_remote("eu", Arc::new(remote)).unwrap();

    let id = search
        .open_point_in_time(&["events".into(), "eu:events".into()], None)
        .await
        .unwrap();
    assert_eq!(PointInTimeId::decode(&id).unwrap().entries.len(), 5);

    let response = search.search(pit_request(&id).with_size(20)).await.unwrap();
    assert_eq!(response.pit_id.as_deref(), Some(id.as_str()));
    assert_eq!(response.shards.total, 5);
    assert_eq!(response.shards.successful, 4);
    assert_eq!(response.shards.failed, 1);
    assert_eq!(response.total_hits, Some(TotalHits::exact(14)));

    let clusters = response.clusters.expect("remote cluster took part");
    assert_eq!(clusters.total, 2);
    assert_eq!(clusters.successful, 1);
    assert_eq!(clusters.partial, 1);
    let eu = clusters.get("eu").unwrap();
    assert_eq!(eu.status, ClusterStatus::Partial);
    assert_eq!(eu.total_shards, 3);
    assert_eq!(eu.successful_shards, 2);
    assert_eq!(eu.failed_shards, 1);
    assert_eq!(
        clusters.get(LOCAL_CLUSTER_ALIAS).unwrap().status,
        ClusterStatus::Successful
    );
    assert!(response.hits.iter().any(|h| h.cluster == "eu"));

    let closed = search.close_point_in_time(&id).await.unwrap();
    assert!(closed.succeeded);
    assert_eq!(closed.num_freed, 5);
    assert_eq!(local.open_contexts(), 0);
}

#[tokio::test]
async fn test_point_in_time_pins_readers() {
    let local = cluster("local", "events", &[5]);
    let search = local_only(&local);
    let id = search
        .open_point_in_time(&["events".into()], Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let shard = local.shard(&ShardId::new("events", 0)).unwrap();
    shard
        .index(Document::new("late").with_long("rank", 1000))
        .unwrap();
    shard.refresh();

    let pinned = search.search(pit_request(&id)).await.unwrap();
    assert_eq!(pinned.total_hits, Some(TotalHits::exact(5)));
    assert!(pinned.clusters.is_none());

    let live = search
        .search(SearchRequest::new(vec!["events".into()]))
        .await
        .unwrap();
    assert_eq!(live.total_hits, Some(TotalHits::exact(6)));

    search.close_point_in_time(&id).await.unwrap();
    let err = search.search(pit_request(&id)).await.unwrap_err();
    assert_eq!(err.error_type(), "all_shards_failed");
}

#[tokio::test]
async fn test_failed_point_in_time_open_releases_contexts() {
    let local = cluster("local", "events", &[2, 2]);
    let remote_inner = cluster("eu", "events", &[2, 2]);
    let remote =
        FaultyTransport::new(remote_inner.clone()).refuse_contexts(ShardId::new("events", 1));
    let mut search = with_remote(local.clone(), false);
    search.add_remote("eu", Arc::new(remote)).unwrap();

    let err = search
        .open_point_in_time(&["events".into(), "eu:events".into()], None)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "transport");
    assert_eq!(local.open_contexts(), 0);
    assert_eq!(remote_inner.open_contexts(), 0);
}

#[tokio::test]
async fn test_close_with_unreachable_cluster() {
    let local = cluster("local", "events", &[1]);
    let remote = cluster("eu", "events", &[1, 1]);
    let mut search = with_remote(local.clone(), false);
    search.add_remote("eu", remote.clone()).unwrap();

    let id = search
        .open_point_in_time(&["events".into(), "eu:events".into()], None)
        .await
        .unwrap();
    remote.set_available(false);

    let closed = search.close_point_in_time(&id).await.unwrap();
    assert!(!closed.succeeded);
    assert_eq!(closed.num_freed, 1);

    remote.set_available(true);
    let again = search.close_point_in_time(&id).await.unwrap();
    assert!(again.succeeded);
    assert_eq!(again.num_freed, 2);
}

#[tokio::test]
async fn test_remote_with_every_shard_failed() {
    let local = cluster("local", "events", &[3]);
    let remote = FaultyTransport::new(cluster("eu", "events", &[2, 2]))
        .fail(ShardId::new("events", 0))
        .fail(ShardId::new("events", 1));
    let mut search = CrossClusterSearch::new(local, remote_config(false), &Config::default());
    search.add_remote("eu", Arc::new(remote)).unwrap();

    let response = search
        .search(SearchRequest::new(vec!["events".into(), "eu:events".into()]))
        .await
        .unwrap();
    let clusters = response.clusters.unwrap();
    assert_eq!(clusters.failed, 1);
    assert_eq!(clusters.get("eu").unwrap().status, ClusterStatus::Failed);
    assert_eq!(response.total_hits, Some(TotalHits::exact(3)));
    assert_eq!(response.shards.failed, 2);
}

#[tokio::test]
async fn test_skip_unavailable_remote() {
    let remote = cluster("eu", "events", &[2]);
    remote.set_available(false);
    let mut search = with_remote(cluster("local", "events", &[2]), true);
    search.add_remote("eu", remote).unwrap();

    let response = search
        .search(SearchRequest::new(vec!["events".into(), "eu:events".into()]))
        .await
        .unwrap();
    let clusters = response.clusters.unwrap();
    assert_eq!(clusters.total, 2);
    assert_eq!(clusters.skipped, 1);
    assert_eq!(clusters.successful, 1);
    assert_eq!(response.shards.total, 1);
    assert!(response.shards.failures.is_empty());
}

#[tokio::test]
async fn test_global_sort_interleaves_clusters() {
    let mut search = with_remote(cluster("local", "events", &[5]), false);
    search.add_remote("eu", cluster("eu", "events", &[5])).unwrap();

    let request = SearchRequest::new(vec!["events".into(), "eu:events".into()])
        .with_sort(SortSpec::by(SortField::asc("rank")))
        .with_size(4);
    let response = search.search(request).await.unwrap();

    // equal ranks come from both clusters; the local cluster sorts first
    let clusters: Vec<&str> = response.hits.iter().map(|h| h.cluster.as_str()).collect();
    assert_eq!(clusters, vec![LOCAL_CLUSTER_ALIAS, "eu", LOCAL_CLUSTER_ALIAS, "eu"]);
    assert_eq!(response.total_hits, Some(TotalHits::exact(10)));
    // one reduce per cluster plus the global one
    assert_eq!(response.num_reduce_phases, 3);
}

#[tokio::test]
async fn test_abandoned_point_in_time_releases_readers() {
    let local = cluster("local", "events", &[3, 3]);
    let search = local_only(&local);

    for _ in 0..50 {
        search
            .open_point_in_time(&["events".into()], Some(Duration::from_millis(1)))
            .await
            .unwrap();
    }
    assert!(local.open_contexts() > 0);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let response = search
        .search(SearchRequest::new(vec!["events".into()]))
        .await
        .unwrap();
    assert_eq!(response.total_hits, Some(TotalHits::exact(6)));
    assert_eq!(local.open_contexts(), 0);
}
