//! Postgres-backed repository coverage.
//!
//! Needs a database with the `vector` extension available; run with
//! `DATABASE_URL=... cargo test --test live_store -- --ignored`.

use aggregator::application::repos::{GroupsRepo, RecentQuery, RepoError, ViewCountsRepo};
use aggregator::domain::entities::ViewDelta;
use aggregator::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

async fn insert_feed(pool: &PgPool, title: &str, hours_ago: i64, enclosure: Option<&str>) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO feed (title, description, full_text, link, source_name, time, enclosure) \
         VALUES ($1, $2, $3, $4, 'Wire', $5, $6) RETURNING id",
    )
    .bind(title)
    .bind(format!("{title} description"))
    .bind(format!("{title} full text"))
    .bind(format!("https://news.test/{title}"))
    .bind(OffsetDateTime::now_utc() - Duration::hours(hours_ago))
    .bind(enclosure)
    .fetch_one(pool)
    .await
    .expect("insert feed")
}

/// Insert a group led by its first source and linked to all of `sources`.
async fn insert_group(pool: &PgPool, sources: &[i64], hours_ago: i64, realtime: bool) -> i64 {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO groups (feed_id, title, description, full_text, time, is_rt) \
         VALUES ($1, 'Group', 'Group description', 'Rewritten', $2, $3) RETURNING id",
    )
    .bind(sources[0])
    .bind(OffsetDateTime::now_utc() - Duration::hours(hours_ago))
    .bind(realtime)
    .fetch_one(pool)
    .await
    .expect("insert group");

    for feed_id in sources {
        sqlx::query("INSERT INTO compares (group_id, feed_id) VALUES ($1, $2)")
            .bind(id)
            .bind(feed_id)
            .execute(pool)
            .await
            .expect("link source");
    }
    id
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn top_ranks_by_source_count_inside_the_window(pool: PgPool) {
    let mut busy_sources = Vec::new();
    for n in 0..3 {
        busy_sources.push(insert_feed(&pool, &format!("busy-{n}"), 2, None).await);
    }
    let quiet_source = insert_feed(&pool, "quiet", 1, None).await;
    let mut stale_sources = Vec::new();
    for n in 0..5 {
        stale_sources.push(insert_feed(&pool, &format!("stale-{n}"), 30, None).await);
    }

    let busy = insert_group(&pool, &busy_sources, 2, false).await;
    let quiet = insert_group(&pool, &[quiet_source], 1, true).await;
    insert_group(&pool, &stale_sources, 30, false).await;

    let repos = PostgresRepositories::new(pool);
    let top = repos.list_top_by_engagement(10).await.expect("top");

    let ids: Vec<u64> = top.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![busy as u64, quiet as u64]);
    assert_eq!(top[0].title, "busy-0");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn top_breaks_source_count_ties_by_newest_first(pool: PgPool) {
    let mut a_sources = Vec::new();
    let mut b_sources = Vec::new();
    for n in 0..3 {
        a_sources.push(insert_feed(&pool, &format!("a-{n}"), 2, None).await);
        b_sources.push(insert_feed(&pool, &format!("b-{n}"), 3, None).await);
    }
    let c_source = insert_feed(&pool, "c-0", 1, None).await;

    // Equal source counts: A is newer than B. C is newest but has one source.
    let a = insert_group(&pool, &a_sources, 2, false).await;
    let b = insert_group(&pool, &b_sources, 3, false).await;
    let c = insert_group(&pool, &[c_source], 1, false).await;

    let repos = PostgresRepositories::new(pool);
    let top = repos.list_top_by_engagement(10).await.expect("top");

    let ids: Vec<u64> = top.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![a as u64, b as u64, c as u64]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn detail_orders_sources_and_counts_views(pool: PgPool) {
    let older = insert_feed(&pool, "older", 5, Some("https://img.test/a.jpg")).await;
    let newer = insert_feed(&pool, "newer", 1, None).await;
    let group = insert_group(&pool, &[older, newer], 1, true).await;

    let repos = PostgresRepositories::new(pool);
    let updated = repos
        .apply_view_deltas(&[
            ViewDelta {
                group_id: group as u64,
                delta: 4,
            },
            ViewDelta {
                group_id: 999_999,
                delta: 1,
            },
        ])
        .await
        .expect("apply deltas");
    assert_eq!(updated, 1);

    let detail = repos.find_detail(group as u64).await.expect("detail");
    assert_eq!(detail.views_count, 4);
    assert!(detail.is_realtime);
    assert_eq!(detail.enclosure.as_deref(), Some("https://img.test/a.jpg"));
    let titles: Vec<&str> = detail.sources.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["newer", "older"]);

    assert!(matches!(
        repos.find_detail(999_999).await,
        Err(RepoError::NotFound)
    ));
    assert_eq!(repos.max_id().await.expect("max id"), group as u64);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn recent_listing_pages_and_searches(pool: PgPool) {
    let rust = insert_feed(&pool, "rust-release", 3, None).await;
    let go = insert_feed(&pool, "go-release", 2, None).await;
    let rust_group = insert_group(&pool, &[rust], 3, false).await;
    let go_group = insert_group(&pool, &[go], 2, false).await;

    let repos = PostgresRepositories::new(pool);
    let now = OffsetDateTime::now_utc();

    let all = repos
        .list_recent(&RecentQuery::new(now, 10))
        .await
        .expect("all");
    let ids: Vec<u64> = all.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![go_group as u64, rust_group as u64]);

    let page = repos
        .list_recent(&RecentQuery::new(all[0].time, 10))
        .await
        .expect("next page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, rust_group as u64);

    let searched = repos
        .list_recent(&RecentQuery::new(now, 10).with_search(["RUST"]))
        .await
        .expect("search");
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, rust_group as u64);

    repos.health_check().await.expect("healthy");
}
