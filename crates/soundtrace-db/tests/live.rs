//! Live integration tests for soundtrace-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/soundtrace-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use soundtrace_core::{
    JobPayload, JobStatus, NewJob, NewPostSnapshot, NewSoundSnapshot, NewTrackedPost,
    NewTrackedSound, Platform,
};
use soundtrace_db::{
    backfill_sound_metadata, claim_due_jobs, complete_job, enqueue_jobs, fail_job, get_job,
    get_tracked_post, get_tracked_sound, insert_post_snapshot, insert_sound_snapshot,
    insert_tracked_sound, list_jobs, list_post_snapshots, list_sound_snapshots,
    list_sounds_due_for_refresh, reclaim_stale_jobs, requeue_job, upsert_tracked_posts, DbError,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_sound(workspace_id: Uuid, platform_sound_id: &str) -> NewTrackedSound {
    NewTrackedSound {
        workspace_id,
        platform: Platform::Tiktok,
        platform_sound_id: platform_sound_id.to_string(),
        source_url: format!("https://www.tiktok.com/music/song-{platform_sound_id}"),
        title: None,
        artist: None,
        thumbnail_url: None,
        created_by: None,
    }
}

fn new_post(platform_post_id: &str) -> NewTrackedPost {
    NewTrackedPost {
        platform_post_id: platform_post_id.to_string(),
        post_url: format!("https://www.tiktok.com/@someone/video/{platform_post_id}"),
        creator_handle: Some("someone".to_string()),
        creator_id: None,
        posted_at: None,
    }
}

async fn enqueue_refresh(
    pool: &sqlx::PgPool,
    workspace_id: Uuid,
    sound_id: Uuid,
    run_at: chrono::DateTime<Utc>,
) -> Uuid {
    let ids = enqueue_jobs(
        pool,
        &[NewJob::new(
            workspace_id,
            JobPayload::RefreshSound { sound_id },
            run_at,
            3,
        )],
    )
    .await
    .expect("enqueue_jobs failed");
    ids[0]
}

// ---------------------------------------------------------------------------
// Section 1: Sounds
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn insert_tracked_sound_is_idempotent(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let first = insert_tracked_sound(&pool, &new_sound(ws, "111"))
        .await
        .expect("first insert failed");
    let second = insert_tracked_sound(&pool, &new_sound(ws, "111"))
        .await
        .expect("second insert failed");

    assert_eq!(first.id, second.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn backfill_only_fills_null_columns(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let sound = insert_tracked_sound(&pool, &new_sound(ws, "222"))
        .await
        .expect("insert failed");

    let changed = backfill_sound_metadata(&pool, sound.id, Some("X"), None, None)
        .await
        .expect("backfill failed");
    assert!(changed);

    let changed = backfill_sound_metadata(&pool, sound.id, Some("Y"), None, None)
        .await
        .expect("second backfill failed");
    assert!(!changed, "existing title must not be overwritten");

    let stored = get_tracked_sound(&pool, sound.id)
        .await
        .expect("get failed")
        .expect("sound missing");
    assert_eq!(stored.title.as_deref(), Some("X"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sounds_with_open_refresh_are_not_due(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let busy = insert_tracked_sound(&pool, &new_sound(ws, "333"))
        .await
        .expect("insert failed");
    let idle = insert_tracked_sound(&pool, &new_sound(ws, "444"))
        .await
        .expect("insert failed");
    enqueue_refresh(&pool, ws, busy.id, Utc::now()).await;

    let due = list_sounds_due_for_refresh(&pool)
        .await
        .expect("list_sounds_due_for_refresh failed");
    let ids: Vec<Uuid> = due.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![idle.id]);
}

// ---------------------------------------------------------------------------
// Section 2: Posts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_posts_twice_keeps_one_row_and_advances_last_seen(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let sound = insert_tracked_sound(&pool, &new_sound(ws, "555"))
        .await
        .expect("insert failed");
    let posts = vec![new_post("a"), new_post("b")];

    let t1 = Utc::now();
    let first = upsert_tracked_posts(&pool, ws, sound.id, Platform::Tiktok, &posts, t1)
        .await
        .expect("first upsert failed");
    let t2 = t1 + Duration::seconds(10);
    let second = upsert_tracked_posts(&pool, ws, sound.id, Platform::Tiktok, &posts, t2)
        .await
        .expect("second upsert failed");

    assert_eq!(first[0].id, second[0].id);
    assert_eq!(first[1].id, second[1].id);
    assert!(second[0].last_seen_at > first[0].last_seen_at);
    assert_eq!(second[0].first_seen_at, first[0].first_seen_at);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracked_posts")
        .fetch_one(&pool)
        .await
        .expect("count failed");
    assert_eq!(count, 2);
}

// ---------------------------------------------------------------------------
// Section 3: Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn claim_orders_by_run_at_and_skips_future_jobs(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    let later = enqueue_refresh(&pool, ws, Uuid::new_v4(), now - Duration::minutes(1)).await;
    let earlier = enqueue_refresh(&pool, ws, Uuid::new_v4(), now - Duration::minutes(5)).await;
    let future = enqueue_refresh(&pool, ws, Uuid::new_v4(), now + Duration::minutes(5)).await;

    let claimed = claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("claim failed");
    let ids: Vec<Uuid> = claimed.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![earlier, later]);
    assert!(claimed
        .iter()
        .all(|j| j.status == "running" && j.lock_owner.as_deref() == Some("runner-a")));

    let untouched = get_job(&pool, future).await.expect("get failed").expect("missing");
    assert_eq!(untouched.status, "queued");
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_claims_never_share_a_job(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    for _ in 0..8 {
        enqueue_refresh(&pool, ws, Uuid::new_v4(), now - Duration::seconds(1)).await;
    }

    let (a, b) = tokio::join!(
        claim_due_jobs(&pool, "runner-a", now, 10),
        claim_due_jobs(&pool, "runner-b", now, 10),
    );
    let a = a.expect("claim a failed");
    let b = b.expect("claim b failed");

    assert_eq!(a.len() + b.len(), 8);
    for job in &a {
        assert!(b.iter().all(|other| other.id != job.id));
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_respects_batch_limit(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    for _ in 0..12 {
        enqueue_refresh(&pool, ws, Uuid::new_v4(), now).await;
    }

    let claimed = claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("claim failed");
    assert_eq!(claimed.len(), 10);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_running_jobs_are_reclaimed(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let claimed_at = Utc::now() - Duration::minutes(10);
    let id = enqueue_refresh(&pool, ws, Uuid::new_v4(), claimed_at).await;
    claim_due_jobs(&pool, "crashed-runner", claimed_at, 10)
        .await
        .expect("claim failed");

    let reclaimed = reclaim_stale_jobs(&pool, Utc::now() - Duration::minutes(5))
        .await
        .expect("reclaim failed");
    assert_eq!(reclaimed, 1);

    let job = get_job(&pool, id).await.expect("get failed").expect("missing");
    assert_eq!(job.status, "queued");
    assert!(job.lock_owner.is_none() && job.locked_at.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn fresh_running_jobs_are_not_reclaimed(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    enqueue_refresh(&pool, ws, Uuid::new_v4(), now).await;
    claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("claim failed");

    let reclaimed = reclaim_stale_jobs(&pool, now - Duration::minutes(5))
        .await
        .expect("reclaim failed");
    assert_eq!(reclaimed, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn finish_transitions_require_the_lock_owner(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    let id = enqueue_refresh(&pool, ws, Uuid::new_v4(), now).await;
    claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("claim failed");

    let err = complete_job(&pool, id, "runner-b")
        .await
        .expect_err("foreign owner must not complete");
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));

    complete_job(&pool, id, "runner-a")
        .await
        .expect("owner complete failed");
    let job = get_job(&pool, id).await.expect("get failed").expect("missing");
    assert_eq!(job.status, "success");
    assert!(job.lock_owner.is_none());

    let err = complete_job(&pool, id, "runner-a")
        .await
        .expect_err("second completion must fail");
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn requeue_then_fail_records_attempts_and_error(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let now = Utc::now();
    let id = enqueue_refresh(&pool, ws, Uuid::new_v4(), now).await;

    claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("claim failed");
    let retry_at = now + Duration::minutes(2);
    requeue_job(&pool, id, "runner-a", 1, retry_at, "timeout")
        .await
        .expect("requeue failed");

    let job = get_job(&pool, id).await.expect("get failed").expect("missing");
    assert_eq!(job.status, "queued");
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("timeout"));
    assert!(claim_due_jobs(&pool, "runner-a", now, 10)
        .await
        .expect("early claim failed")
        .is_empty());

    claim_due_jobs(&pool, "runner-b", retry_at, 10)
        .await
        .expect("claim failed");
    fail_job(&pool, id, "runner-b", 2, "boom")
        .await
        .expect("fail failed");

    let failed = list_jobs(&pool, Some(JobStatus::Failed), 50)
        .await
        .expect("list failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 2);
    assert!(claim_due_jobs(&pool, "runner-c", retry_at + Duration::days(1), 10)
        .await
        .expect("late claim failed")
        .is_empty());
}

// ---------------------------------------------------------------------------
// Section 4: Snapshots
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn snapshots_are_appended(pool: sqlx::PgPool) {
    let ws = Uuid::new_v4();
    let sound = insert_tracked_sound(&pool, &new_sound(ws, "666"))
        .await
        .expect("insert failed");
    let now = Utc::now();

    insert_sound_snapshot(
        &pool,
        &NewSoundSnapshot {
            sound_id: sound.id,
            captured_at: now,
            total_uses: Some(120),
            blocked: false,
            metadata: serde_json::json!({}),
        },
    )
    .await
    .expect("insert sound snapshot failed");
    insert_sound_snapshot(
        &pool,
        &NewSoundSnapshot::blocked(sound.id, now + Duration::minutes(1), "rate_limited"),
    )
    .await
    .expect("insert blocked snapshot failed");

    let snaps = list_sound_snapshots(&pool, sound.id)
        .await
        .expect("list failed");
    assert_eq!(snaps.len(), 2);
    assert!(snaps[0].blocked && snaps[0].total_uses.is_none());
    assert_eq!(snaps[1].total_uses, Some(120));

    let posts = upsert_tracked_posts(&pool, ws, sound.id, Platform::Tiktok, &[new_post("z")], now)
        .await
        .expect("upsert failed");
    let post = get_tracked_post(&pool, posts[0].id)
        .await
        .expect("get failed")
        .expect("post missing");
    insert_post_snapshot(&pool, &NewPostSnapshot::blocked(post.id, now, "quota_exhausted"))
        .await
        .expect("insert post snapshot failed");
    let post_snaps = list_post_snapshots(&pool, post.id)
        .await
        .expect("list failed");
    assert_eq!(post_snaps.len(), 1);
    assert!(post_snaps[0].views.is_none());
}
