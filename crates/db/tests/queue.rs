use std::time::Duration;

use advex_core::admission::{QueueDepth, WorkerRegistry};
use advex_core::params::{NetworkSelection, TaskParameters};
use advex_core::queue::{JobQueue, QueueEntry, QueueError, WorkerSlot};
use advex_core::task_id::TaskId;
use advex_db::repositories::{QueueRepo, WorkerRepo};
use advex_db::{PgJobQueue, PgWorkerRegistry};
use assert_matches::assert_matches;
use sqlx::PgPool;

fn entry(label: u32) -> QueueEntry {
    QueueEntry {
        task_id: TaskId::generate(),
        parameters: TaskParameters {
            networks: NetworkSelection::from_ids(&[1, 2]).unwrap(),
            target_label: label,
        },
    }
}

fn queue(pool: PgPool) -> PgJobQueue {
    PgJobQueue::new(pool, Duration::from_millis(10), Duration::from_secs(3600))
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_claim_ack_in_fifo_order(pool: PgPool) {
    let q = queue(pool.clone());
    let (a, b) = (entry(1), entry(2));
    q.enqueue(a.clone()).await.unwrap();
    q.enqueue(b.clone()).await.unwrap();
    assert_eq!(q.queue_depth().await.unwrap(), 2);

    let first = q.dequeue(&WorkerSlot::new("w", 0)).await.unwrap();
    let second = q.dequeue(&WorkerSlot::new("w", 1)).await.unwrap();
    assert_eq!(first.entry, a);
    assert_eq!(second.entry, b);
    assert_eq!(q.queue_depth().await.unwrap(), 0);

    q.ack(&first).await.unwrap();
    assert_matches!(q.ack(&first).await, Err(QueueError::UnknownDelivery(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn slot_holding_a_claim_cannot_dequeue(pool: PgPool) {
    let q = queue(pool);
    q.enqueue(entry(1)).await.unwrap();
    q.enqueue(entry(2)).await.unwrap();

    let slot = WorkerSlot::new("w", 0);
    let delivery = q.dequeue(&slot).await.unwrap();
    assert_matches!(q.dequeue(&slot).await, Err(QueueError::PrefetchExceeded(_)));

    q.ack(&delivery).await.unwrap();
    assert!(q.dequeue(&slot).await.is_ok());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_claims_are_released(pool: PgPool) {
    QueueRepo::insert(&pool, TaskId::generate().as_str(), 1, 3)
        .await
        .unwrap();
    QueueRepo::claim_next(&pool, "crashed#0").await.unwrap().unwrap();
    assert_eq!(QueueRepo::count_pending(&pool).await.unwrap(), 0);

    sqlx::query("UPDATE queue_entries SET claimed_at = NOW() - INTERVAL '2 hours'")
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(QueueRepo::release_expired(&pool, 3600.0).await.unwrap(), 1);
    assert_eq!(QueueRepo::count_pending(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn restarted_slot_releases_its_own_claims(pool: PgPool) {
    let q = queue(pool.clone());
    let stale = entry(4);
    q.enqueue(stale.clone()).await.unwrap();

    let slot = WorkerSlot::new("w", 0);
    q.dequeue(&slot).await.unwrap();
    q.enqueue(entry(5)).await.unwrap();
    q.dequeue(&WorkerSlot::new("w", 1)).await.unwrap();
    assert_matches!(q.dequeue(&slot).await, Err(QueueError::PrefetchExceeded(_)));

    assert_eq!(q.requeue_abandoned(&slot).await.unwrap(), 1);
    assert_eq!(q.queue_depth().await.unwrap(), 1);

    let redelivered = q.dequeue(&slot).await.unwrap();
    assert_eq!(redelivered.entry, stale);
    assert_eq!(q.requeue_abandoned(&WorkerSlot::new("w", 2)).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn registry_counts_live_slots(pool: PgPool) {
    let registry = PgWorkerRegistry::new(pool.clone(), Duration::from_secs(90));
    assert_eq!(registry.worker_count().await.unwrap(), 0);

    WorkerRepo::register(&pool, "gpu-1", 2).await.unwrap();
    WorkerRepo::register(&pool, "gpu-2", 1).await.unwrap();
    assert_eq!(registry.worker_count().await.unwrap(), 3);

    sqlx::query("UPDATE workers SET heartbeat_at = NOW() - INTERVAL '1 hour' WHERE name = 'gpu-2'")
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(registry.worker_count().await.unwrap(), 2);

    assert!(WorkerRepo::heartbeat(&pool, "gpu-2").await.unwrap());
    assert_eq!(registry.worker_count().await.unwrap(), 3);

    assert!(WorkerRepo::deregister(&pool, "gpu-1").await.unwrap());
    assert_eq!(registry.worker_count().await.unwrap(), 1);
}
