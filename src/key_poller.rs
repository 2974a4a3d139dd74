use crate::api::LockerApi;
use crate::projector;
use crate::types::CountsSnapshot;
use chrono::Utc;
use log::{info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Re-fetch both collections every `interval` and publish fresh counts.
///
/// Runs until every receiver of `counts_tx` has been dropped.
pub async fn run(
    api: LockerApi,
    interval: Duration,
    counts_tx: watch::Sender<Option<CountsSnapshot>>,
) {
    loop {
        let snapshot = refresh(&api).await;

        let changed = counts_tx
            .borrow()
            .map_or(true, |previous| previous.counts != snapshot.counts);
        if changed {
            info!("Key status: {}", snapshot.counts);
        }

        if counts_tx.send(Some(snapshot)).is_err() {
            info!("No one is watching key counts anymore, stopping poller");
            return;
        }

        sleep(interval).await;
    }
}

/// One fetch-and-project round. A failed fetch counts as an empty collection.
pub async fn refresh(api: &LockerApi) -> CountsSnapshot {
    let (students, keys) = tokio::join!(api.fetch_students(), api.fetch_keys());

    let students = students
        .map_err(|e| warn!("Failed to fetch students: {}", e))
        .ok();
    let keys = keys.map_err(|e| warn!("Failed to fetch keys: {}", e)).ok();

    CountsSnapshot {
        counts: projector::project(students.as_ref(), keys.as_ref()),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::serve;
    use crate::types::Counts;

    #[tokio::test]
    async fn test_refresh_projects_both_collections() {
        // students and keys are fetched concurrently, so answer both the same way
        let body = r#"{"data":[{"keyStatus":"Available","studentBannedStatus":true,"studentWarningStatus":1}]}"#;
        let (base_url, server) = serve(vec![(200, body), (200, body)]).await;
        let api = LockerApi::new(reqwest::Client::new(), &base_url);

        let snapshot = refresh(&api).await;

        assert_eq!(
            snapshot.counts,
            Counts {
                available: 1,
                taken: 0,
                banned: 1,
                warned: 1,
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_degrades_to_zero_when_server_fails() {
        let (base_url, server) = serve(vec![(500, "{}"), (500, "{}")]).await;
        let api = LockerApi::new(reqwest::Client::new(), &base_url);

        let snapshot = refresh(&api).await;

        assert_eq!(snapshot.counts, Counts::default());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_with_unreachable_server() {
        let api = LockerApi::new(reqwest::Client::new(), "http://127.0.0.1:9/api");

        assert_eq!(refresh(&api).await.counts, Counts::default());
    }

    #[tokio::test]
    async fn test_run_stops_when_nobody_listens() {
        let (base_url, server) = serve(vec![(200, "[]"), (200, "[]")]).await;
        let api = LockerApi::new(reqwest::Client::new(), &base_url);
        let (counts_tx, counts_rx) = watch::channel(None);
        drop(counts_rx);

        run(api, Duration::from_secs(3600), counts_tx).await;
        server.await.unwrap();
    }
}
