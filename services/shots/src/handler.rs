use crate::keys::{build_pk, build_sk, photo_index_prefix, ShotKey, KEY_SEPARATOR};
use crate::model::{ShotSubmission, Side, StoredShot};
use crate::pairing::{self, ResolutionMismatch};
use crate::shot_store::{ShotRepository, StoreError};
use crate::stitcher::StitchNotifier;
use crate::validator::{validate, RawShotRequest, ValidationErrors};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Why a shot was not created
#[derive(Error, Debug)]
pub enum CreateShotError {
    #[error("Invalid JSON: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    ResolutionMismatch(#[from] ResolutionMismatch),

    #[error("Shot store error: {0}")]
    Store(#[from] StoreError),
}

/// Shot ingestion service.
///
/// Creation runs validate, read, decide, write, notify. The read of the
/// opposite half and the write of the new shot are not atomic.
#[derive(Clone)]
pub struct ShotService {
    store: Arc<dyn ShotRepository>,
    notifier: Arc<dyn StitchNotifier>,
}

impl ShotService {
    pub fn new(store: Arc<dyn ShotRepository>, notifier: Arc<dyn StitchNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Validate and store one shot, triggering the stitcher when it completes a pair
    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn create_shot(&self, body: &[u8]) -> Result<ShotSubmission, CreateShotError> {
        let result = self.try_create_shot(body).await;

        match &result {
            Ok(submission) => {
                metrics::counter!("shots.created").increment(1);
                info!(
                    camera_id = %submission.identity().camera_id(),
                    s3_key = %submission.s3_key(),
                    "Shot stored"
                );
            }
            Err(CreateShotError::MalformedInput(reason)) => {
                metrics::counter!("shots.rejected.validation").increment(1);
                warn!(reason = %reason, "Malformed shot request");
            }
            Err(CreateShotError::Validation(errors)) => {
                metrics::counter!("shots.rejected.validation").increment(1);
                warn!(error = %errors, "Shot validation failed");
            }
            Err(CreateShotError::ResolutionMismatch(mismatch)) => {
                metrics::counter!("shots.rejected.resolution_mismatch").increment(1);
                warn!(
                    camera_id = %mismatch.camera_id,
                    other_side = %mismatch.other_side,
                    other_resolution = %mismatch.other_resolution,
                    submitted_resolution = %mismatch.submitted_resolution,
                    "Resolution mismatch"
                );
            }
            Err(CreateShotError::Store(e)) => {
                metrics::counter!("shots.failed").increment(1);
                error!(error = %e, "Failed to create shot");
            }
        }

        result
    }

    async fn try_create_shot(&self, body: &[u8]) -> Result<ShotSubmission, CreateShotError> {
        let raw = RawShotRequest::from_slice(body)
            .map_err(|e| CreateShotError::MalformedInput(e.to_string()))?;
        let submission = validate(&raw)?;

        let key = submission.key();
        let same_index = self
            .store
            .query(&key.pk, &photo_index_prefix(submission.identity().photo_index()))
            .await?;

        let decision = pairing::resolve(&submission, &same_index)?;

        self.store.put(&StoredShot::from(&submission)).await?;

        if let Some(request) = pairing::stitch_request(&submission, &decision) {
            // Best effort: the shot is stored whatever the notifier says
            match self.notifier.notify(&request).await {
                Ok(()) => {
                    metrics::counter!("shots.stitch.triggered").increment(1);
                    info!(
                        left = %request.left_side_path,
                        right = %request.right_side_path,
                        "Stitching triggered"
                    );
                }
                Err(e) => {
                    metrics::counter!("shots.stitch.failed").increment(1);
                    error!(
                        error = %e,
                        left = %request.left_side_path,
                        right = %request.right_side_path,
                        "Failed to trigger stitching"
                    );
                }
            }
        }

        Ok(submission)
    }

    #[instrument(skip(self))]
    pub async fn get_shot(
        &self,
        camera_id: Uuid,
        sequence: &str,
        photo_index: Option<u64>,
        side: Side,
    ) -> Result<Option<StoredShot>, StoreError> {
        let key = ShotKey {
            pk: build_pk(&camera_id, sequence),
            sk: build_sk(photo_index, Some(side)),
        };
        self.store.get(&key).await
    }

    /// Every side stored for one photo index (`None` is the unindexed bucket)
    #[instrument(skip(self))]
    pub async fn shots_of_photo_index(
        &self,
        camera_id: Uuid,
        sequence: &str,
        photo_index: Option<u64>,
    ) -> Result<Vec<StoredShot>, StoreError> {
        self.store
            .query(&build_pk(&camera_id, sequence), &photo_index_prefix(photo_index))
            .await
    }

    #[instrument(skip(self))]
    pub async fn shots_of_sequence(
        &self,
        camera_id: Uuid,
        sequence: &str,
    ) -> Result<Vec<StoredShot>, StoreError> {
        self.store.query(&build_pk(&camera_id, sequence), "").await
    }

    /// Every shot of every sequence of a camera. Scans the whole table.
    #[instrument(skip(self))]
    pub async fn shots_of_camera(&self, camera_id: Uuid) -> Result<Vec<StoredShot>, StoreError> {
        self.store
            .scan(&format!("{camera_id}{KEY_SEPARATOR}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shot_store::{MemoryShotStore, MockShotRepository};
    use crate::stitcher::{MockStitchNotifier, NotifyError};
    use serde_json::json;

    const CAMERA: &str = "123e4567-e89b-12d3-a456-426614174000";

    fn body(side: &str, file: &str, resolution: &str) -> Vec<u8> {
        json!({
            "s3_key": format!("{CAMERA}/123456/{side}/{file}"),
            "resolution": resolution,
            "file_size": 1024,
            "shooting_date": "2024-01-01T12:00:00",
            "metadata": { "GPSLatitude": 45.5, "Make": "Enlaps" }
        })
        .to_string()
        .into_bytes()
    }

    fn silent_notifier() -> MockStitchNotifier {
        let mut notifier = MockStitchNotifier::new();
        notifier.expect_notify().times(0);
        notifier
    }

    fn service(store: Arc<MemoryShotStore>, notifier: MockStitchNotifier) -> ShotService {
        ShotService::new(store, Arc::new(notifier))
    }

    fn camera() -> Uuid {
        Uuid::parse_str(CAMERA).unwrap()
    }

    #[tokio::test]
    async fn test_first_side_is_stored_without_stitching() {
        let store = Arc::new(MemoryShotStore::new());
        let service = service(store.clone(), silent_notifier());

        let submission = service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap();

        let key = submission.key();
        assert_eq!(key.pk, format!("{CAMERA}#123456"));
        assert_eq!(key.sk, "1#left");

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.resolution(), "1920x1080");
        assert_eq!(stored.metadata().make.as_deref(), Some("Enlaps"));
    }

    #[tokio::test]
    async fn test_second_side_triggers_stitching_once() {
        let store = Arc::new(MemoryShotStore::new());
        let mut notifier = MockStitchNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .withf(|request| {
                request.left_side_path == format!("{CAMERA}/123456/left/my_photo1.jpg")
                    && request.right_side_path == format!("{CAMERA}/123456/right/my_photo1.jpg")
            })
            .returning(|_| Ok(()));
        let service = service(store.clone(), notifier);

        service
            .create_shot(&body("right", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap();
        service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_resolution_mismatch_is_not_written() {
        let store = Arc::new(MemoryShotStore::new());
        let service = service(store.clone(), silent_notifier());

        service
            .create_shot(&body("right", "my_photo1.jpg", "3840x2160"))
            .await
            .unwrap();
        let err = service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap_err();

        match err {
            CreateShotError::ResolutionMismatch(mismatch) => {
                assert!(mismatch.to_string().contains(CAMERA));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_other_index_does_not_pair() {
        let store = Arc::new(MemoryShotStore::new());
        let service = service(store.clone(), silent_notifier());

        service
            .create_shot(&body("right", "my_photo11.jpg", "3840x2160"))
            .await
            .unwrap();
        service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_store() {
        // No expectations: any store call panics
        let service = ShotService::new(
            Arc::new(MockShotRepository::new()),
            Arc::new(silent_notifier()),
        );

        let err = service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080x720"))
            .await
            .unwrap_err();
        let CreateShotError::Validation(errors) = err else {
            panic!("expected a validation error");
        };
        assert!(errors.to_string().contains("resolution must be in the format"));

        let err = service.create_shot(b"").await.unwrap_err();
        assert!(matches!(err, CreateShotError::Validation(_)));
    }

    #[tokio::test]
    async fn test_non_object_body_is_malformed() {
        let service = ShotService::new(
            Arc::new(MockShotRepository::new()),
            Arc::new(silent_notifier()),
        );

        for body in [&b"{not json"[..], &b"[1, 2, 3, 4, 5]"[..], &b"\"text\""[..]] {
            let err = service.create_shot(body).await.unwrap_err();
            assert!(matches!(err, CreateShotError::MalformedInput(_)));
            assert!(err.to_string().starts_with("Invalid JSON"));
        }
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_the_shot() {
        let store = Arc::new(MemoryShotStore::new());
        let mut notifier = MockStitchNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(NotifyError::Invoke("throttled".to_string())));
        let service = service(store.clone(), notifier);

        service
            .create_shot(&body("left", "my_photo.jpg", "1920x1080"))
            .await
            .unwrap();
        let result = service
            .create_shot(&body("right", "my_photo.jpg", "1920x1080"))
            .await;

        assert!(result.is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let mut repository = MockShotRepository::new();
        repository
            .expect_query()
            .withf(|pk, prefix| pk.to_string() == format!("{CAMERA}#123456") && prefix.to_string() == "1#")
            .times(1)
            .returning(|_, _| {
                Err(StoreError::Backend {
                    operation: "query",
                    message: "unreachable".to_string(),
                })
            });
        repository.expect_put().times(0);
        let service = ShotService::new(Arc::new(repository), Arc::new(silent_notifier()));

        let err = service
            .create_shot(&body("left", "my_photo1.jpg", "1920x1080"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateShotError::Store(_)));
    }

    #[tokio::test]
    async fn test_stitched_shot_never_triggers_stitching() {
        let store = Arc::new(MemoryShotStore::new());
        let mut notifier = MockStitchNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));
        let service = service(store.clone(), notifier);

        for side in ["left", "right", "stitched"] {
            service
                .create_shot(&body(side, "my_photo3.jpg", "1920x1080"))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_lookups() {
        let store = Arc::new(MemoryShotStore::new());
        let mut notifier = MockStitchNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));
        let service = service(store, notifier);

        for (side, file) in [
            ("left", "my_photo1.jpg"),
            ("right", "my_photo1.jpg"),
            ("left", "my_photo2.jpg"),
            ("left", "my_photo.jpg"),
        ] {
            service
                .create_shot(&body(side, file, "1920x1080"))
                .await
                .unwrap();
        }

        let shot = service
            .get_shot(camera(), "123456", Some(1), Side::Right)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shot.path(), format!("{CAMERA}/123456/right/my_photo1.jpg"));
        assert!(service
            .get_shot(camera(), "123456", Some(2), Side::Right)
            .await
            .unwrap()
            .is_none());

        assert_eq!(
            service
                .shots_of_photo_index(camera(), "123456", Some(1))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            service
                .shots_of_photo_index(camera(), "123456", None)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(service.shots_of_sequence(camera(), "123456").await.unwrap().len(), 4);
        assert!(service.shots_of_sequence(camera(), "7").await.unwrap().is_empty());
        assert_eq!(service.shots_of_camera(camera()).await.unwrap().len(), 4);
    }
}
