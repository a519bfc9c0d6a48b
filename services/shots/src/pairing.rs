use crate::model::{ShotSubmission, Side, StoredShot};
use crate::shot_path;
use crate::stitcher::StitchRequest;
use thiserror::Error;
use uuid::Uuid;

/// The opposite half exists with a different resolution
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Resolution mismatch: The other side does not have the same resolution for camera {camera_id}.")]
pub struct ResolutionMismatch {
    pub camera_id: Uuid,
    pub other_side: Side,
    pub other_resolution: String,
    pub submitted_resolution: String,
}

/// Outcome of a successful pairing check
#[derive(Debug, Clone, PartialEq)]
pub struct PairingDecision {
    /// Stored shot on the opposite side, if any
    pub other_side: Option<StoredShot>,
}

fn same_bucket(new_shot: &ShotSubmission, stored: &StoredShot) -> bool {
    let new = new_shot.identity();
    let old = stored.identity();
    old.camera_id() == new.camera_id()
        && old.sequence() == new.sequence()
        && old.photo_index() == new.photo_index()
}

/// Decide whether `new_shot` may be written, given a snapshot of the shots
/// already stored for its camera, sequence and photo index.
///
/// Reading the snapshot and writing the shot are separate operations: two
/// halves submitted concurrently can both see an empty bucket, and then
/// neither triggers stitching.
///
/// Shots outside the new shot's camera, sequence and photo index bucket are
/// ignored even if the caller passes them in.
pub fn resolve(
    new_shot: &ShotSubmission,
    same_index_shots: &[StoredShot],
) -> Result<PairingDecision, ResolutionMismatch> {
    let opposite = new_shot.identity().side().opposite();

    let other = same_index_shots
        .iter()
        .filter(|stored| same_bucket(new_shot, stored))
        .find(|stored| stored.side() == opposite);

    if let Some(other) = other {
        if other.resolution() != new_shot.resolution() {
            return Err(ResolutionMismatch {
                camera_id: new_shot.identity().camera_id(),
                other_side: other.side(),
                other_resolution: other.resolution().to_string(),
                submitted_resolution: new_shot.resolution().to_string(),
            });
        }
    }

    Ok(PairingDecision {
        other_side: other.cloned(),
    })
}

/// Stitch request to emit once `new_shot` is written, if both halves are now present
pub fn stitch_request(
    new_shot: &ShotSubmission,
    decision: &PairingDecision,
) -> Option<StitchRequest> {
    let other = decision.other_side.as_ref()?;
    let new_path = shot_path::build_path(new_shot.identity());

    match (new_shot.identity().side(), other.side()) {
        (Side::Left, Side::Right) => Some(StitchRequest {
            left_side_path: new_path,
            right_side_path: other.path(),
        }),
        (Side::Right, Side::Left) => Some(StitchRequest {
            left_side_path: other.path(),
            right_side_path: new_path,
        }),
        _ => None,
    }
}
