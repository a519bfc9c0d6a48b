use crate::model::{ShotIdentity, Side};
use serde::Serialize;
use uuid::Uuid;

pub const KEY_SEPARATOR: char = '#';

/// Partition and sort key of a stored shot.
///
/// `PK = "{camera_id}#{sequence}"` groups every shot of a sequence in one
/// partition, `SK = "{photo_index}#{side}"` orders them by photo index. The
/// separator keeps index buckets apart under prefix queries: `"1#"` never
/// matches `"11#left"`, and the unindexed bucket is the bare `"#"` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShotKey {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
}

pub fn derive_key(identity: &ShotIdentity) -> ShotKey {
    ShotKey {
        pk: build_pk(&identity.camera_id(), identity.sequence()),
        sk: build_sk(identity.photo_index(), Some(identity.side())),
    }
}

pub fn build_pk(camera_id: &Uuid, sequence: &str) -> String {
    format!("{camera_id}{KEY_SEPARATOR}{sequence}")
}

/// Sort key, or the sort key prefix of a photo index bucket when `side` is `None`
pub fn build_sk(photo_index: Option<u64>, side: Option<Side>) -> String {
    let index = photo_index.map(|i| i.to_string()).unwrap_or_default();
    let side = side.map(|s| s.as_str()).unwrap_or_default();
    format!("{index}{KEY_SEPARATOR}{side}")
}

pub fn photo_index_prefix(photo_index: Option<u64>) -> String {
    build_sk(photo_index, None)
}
