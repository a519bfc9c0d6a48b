use crate::keys::{self, ShotKey};
use crate::shot_path;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Which half of a stereo pair a shot represents, or the merged result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Stitched,
}

impl Side {
    pub const ALL: [Side; 3] = [Side::Left, Side::Right, Side::Stitched];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
            Side::Stitched => "stitched",
        }
    }

    /// The side a shot pairs with. `Stitched` pairs with itself.
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Stitched => Side::Stitched,
        }
    }

    /// Comma separated list of accepted values, for error messages
    pub fn valid_values() -> String {
        Side::ALL
            .iter()
            .map(Side::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown side '{0}'")]
pub struct UnknownSide(pub String);

impl FromStr for Side {
    type Err = UnknownSide;

    /// Exact, case-sensitive match
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            "stitched" => Ok(Side::Stitched),
            other => Err(UnknownSide(other.to_string())),
        }
    }
}

/// Identity of a shot, derived from its storage path.
///
/// Only [`shot_path::parse`] builds one, so `photo_index` is present exactly
/// when the file name carries a numeric suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShotIdentity {
    camera_id: Uuid,
    sequence: String,
    side: Side,
    photo_name: String,
    photo_index: Option<u64>,
}

impl ShotIdentity {
    pub(crate) fn new(
        camera_id: Uuid,
        sequence: String,
        side: Side,
        photo_name: String,
        photo_index: Option<u64>,
    ) -> Self {
        Self {
            camera_id,
            sequence,
            side,
            photo_name,
            photo_index,
        }
    }

    pub fn camera_id(&self) -> Uuid {
        self.camera_id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn photo_name(&self) -> &str {
        &self.photo_name
    }

    pub fn photo_index(&self) -> Option<u64> {
        self.photo_index
    }
}

/// Optional EXIF-like metadata sent along with a shot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeoMetadata {
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub gps_altitude: Option<Decimal>,
    pub camera_model_name: Option<String>,
    pub make: Option<String>,
}

impl GeoMetadata {
    pub fn is_empty(&self) -> bool {
        *self == GeoMetadata::default()
    }
}

/// Shooting timestamp, kept in the shape it was submitted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShootingDate {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ShootingDate {
    pub fn parse(value: &str) -> Option<Self> {
        if let Ok(zoned) = DateTime::parse_from_rfc3339(value) {
            return Some(ShootingDate::Zoned(zoned));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(ShootingDate::Naive)
    }
}

impl fmt::Display for ShootingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShootingDate::Zoned(date) => f.write_str(&date.to_rfc3339()),
            ShootingDate::Naive(date) => write!(f, "{}", date.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl Serialize for ShootingDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A fully validated shot submission
#[derive(Debug, Clone, PartialEq)]
pub struct ShotSubmission {
    s3_key: String,
    resolution: String,
    file_size: u64,
    shooting_date: ShootingDate,
    metadata: Option<GeoMetadata>,
    identity: ShotIdentity,
}

impl ShotSubmission {
    pub(crate) fn new(
        s3_key: String,
        resolution: String,
        file_size: u64,
        shooting_date: ShootingDate,
        metadata: Option<GeoMetadata>,
        identity: ShotIdentity,
    ) -> Self {
        Self {
            s3_key,
            resolution,
            file_size,
            shooting_date,
            metadata,
            identity,
        }
    }

    pub fn s3_key(&self) -> &str {
        &self.s3_key
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn shooting_date(&self) -> ShootingDate {
        self.shooting_date
    }

    pub fn metadata(&self) -> Option<&GeoMetadata> {
        self.metadata.as_ref()
    }

    pub fn identity(&self) -> &ShotIdentity {
        &self.identity
    }

    pub fn key(&self) -> ShotKey {
        keys::derive_key(&self.identity)
    }
}

/// Submitted fields plus the derived identity, as echoed back on creation
impl Serialize for ShotSubmission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            s3_key: &'a str,
            resolution: &'a str,
            file_size: u64,
            shooting_date: ShootingDate,
            metadata: Option<&'a GeoMetadata>,
            camera_id: Uuid,
            sequence: &'a str,
            side: Side,
            photo_name: &'a str,
            photo_index: Option<u64>,
        }

        View {
            s3_key: &self.s3_key,
            resolution: &self.resolution,
            file_size: self.file_size,
            shooting_date: self.shooting_date,
            metadata: self.metadata.as_ref(),
            camera_id: self.identity.camera_id,
            sequence: &self.identity.sequence,
            side: self.identity.side,
            photo_name: &self.identity.photo_name,
            photo_index: self.identity.photo_index,
        }
        .serialize(serializer)
    }
}

/// A persisted shot. Its key is always derived from the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredShot {
    identity: ShotIdentity,
    resolution: String,
    file_size: u64,
    shooting_date: ShootingDate,
    metadata: GeoMetadata,
}

impl StoredShot {
    pub(crate) fn new(
        identity: ShotIdentity,
        resolution: String,
        file_size: u64,
        shooting_date: ShootingDate,
        metadata: GeoMetadata,
    ) -> Self {
        Self {
            identity,
            resolution,
            file_size,
            shooting_date,
            metadata,
        }
    }

    pub fn identity(&self) -> &ShotIdentity {
        &self.identity
    }

    pub fn side(&self) -> Side {
        self.identity.side
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn shooting_date(&self) -> ShootingDate {
        self.shooting_date
    }

    pub fn metadata(&self) -> &GeoMetadata {
        &self.metadata
    }

    pub fn key(&self) -> ShotKey {
        keys::derive_key(&self.identity)
    }

    /// Canonical storage path of the shot
    pub fn path(&self) -> String {
        shot_path::build_path(&self.identity)
    }
}

impl From<&ShotSubmission> for StoredShot {
    fn from(submission: &ShotSubmission) -> Self {
        StoredShot::new(
            submission.identity.clone(),
            submission.resolution.clone(),
            submission.file_size,
            submission.shooting_date,
            submission.metadata.clone().unwrap_or_default(),
        )
    }
}

/// Flat record shape: key, identity, shot fields and metadata side by side
impl Serialize for StoredShot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Record<'a> {
            #[serde(rename = "PK")]
            pk: String,
            #[serde(rename = "SK")]
            sk: String,
            camera_id: Uuid,
            sequence: &'a str,
            side: Side,
            photo_name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            photo_index: Option<u64>,
            resolution: &'a str,
            file_size: u64,
            shooting_date: ShootingDate,
            #[serde(flatten)]
            metadata: FlatMetadata<'a>,
        }

        #[derive(Serialize)]
        struct FlatMetadata<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            gps_latitude: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            gps_longitude: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            gps_altitude: Option<Decimal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            camera_model_name: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            make: Option<&'a str>,
        }

        let key = self.key();
        Record {
            pk: key.pk,
            sk: key.sk,
            camera_id: self.identity.camera_id,
            sequence: &self.identity.sequence,
            side: self.identity.side,
            photo_name: &self.identity.photo_name,
            photo_index: self.identity.photo_index,
            resolution: &self.resolution,
            file_size: self.file_size,
            shooting_date: self.shooting_date,
            metadata: FlatMetadata {
                gps_latitude: self.metadata.gps_latitude,
                gps_longitude: self.metadata.gps_longitude,
                gps_altitude: self.metadata.gps_altitude,
                camera_model_name: self.metadata.camera_model_name.as_deref(),
                make: self.metadata.make.as_deref(),
            },
        }
        .serialize(serializer)
    }
}
