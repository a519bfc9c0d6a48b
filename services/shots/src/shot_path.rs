use crate::model::{ShotIdentity, Side};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

static SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^my_photo([0-9]+)?\.jpg$").expect("valid regex"));

/// Why a path could not be turned into a [`ShotIdentity`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// Wrong number of segments; nothing about the shot is knowable
    #[error("s3_key must have 4 parts: <uuid>/<sequence>/<side>/<filename> (got {0})")]
    Structural(usize),

    /// One segment is invalid. `camera` is the raw first segment, valid or not.
    #[error("Error processing s3_key for camera '{camera}': {fault}")]
    Identity { camera: String, fault: IdentityFault },
}

impl PathError {
    /// Raw camera segment, when the path had the right shape
    pub fn camera(&self) -> Option<&str> {
        match self {
            PathError::Structural(_) => None,
            PathError::Identity { camera, .. } => Some(camera),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityFault {
    InvalidUuid,
    NonDigitSequence,
    UnknownSide,
    InvalidFilename,
}

impl fmt::Display for IdentityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityFault::InvalidUuid => f.write_str("Invalid UUID in s3_key"),
            IdentityFault::NonDigitSequence => f.write_str("Sequence must be digits"),
            IdentityFault::UnknownSide => {
                write!(f, "Side must be one of: {}", Side::valid_values())
            }
            IdentityFault::InvalidFilename => f.write_str(
                "Filename must be in the format \"my_photo.jpg\" or \"my_photo[int].jpg\"",
            ),
        }
    }
}

/// Whether `sequence` is a valid sequence segment (ASCII digits only)
pub fn is_sequence(sequence: &str) -> bool {
    SEQUENCE_RE.is_match(sequence)
}

/// Parse a storage path `<camera uuid>/<sequence>/<side>/<filename>` into a
/// shot identity.
///
/// Segments are checked in order and the first failure is returned.
pub fn parse(path: &str) -> Result<ShotIdentity, PathError> {
    let parts: Vec<&str> = path.split('/').collect();
    let [camera, sequence, side, filename] = parts.as_slice() else {
        return Err(PathError::Structural(parts.len()));
    };

    let fail = |fault| PathError::Identity {
        camera: camera.to_string(),
        fault,
    };

    let camera_id = Uuid::parse_str(camera).map_err(|_| fail(IdentityFault::InvalidUuid))?;

    if !is_sequence(sequence) {
        return Err(fail(IdentityFault::NonDigitSequence));
    }

    let side: Side = side.parse().map_err(|_| fail(IdentityFault::UnknownSide))?;

    let captures = FILENAME_RE
        .captures(filename)
        .ok_or_else(|| fail(IdentityFault::InvalidFilename))?;
    let photo_index = captures
        .get(1)
        .map(|digits| digits.as_str().parse::<u64>())
        .transpose()
        .map_err(|_| fail(IdentityFault::InvalidFilename))?;

    Ok(ShotIdentity::new(
        camera_id,
        sequence.to_string(),
        side,
        filename.to_string(),
        photo_index,
    ))
}

/// Canonical path of an identity. Inverse of [`parse`] for canonical
/// (lowercase, hyphenated) camera ids.
pub fn build_path(identity: &ShotIdentity) -> String {
    format!(
        "{}/{}/{}/{}",
        identity.camera_id(),
        identity.sequence(),
        identity.side(),
        identity.photo_name()
    )
}
