use crate::model::{GeoMetadata, ShootingDate, ShotSubmission};
use crate::shot_path::{self, PathError};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+x[0-9]+$").expect("valid regex"));

/// Request document as received, before any field is checked.
///
/// Fields are kept as raw JSON so that missing or mistyped fields become
/// field errors instead of failing the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawShotRequest {
    pub s3_key: Option<Value>,
    pub resolution: Option<Value>,
    pub file_size: Option<Value>,
    pub shooting_date: Option<Value>,
    pub metadata: Option<Value>,
}

impl RawShotRequest {
    /// Decode a request body. An empty body is an empty document; anything
    /// other than a JSON object is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        match serde_json::from_slice::<Value>(body)? {
            object @ Value::Object(_) => serde_json::from_value(object),
            _ => Err(serde::de::Error::custom("expected a JSON object")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    Type,
    Format,
    Range,
    Decimal,
    Structural,
    Identity,
}

/// A single failing field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, FieldErrorKind::Missing, format!("{field} is required"))
    }

    fn path(error: &PathError) -> Self {
        let kind = match error {
            PathError::Structural(_) => FieldErrorKind::Structural,
            PathError::Identity { .. } => FieldErrorKind::Identity,
        };
        Self::new("s3_key", kind, error.to_string())
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field failures of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    /// Raw camera segment of the path, when the path had four segments
    pub camera: Option<String>,
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.field.as_str())
    }
}

impl std::error::Error for ValidationErrors {}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        match &self.camera {
            Some(camera) => write!(f, "Validation failed for camera '{camera}': {details}"),
            None => write!(f, "Validation failed: {details}"),
        }
    }
}

/// Validate a raw request into a [`ShotSubmission`].
///
/// Every field is checked independently and all failures are reported
/// together. The storage path counts as a single field: its segments are
/// checked in order and only the first failing segment is reported.
pub fn validate(raw: &RawShotRequest) -> Result<ShotSubmission, ValidationErrors> {
    let mut errors = Vec::new();
    let mut camera = None;

    let path = match raw.s3_key.as_ref().map(|v| required_str(v, "s3_key")) {
        None | Some(Err(None)) => Err(FieldError::missing("s3_key")),
        Some(Err(Some(err))) => Err(err),
        Some(Ok(key)) => {
            let key = key.trim();
            if key.is_empty() {
                Err(FieldError::new(
                    "s3_key",
                    FieldErrorKind::Format,
                    "s3_key cannot be empty",
                ))
            } else {
                match shot_path::parse(key) {
                    Ok(identity) => {
                        camera = Some(identity.camera_id().to_string());
                        Ok((key.to_string(), identity))
                    }
                    Err(err) => {
                        camera = err.camera().map(str::to_string);
                        Err(FieldError::path(&err))
                    }
                }
            }
        }
    };
    let path = collect(&mut errors, path);

    let resolution = collect(&mut errors, validate_resolution(raw.resolution.as_ref()));
    let file_size = collect(&mut errors, validate_file_size(raw.file_size.as_ref()));
    let shooting_date = collect(&mut errors, validate_shooting_date(raw.shooting_date.as_ref()));
    let metadata = match validate_metadata(raw.metadata.as_ref()) {
        Ok(metadata) => metadata,
        Err(metadata_errors) => {
            errors.extend(metadata_errors);
            None
        }
    };

    match (path, resolution, file_size, shooting_date) {
        (Some((s3_key, identity)), Some(resolution), Some(file_size), Some(shooting_date))
            if errors.is_empty() =>
        {
            Ok(ShotSubmission::new(
                s3_key,
                resolution,
                file_size,
                shooting_date,
                metadata,
                identity,
            ))
        }
        _ => Err(ValidationErrors { camera, errors }),
    }
}

fn collect<T>(errors: &mut Vec<FieldError>, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

/// `Err(None)` for null, `Err(Some(_))` for a non-string value
fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, Option<FieldError>> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Err(None),
        _ => Err(Some(FieldError::new(
            field,
            FieldErrorKind::Type,
            format!("{field} must be a string"),
        ))),
    }
}

fn present<'a>(value: Option<&'a Value>, field: &str) -> Result<&'a Value, FieldError> {
    match value {
        None | Some(Value::Null) => Err(FieldError::missing(field)),
        Some(value) => Ok(value),
    }
}

fn validate_resolution(value: Option<&Value>) -> Result<String, FieldError> {
    let value = present(value, "resolution")?;
    let resolution = required_str(value, "resolution")
        .map_err(|err| err.unwrap_or_else(|| FieldError::missing("resolution")))?;

    if !RESOLUTION_RE.is_match(resolution) {
        return Err(FieldError::new(
            "resolution",
            FieldErrorKind::Format,
            "resolution must be in the format \"intxint\", e.g. \"1920x1080\"",
        ));
    }
    Ok(resolution.to_string())
}

fn validate_file_size(value: Option<&Value>) -> Result<u64, FieldError> {
    let not_integer = || {
        FieldError::new(
            "file_size",
            FieldErrorKind::Type,
            "file_size must be an integer",
        )
    };
    let negative = || {
        FieldError::new(
            "file_size",
            FieldErrorKind::Range,
            "file_size must be greater than or equal to 0",
        )
    };

    let size: i128 = match present(value, "file_size")? {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                v.into()
            } else if let Some(v) = n.as_i64() {
                v.into()
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < u64::MAX as f64 => f as i128,
                    _ => return Err(not_integer()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i128>().map_err(|_| not_integer())?,
        _ => return Err(not_integer()),
    };

    if size < 0 {
        return Err(negative());
    }
    u64::try_from(size).map_err(|_| not_integer())
}

fn validate_shooting_date(value: Option<&Value>) -> Result<ShootingDate, FieldError> {
    let value = present(value, "shooting_date")?;
    let date = required_str(value, "shooting_date")
        .map_err(|err| err.unwrap_or_else(|| FieldError::missing("shooting_date")))?;

    ShootingDate::parse(date.trim()).ok_or_else(|| {
        FieldError::new(
            "shooting_date",
            FieldErrorKind::Format,
            "shooting_date must be an ISO-8601 date-time",
        )
    })
}

fn validate_metadata(value: Option<&Value>) -> Result<Option<GeoMetadata>, Vec<FieldError>> {
    let object = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(object)) => object,
        Some(_) => {
            return Err(vec![FieldError::new(
                "metadata",
                FieldErrorKind::Type,
                "metadata must be an object",
            )])
        }
    };

    let mut errors = Vec::new();
    let gps_latitude = collect(
        &mut errors,
        metadata_decimal(object, "GPSLatitude", "gps_latitude"),
    );
    let gps_longitude = collect(
        &mut errors,
        metadata_decimal(object, "GPSLongitude", "gps_longitude"),
    );
    let gps_altitude = collect(
        &mut errors,
        metadata_decimal(object, "GPSAltitude", "gps_altitude"),
    );
    let camera_model_name = collect(
        &mut errors,
        metadata_text(object, "Camera Model Name", "camera_model_name"),
    );
    let make = collect(&mut errors, metadata_text(object, "Make", "make"));

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Some(GeoMetadata {
        gps_latitude: gps_latitude.flatten(),
        gps_longitude: gps_longitude.flatten(),
        gps_altitude: gps_altitude.flatten(),
        camera_model_name: camera_model_name.flatten(),
        make: make.flatten(),
    }))
}

/// Alias wins over field name when both are sent
fn metadata_value<'a>(object: &'a Map<String, Value>, alias: &str, name: &str) -> Option<&'a Value> {
    object
        .get(alias)
        .or_else(|| object.get(name))
        .filter(|v| !v.is_null())
}

fn metadata_decimal(
    object: &Map<String, Value>,
    alias: &str,
    name: &str,
) -> Result<Option<Decimal>, FieldError> {
    let field = format!("metadata.{alias}");
    let text = match metadata_value(object, alias, name) {
        None => return Ok(None),
        // Number text, not f64, so the stored value is exactly what was sent
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            return Err(FieldError::new(
                field,
                FieldErrorKind::Type,
                format!("{alias} must be a number or a numeric string"),
            ))
        }
    };

    parse_decimal(&text).map(Some).ok_or_else(|| {
        FieldError::new(
            field,
            FieldErrorKind::Decimal,
            format!("{alias} must be a valid decimal, got '{text}'"),
        )
    })
}

pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn metadata_text(
    object: &Map<String, Value>,
    alias: &str,
    name: &str,
) -> Result<Option<String>, FieldError> {
    match metadata_value(object, alias, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(FieldError::new(
            format!("metadata.{alias}"),
            FieldErrorKind::Type,
            format!("{alias} must be a string"),
        )),
    }
}
