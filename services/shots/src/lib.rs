//! Tikee Shot Service
//!
//! Ingestion of stereo-camera shots. Each request describes one side of a
//! photo pair by its storage path `<camera uuid>/<sequence>/<side>/<filename>`.
//! The service validates the request, derives the shot identity and storage
//! key from the path, stores it in DynamoDB, and asks the stitcher to merge
//! the pair once both `left` and `right` are present with the same resolution.
//!
//! ## Architecture
//!
//! ```text
//!  POST /shots
//!       │
//!       ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Validator    │──▶│ Shot Path    │──▶│ Keys         │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐   query / put   ┌──────────────┐
//! │ Shot Service │────────────────▶│ DynamoDB     │
//! │  + Pairing   │                 └──────────────┘
//! └──────────────┘
//!       │ both sides stored
//!       ▼
//! ┌──────────────┐
//! │ Stitcher     │ (async Lambda invocation)
//! └──────────────┘
//! ```
//!
//! The same router runs under the Lambda runtime or as a standalone server.

pub mod api;
pub mod config;
pub mod handler;
pub mod keys;
pub mod model;
pub mod pairing;
pub mod shot_path;
pub mod shot_store;
pub mod stitcher;
pub mod validator;

pub use api::{create_router, AppState};
pub use config::Config;
pub use handler::{CreateShotError, ShotService};
pub use keys::{derive_key, ShotKey};
pub use model::{GeoMetadata, ShootingDate, ShotIdentity, ShotSubmission, Side, StoredShot};
pub use pairing::{PairingDecision, ResolutionMismatch};
pub use shot_path::{build_path, PathError};
pub use shot_store::{DynamoShotStore, MemoryShotStore, ShotRepository, StoreError};
pub use stitcher::{LambdaStitchNotifier, StitchNotifier, StitchRequest};
pub use validator::{validate, FieldError, RawShotRequest, ValidationErrors};
