//! Frame Receiver
//!
//! Diagnostic ingestion endpoint for a remote camera device. The device posts
//! base64-encoded frames at a fixed cadence; this service validates each one,
//! writes it to disk and keeps running statistics so an operator can confirm
//! the device is sending well-formed frames at the expected rate.
//!
//! ## Architecture
//!
//! ```text
//!   Camera                 Frame Receiver                      Disk
//! ┌────────┐  POST      ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ device │──/upload──▶│ Ingestor     │──▶│ Image Probe  │   │ received_frames/ │
//! └────────┘            └──────────────┘   └──────────────┘   │   frame_*.jpg    │
//!                              │                  │           └──────────────────┘
//!                              ▼                  ▼                    ▲
//!                       ┌──────────────┐   ┌──────────────┐            │
//!                       │ Stats        │   │ Frame Store  │────────────┘
//!                       │ Register     │   └──────────────┘
//!                       └──────────────┘
//!                              │
//!                              ▼
//!                   GET /stats, GET /health, GET /
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod frame_store;
pub mod image_probe;
pub mod ingest;
pub mod stats;

pub use api::{create_router, AppState, UploadResponse};
pub use self::config::Config;
pub use error::IngestError;
pub use frame_store::FrameStore;
pub use image_probe::{probe, ImageInfo};
pub use ingest::{FrameRecord, Ingestor, UploadRequest};
pub use stats::{StatsRegister, StatsReport, StatsSnapshot};
