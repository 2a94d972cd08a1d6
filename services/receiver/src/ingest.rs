//! Per-upload ingestion and accounting.
//!
//! An upload moves through parse → base64 decode → sequence assignment →
//! image validation → persistence. Validation failures before sequence
//! assignment never consume a frame number; failures after it do.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::frame_store::FrameStore;
use crate::image_probe;
use crate::stats::StatsRegister;
use base64::{
    alphabet,
    engine::{general_purpose, GeneralPurpose},
    Engine,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Standard alphabet, padding required, non-zero trailing bits tolerated.
const DEVICE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::PAD.with_decode_allow_trailing_bits(true),
);

/// Wire shape of an upload body
#[derive(Debug, Deserialize)]
struct UploadBody {
    image: String,
    timestamp: i64,
}

/// A validated upload, image already decoded from base64.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub encoded_image: Vec<u8>,
    /// Length of the base64 text as sent
    pub encoded_size: usize,
    /// Device clock in milliseconds
    pub device_timestamp: i64,
}

impl UploadRequest {
    /// Parse a raw JSON body.
    pub fn parse(body: &[u8]) -> Result<Self, IngestError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| IngestError::MalformedRequest(format!("No JSON data received: {}", e)))?;

        if !value.is_object() {
            return Err(IngestError::MalformedRequest(
                "No JSON data received: body is not an object".to_string(),
            ));
        }

        let upload: UploadBody = serde_json::from_value(value).map_err(|e| {
            IngestError::MalformedRequest(format!("Missing required fields: {}", e))
        })?;

        // Some device encoders wrap base64 output; line breaks are not data.
        let compact: Vec<u8> = upload
            .image
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();

        let encoded_image = DEVICE_BASE64
            .decode(&compact)
            .map_err(|e| IngestError::InvalidEncoding(e.to_string()))?;

        Ok(Self {
            encoded_image,
            encoded_size: upload.image.len(),
            device_timestamp: upload.timestamp,
        })
    }
}

/// A frame that made it through ingestion.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub sequence_number: u64,
    pub device_timestamp: i64,
    pub byte_size: usize,
    pub encoded_size: usize,
    pub width: u32,
    pub height: u32,
    pub format_tag: String,
    pub received_at: DateTime<Utc>,
    /// Where the frame was written, if persistence is enabled
    pub path: Option<PathBuf>,
}

impl FrameRecord {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Runs uploads against the shared statistics register and frame store.
pub struct Ingestor {
    stats: Arc<StatsRegister>,
    store: Option<FrameStore>,
    verbose: bool,
    stats_log_interval: u64,
    permits: Arc<Semaphore>,
}

impl Ingestor {
    /// Build an ingestor; opens (and creates) the output directory when
    /// persistence is enabled.
    pub fn new(config: &IngestConfig, stats: Arc<StatsRegister>) -> std::io::Result<Self> {
        let store = if config.save_images {
            Some(FrameStore::open(&config.output_directory)?)
        } else {
            None
        };

        Ok(Self {
            stats,
            store,
            verbose: config.verbose_logging,
            stats_log_interval: config.stats_log_interval,
            permits: Arc::new(Semaphore::new(config.max_concurrent_decodes.max(1))),
        })
    }

    pub fn stats(&self) -> &Arc<StatsRegister> {
        &self.stats
    }

    pub fn store(&self) -> Option<&FrameStore> {
        self.store.as_ref()
    }

    /// Ingest one upload body. Every failure is counted exactly once.
    #[instrument(skip(self, body), fields(body_bytes = body.len()))]
    pub async fn ingest(&self, body: &[u8]) -> Result<FrameRecord, IngestError> {
        match self.try_ingest(body).await {
            Ok(record) => {
                metrics::counter!("receiver.frames.received").increment(1);
                metrics::counter!("receiver.bytes.received").increment(record.byte_size as u64);

                self.log_frame(&record);

                if self.summary_due(record.sequence_number) {
                    let stats = self.stats.clone();
                    tokio::spawn(async move {
                        stats.snapshot().log_summary();
                    });
                }

                Ok(record)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Count and log a failed upload, handing the error back for the response.
    ///
    /// Used for failures detected before the body reaches `ingest`, such as
    /// an oversized request.
    pub fn reject(&self, e: IngestError) -> IngestError {
        self.stats.increment_errors();
        metrics::counter!("receiver.frames.failed", "kind" => e.kind()).increment(1);

        if e.is_client_fault() {
            warn!(kind = e.kind(), error = %e, "Rejected upload");
        } else {
            error!(kind = e.kind(), error = %e, "Failed to process upload");
        }

        e
    }

    /// Whether frame `sequence_number` triggers a statistics summary.
    fn summary_due(&self, sequence_number: u64) -> bool {
        self.stats_log_interval > 0 && sequence_number % self.stats_log_interval == 0
    }

    async fn try_ingest(&self, body: &[u8]) -> Result<FrameRecord, IngestError> {
        let request = UploadRequest::parse(body)?;
        let device_timestamp = request.device_timestamp;
        let byte_size = request.encoded_image.len();
        let encoded_size = request.encoded_size;

        self.stats.set_last_timestamp(device_timestamp);
        let sequence_number = self.stats.increment_received();

        debug!(
            frame_number = sequence_number,
            device_timestamp_ms = device_timestamp,
            size_bytes = byte_size,
            "Frame accepted for processing"
        );

        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IngestError::InternalError(e.to_string()))?;

        let store = self.store.clone();
        let started = Instant::now();

        let (info, path) = tokio::task::spawn_blocking(move || {
            let info = image_probe::probe(&request.encoded_image)?;
            let path = match store {
                Some(store) => Some(store.store(
                    sequence_number,
                    device_timestamp,
                    info.extension(),
                    &request.encoded_image,
                )?),
                None => None,
            };
            Ok::<_, IngestError>((info, path))
        })
        .await
        .map_err(|e| IngestError::InternalError(format!("frame worker failed: {}", e)))??;

        metrics::histogram!("receiver.frame.processing_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(FrameRecord {
            sequence_number,
            device_timestamp,
            byte_size,
            encoded_size,
            width: info.width,
            height: info.height,
            format_tag: info.format_tag(),
            received_at: Utc::now(),
            path,
        })
    }

    fn log_frame(&self, record: &FrameRecord) {
        let file = record
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.verbose {
            info!(
                frame_number = record.sequence_number,
                device_timestamp_ms = record.device_timestamp,
                image_kb = %format!("{:.2}", record.byte_size as f64 / 1024.0),
                base64_kb = %format!("{:.2}", record.encoded_size as f64 / 1024.0),
                resolution = %record.resolution(),
                format = %record.format_tag,
                file = %file,
                "Frame received"
            );
        } else {
            debug!(
                frame_number = record.sequence_number,
                device_timestamp_ms = record.device_timestamp,
                size_bytes = record.byte_size,
                resolution = %record.resolution(),
                file = %file,
                "Frame received"
            );
        }
    }
}
