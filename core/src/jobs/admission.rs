//! Checks that run before a job record exists. A request refused here
//! never becomes a job and never reaches a request topic.

use std::sync::Arc;

use log::debug;

use crate::codec::FrameCodec;
use crate::config::PipelineConfig;
use crate::jobs::executor::ExecutionError;
use crate::pipeline::{estimate_capacity, InputSource, PipelineError};
use crate::ports::{sealed_len, BlobStore, CryptoProvider};
use crate::stego::CapacityEstimate;
use crate::types::{BlobHandle, ParticipantRef};

pub struct AdmissionCheck {
    codec: Arc<dyn FrameCodec>,
    blobs: Arc<dyn BlobStore>,
    crypto: Arc<dyn CryptoProvider>,
    config: PipelineConfig,
}

impl AdmissionCheck {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        blobs: Arc<dyn BlobStore>,
        crypto: Arc<dyn CryptoProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self { codec, blobs, crypto, config }
    }

    /// The sealed secret plus terminator must fit the carrier's LSB plane.
    /// Probes the carrier, bounded by the job timeout.
    pub fn check_encode(
        &self,
        sender: &ParticipantRef,
        input: &BlobHandle,
        secret: &BlobHandle,
    ) -> Result<CapacityEstimate, ExecutionError> {
        let sealed = sealed_len(self.crypto.as_ref(), sender, self.blobs.size(secret)?);
        let carrier = InputSource::from_blob(self.blobs.clone(), input.clone());
        let estimate = estimate_capacity(self.codec.as_ref(), &carrier, &self.config)?;
        estimate.check_len(sealed).map_err(PipelineError::from)?;
        debug!("[ADMISSION] {}B sealed payload fits {}B of room", sealed, estimate.max_payload_bytes);
        Ok(estimate)
    }
}
