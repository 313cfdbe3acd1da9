//! `app.bsky.video.*`
//!
//! Served by the video service rather than the PDS, with a short-lived
//! service-auth token minted by the PDS for each call.

use super::{Audience, AuthRequirement, Endpoint, ServiceTarget};
use crate::agent::BskyAgent;
use crate::xrpc::{Body, HttpMethod, Idempotency, QueryItems};
use crate::Result;
use bytes::Bytes;
use serde::Deserialize;

/// Processing state of an uploaded video
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Job id
    pub job_id: String,
    /// Uploader DID
    pub did: String,
    /// `JOB_STATE_COMPLETED`, `JOB_STATE_FAILED`, or a processing state
    pub state: String,
    /// Progress percentage
    #[serde(default)]
    pub progress: Option<u8>,
    /// Resulting blob ref, once completed
    #[serde(default)]
    pub blob: Option<serde_json::Value>,
    /// Error code, once failed
    #[serde(default)]
    pub error: Option<String>,
    /// Human readable detail
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatus {
    /// Whether processing finished successfully
    pub fn is_completed(&self) -> bool {
        self.state == "JOB_STATE_COMPLETED"
    }

    /// Whether processing failed
    pub fn is_failed(&self) -> bool {
        self.state == "JOB_STATE_FAILED"
    }
}

/// Wrapper returned by job endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusOutput {
    /// The job
    pub job_status: JobStatus,
}

/// `app.bsky.video.getJobStatus`
#[derive(Debug, Clone)]
pub struct GetJobStatus {
    /// Job id returned by `uploadVideo`
    pub job_id: String,
}

impl Endpoint for GetJobStatus {
    const NSID: &'static str = "app.bsky.video.getJobStatus";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const SERVICE: ServiceTarget = ServiceTarget::Video {
        lxm: "app.bsky.video.getJobStatus",
        audience: Audience::VideoService,
    };
    type Output = JobStatusOutput;

    fn query(&self) -> QueryItems {
        QueryItems::new().with("jobId", &self.job_id)
    }
}

/// `app.bsky.video.getUploadLimits`
#[derive(Debug, Clone, Default)]
pub struct GetUploadLimits;

/// Output of `getUploadLimits`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLimits {
    /// Whether the account may upload now
    pub can_upload: bool,
    /// Uploads left today
    #[serde(default)]
    pub remaining_daily_videos: Option<u64>,
    /// Bytes left today
    #[serde(default)]
    pub remaining_daily_bytes: Option<u64>,
    /// Reason when uploads are not allowed
    #[serde(default)]
    pub message: Option<String>,
    /// Error code when uploads are not allowed
    #[serde(default)]
    pub error: Option<String>,
}

impl Endpoint for GetUploadLimits {
    const NSID: &'static str = "app.bsky.video.getUploadLimits";
    const METHOD: HttpMethod = HttpMethod::Get;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const SERVICE: ServiceTarget = ServiceTarget::Video {
        lxm: "app.bsky.video.getUploadLimits",
        audience: Audience::VideoService,
    };
    type Output = UploadLimits;
}

/// `app.bsky.video.uploadVideo`
///
/// Sent once: a retried upload would start a second processing job.
#[derive(Debug, Clone)]
pub struct UploadVideo {
    /// Uploader DID
    pub did: String,
    /// File name, used for the resulting blob
    pub name: String,
    /// MIME type of `data`
    pub content_type: String,
    /// Video bytes
    pub data: Bytes,
}

impl UploadVideo {
    /// Upload an MP4 file
    pub fn mp4(did: impl Into<String>, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            did: did.into(),
            name: name.into(),
            content_type: "video/mp4".to_string(),
            data: data.into(),
        }
    }
}

impl Endpoint for UploadVideo {
    const NSID: &'static str = "app.bsky.video.uploadVideo";
    const METHOD: HttpMethod = HttpMethod::Post;
    const AUTH: AuthRequirement = AuthRequirement::Required;
    const IDEMPOTENCY: Idempotency = Idempotency::NonIdempotent;
    const SERVICE: ServiceTarget = ServiceTarget::Video {
        lxm: "com.atproto.repo.uploadBlob",
        audience: Audience::Pds,
    };
    type Output = JobStatusOutput;

    fn query(&self) -> QueryItems {
        QueryItems::new()
            .with("did", &self.did)
            .with("name", &self.name)
    }

    fn body(&self) -> std::result::Result<Body, serde_json::Error> {
        Ok(Body::bytes(self.content_type.clone(), self.data.clone()))
    }
}

impl BskyAgent {
    /// Poll a processing job
    pub async fn get_job_status(&self, job_id: impl Into<String>) -> Result<JobStatus> {
        Ok(self
            .call(&GetJobStatus {
                job_id: job_id.into(),
            })
            .await?
            .job_status)
    }

    /// Daily upload allowance of the account
    pub async fn get_upload_limits(&self) -> Result<UploadLimits> {
        self.call(&GetUploadLimits).await
    }

    /// Upload an MP4 video for processing
    pub async fn upload_video(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<JobStatus> {
        let did = self
            .session()
            .map(|s| s.did.clone())
            .ok_or_else(crate::xrpc::XrpcError::missing_session)?;
        Ok(self
            .call(&UploadVideo::mp4(did, name, data))
            .await?
            .job_status)
    }
}
