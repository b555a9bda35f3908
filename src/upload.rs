//! File uploading: the plain upload sources and the chunked
//! stash-and-commit state machine.

use std::collections::HashMap;
use std::io::SeekFrom;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::page::WikiPageStub;
use crate::req::upload::{UploadBody, UploadRequest};
use crate::req::{Payload, RequestMessage};
use crate::res::{dispatch_api_error, LenientJsonParser};
use crate::rev::{ApiFileRevision, FileRevision};
use crate::site::info::SiteInfo;
use crate::site::Site;
use crate::types::AutoWatchBehavior;

/// Result code of one `action=upload` call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UploadResultCode {
    Success,
    Warning,
    /// More chunks are expected.
    Continue,
}

/// The server's answer to an upload request.
#[derive(Clone, Debug)]
pub struct UploadResult {
    pub result: UploadResultCode,
    pub file_key: Option<String>,
    /// The next expected offset, when the server reports one.
    pub offset: Option<u64>,
    pub warnings: HashMap<String, Value>,
    pub file_revision: Option<FileRevision>,
    pub duplicate_titles: Vec<String>,
    pub duplicate_versions: Vec<String>,
}

impl UploadResult {
    pub fn is_warning(&self) -> bool {
        self.result == UploadResultCode::Warning
    }

    /// The warning codes, joined for display.
    pub fn warning_codes(&self) -> String {
        let mut codes: Vec<&str> = self.warnings.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes.join(", ")
    }
}

pub(crate) fn parse_upload_result(value: &Value, page: WikiPageStub) -> Result<UploadResult> {
    let upload = value
        .get("upload")
        .ok_or_else(|| Error::InvalidResponse("response lacks an upload object".to_owned()))?;
    let result = match upload.get("result").and_then(Value::as_str) {
        Some("Success") => UploadResultCode::Success,
        Some("Warning") => UploadResultCode::Warning,
        Some("Continue") => UploadResultCode::Continue,
        other => {
            return Err(Error::InvalidResponse(format!(
                "unknown upload result {other:?}"
            )))
        }
    };
    let warnings: HashMap<String, Value> = upload
        .get("warnings")
        .and_then(Value::as_object)
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let duplicate_titles = warnings
        .get("duplicate")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let duplicate_versions = warnings
        .get("duplicateversions")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|v| v.get("timestamp").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let file_revision = upload
        .get("imageinfo")
        .and_then(|ii| serde_json::from_value::<ApiFileRevision>(ii.clone()).ok())
        .map(|rev| rev.into_file_revision(page));
    Ok(UploadResult {
        result,
        file_key: upload
            .get("filekey")
            .or_else(|| upload.get("sessionkey"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        offset: upload.get("offset").and_then(Value::as_u64),
        warnings,
        file_revision,
        duplicate_titles,
        duplicate_versions,
    })
}

/// What `action=upload` sends: a full body, a URL for the server to
/// fetch, or a previously stashed file key.
pub enum UploadSource {
    Bytes(Bytes),
    /// One-shot stream; an upload from it cannot be retried.
    Stream(reqwest::Body),
    Url(String),
    FileKey(String),
}

impl UploadSource {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn stream(body: reqwest::Body) -> Self {
        Self::Stream(body)
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn file_key(key: impl Into<String>) -> Self {
        Self::FileKey(key.into())
    }

    /// A second copy for the badtoken retry; `None` for one-shot streams.
    pub(crate) fn try_clone(&self) -> Option<UploadSource> {
        match self {
            Self::Bytes(b) => Some(Self::Bytes(b.clone())),
            Self::Stream(_) => None,
            Self::Url(u) => Some(Self::Url(u.clone())),
            Self::FileKey(k) => Some(Self::FileKey(k.clone())),
        }
    }

    /// The `action=upload` body parameters. Stashed keys are emitted as
    /// `filekey` on 1.18+ servers and `sessionkey` before.
    pub(crate) fn into_upload_body(self, info: &SiteInfo) -> UploadBody {
        let legacy_session_key = !info.version.at_least(1, 18);
        match self {
            Self::Bytes(data) => UploadBody::File {
                payload: Payload::bytes(data),
            },
            Self::Stream(body) => UploadBody::File {
                payload: Payload::stream(body),
            },
            Self::Url(url) => UploadBody::Url { url },
            Self::FileKey(key) => UploadBody::FileKey {
                key,
                legacy_session_key,
            },
        }
    }
}

/// Phase of a chunked upload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StashPhase {
    /// Ready for the next `stash_next_chunk` call.
    ChunkImpending,
    /// Every byte is stashed; the file key is ready for the final upload.
    AllStashed,
    Failed,
}

const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

struct ChunkState<R> {
    source: R,
    original_start: u64,
    total_size: u64,
    uploaded: u64,
    chunk_size: u64,
    file_key: Option<String>,
    phase: StashPhase,
}

/// Stash-and-commit upload of a large seekable byte source.
///
/// The source is pushed to the server chunk by chunk (`stash=1`); any
/// offset the server reports, on failure or success, is adopted as
/// authoritative and the read cursor rewound to match. The machine is
/// strictly single-writer: a `stash_next_chunk` while another is in
/// flight fails with [`Error::ConcurrentStash`].
pub struct ChunkedUploadSource<R> {
    site: Site,
    filename: String,
    state: Mutex<ChunkState<R>>,
}

impl<R: AsyncRead + AsyncSeek + Send + Unpin> ChunkedUploadSource<R> {
    /// Wraps a seekable source. The upload covers the bytes from the
    /// source's current position to its end; the chunk size defaults to
    /// 1 MiB clamped to the site's advertised bounds.
    pub async fn new(site: Site, filename: impl Into<String>, mut source: R) -> Result<Self> {
        let original_start = source.stream_position().await?;
        let end = source.seek(SeekFrom::End(0)).await?;
        source.seek(SeekFrom::Start(original_start)).await?;
        let chunk_size = match site.site_info() {
            Ok(info) => clamp_chunk_size(DEFAULT_CHUNK_SIZE, &info),
            Err(_) => DEFAULT_CHUNK_SIZE,
        };
        Ok(Self {
            site,
            filename: filename.into(),
            state: Mutex::new(ChunkState {
                source,
                original_start,
                total_size: end.saturating_sub(original_start),
                uploaded: 0,
                chunk_size,
                file_key: None,
                phase: StashPhase::ChunkImpending,
            }),
        })
    }

    /// Overrides the chunk size. Call before the first stash.
    pub fn with_chunk_size(self, size: u64) -> Self {
        let mut st = self.state.into_inner();
        st.chunk_size = size.max(1);
        Self {
            site: self.site,
            filename: self.filename,
            state: Mutex::new(st),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub async fn total_size(&self) -> u64 {
        self.state.lock().await.total_size
    }

    pub async fn uploaded_size(&self) -> u64 {
        self.state.lock().await.uploaded
    }

    pub async fn phase(&self) -> StashPhase {
        self.state.lock().await.phase
    }

    /// The stash key, once the first chunk is up.
    pub async fn file_key(&self) -> Option<String> {
        self.state.lock().await.file_key.clone()
    }

    /// Reads and stashes the next chunk. The returned result carries
    /// `Continue` until the final chunk answers `Success`, after which
    /// the machine is in [`StashPhase::AllStashed`].
    pub async fn stash_next_chunk(&self, cancel: &CancellationToken) -> Result<UploadResult> {
        let mut st = self
            .state
            .try_lock()
            .map_err(|_| Error::ConcurrentStash)?;
        match st.phase {
            StashPhase::ChunkImpending => {}
            StashPhase::AllStashed => {
                return Err(Error::InvalidOperation("the upload is already fully stashed"))
            }
            StashPhase::Failed => {
                return Err(Error::InvalidOperation("the upload source has failed"))
            }
        }
        let legacy_session_key = !self
            .site
            .site_info()
            .map(|i| i.version.at_least(1, 18))
            .unwrap_or(true);

        loop {
            let offset = st.uploaded;
            let seek_to = st.original_start + offset;
            st.source.seek(SeekFrom::Start(seek_to)).await?;
            let want = (st.total_size - offset).min(st.chunk_size) as usize;
            let mut buf = vec![0u8; want];
            let mut filled = 0;
            while filled < want {
                let n = st.source.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            let chunk = Bytes::from(buf);
            let chunk_len = chunk.len() as u64;

            match self
                .send_chunk(&mut st, chunk, offset, legacy_session_key, cancel)
                .await?
            {
                ChunkOutcome::Stashed(result) => {
                    match result.offset {
                        Some(server_offset) => {
                            if server_offset != offset + chunk_len {
                                warn!(
                                    client = offset + chunk_len,
                                    server = server_offset,
                                    "server disagrees on upload offset, adopting its value"
                                );
                            }
                            st.uploaded = server_offset;
                        }
                        None => st.uploaded = offset + chunk_len,
                    }
                    if let Some(key) = &result.file_key {
                        st.file_key = Some(key.clone());
                    }
                    if result.result == UploadResultCode::Success {
                        st.phase = StashPhase::AllStashed;
                        debug!(filename = %self.filename, "all chunks stashed");
                    }
                    return Ok(result);
                }
                ChunkOutcome::RetryFrom(server_offset) => {
                    warn!(
                        client = offset,
                        server = server_offset,
                        "stash failed with a corrective offset, resuming from it"
                    );
                    st.uploaded = server_offset;
                }
            }
        }
    }

    /// One chunk POST, with the one-shot badtoken retry.
    async fn send_chunk(
        &self,
        st: &mut ChunkState<R>,
        chunk: Bytes,
        offset: u64,
        legacy_session_key: bool,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome> {
        for attempt in 0..2u8 {
            let token = self.site.get_token("csrf", cancel).await?;
            let params = UploadRequest {
                filename: self.filename.clone(),
                comment: None,
                text: None,
                watch: AutoWatchBehavior::Preferences,
                ignore_warnings: true,
                token,
                body: UploadBody::Chunk {
                    chunk: chunk.clone(),
                    offset,
                    total_size: st.total_size,
                    file_key: st.file_key.clone(),
                    legacy_session_key,
                },
            }
            .build();
            let gate = self.site.mutation_gate().await;
            let result = self
                .site
                .invoke(RequestMessage::post(params), &LenientJsonParser, cancel)
                .await;
            gate.mark();
            // transport failures and cancellation leave the machine
            // resumable: uploaded size and file key are untouched
            let value = result?;
            if let Some(error) = value.get("error") {
                let code = error.get("code").and_then(Value::as_str).unwrap_or("");
                if code == "badtoken" && attempt == 0 {
                    self.site.invalidate_token("csrf");
                    continue;
                }
                if code == "stashfailed" {
                    if let Some(server_offset) = error.get("offset").and_then(Value::as_u64) {
                        return Ok(ChunkOutcome::RetryFrom(server_offset));
                    }
                }
                let err = dispatch_api_error(&value)
                    .unwrap_or_else(|| Error::InvalidResponse("unreadable error".to_owned()));
                st.phase = StashPhase::Failed;
                return Err(err);
            }
            let result = parse_upload_result(
                &value,
                WikiPageStub::from_title(format!("File:{}", self.filename)),
            )?;
            return Ok(ChunkOutcome::Stashed(result));
        }
        st.phase = StashPhase::Failed;
        Err(Error::InvalidResponse(
            "token refresh loop ended unexpectedly".to_owned(),
        ))
    }

    /// The stashed upload as a source for the final, committing
    /// `action=upload` call.
    pub async fn to_upload_source(&self) -> Result<UploadSource> {
        let st = self.state.lock().await;
        if st.phase != StashPhase::AllStashed {
            return Err(Error::InvalidOperation("the upload is not fully stashed yet"));
        }
        let key = st
            .file_key
            .clone()
            .ok_or(Error::InvalidOperation("stash finished without a file key"))?;
        Ok(UploadSource::FileKey(key))
    }
}

enum ChunkOutcome {
    Stashed(UploadResult),
    RetryFrom(u64),
}

fn clamp_chunk_size(mut size: u64, info: &SiteInfo) -> u64 {
    if let Some(min) = info.min_upload_chunk_size {
        size = size.max(min);
    }
    if let Some(max) = info.max_upload_size {
        size = size.min(max);
    }
    size.max(1)
}
