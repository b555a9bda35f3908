//! Parameter builder for `action=upload`.

use bytes::Bytes;

use crate::req::{Params, Payload};
use crate::types::AutoWatchBehavior;

/// One `action=upload` request, in any of its forms: a direct file body,
/// a single stashed chunk, a server-side URL fetch, or the commit of a
/// previously stashed file key.
pub struct UploadRequest {
    pub filename: String,
    pub comment: Option<String>,
    /// Initial page text for a new file description page.
    pub text: Option<String>,
    pub watch: AutoWatchBehavior,
    pub ignore_warnings: bool,
    pub token: String,
    pub body: UploadBody,
}

pub enum UploadBody {
    File {
        payload: Payload,
    },
    Chunk {
        chunk: Bytes,
        offset: u64,
        total_size: u64,
        file_key: Option<String>,
        /// `filekey` on 1.18+, `sessionkey` before.
        legacy_session_key: bool,
    },
    Url {
        url: String,
    },
    FileKey {
        key: String,
        legacy_session_key: bool,
    },
}

impl UploadRequest {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "upload");
        params.insert("filename", self.filename.clone());
        params.insert_opt("comment", self.comment);
        params.insert_opt("text", self.text);
        params.insert("watchlist", self.watch);
        if self.ignore_warnings {
            params.insert("ignorewarnings", true);
        }
        match self.body {
            UploadBody::File { payload } => {
                params.insert("file", payload.with_filename(self.filename));
            }
            UploadBody::Chunk {
                chunk,
                offset,
                total_size,
                file_key,
                legacy_session_key,
            } => {
                let key_name = if legacy_session_key { "sessionkey" } else { "filekey" };
                params.insert_opt(key_name, file_key);
                params.insert("offset", offset);
                params.insert("filesize", total_size);
                params.insert("stash", true);
                params.insert("chunk", Payload::bytes(chunk).with_filename(self.filename));
            }
            UploadBody::Url { url } => {
                params.insert("url", url);
            }
            UploadBody::FileKey {
                key,
                legacy_session_key,
            } => {
                let key_name = if legacy_session_key { "sessionkey" } else { "filekey" };
                params.insert(key_name, key);
            }
        }
        params.insert("token", self.token);
        params
    }
}
