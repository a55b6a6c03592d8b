//! On-disk entry format
//!
//! `[u32 big-endian header length][JSON EntryHeader][body bytes]`

use crate::error::{CacheError, Result};
use crate::types::{CachedResponse, RequestKey};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const LEN_PREFIX: usize = 4;

/// Metadata stored in front of every entry body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryHeader {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

impl EntryHeader {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), self.url.clone())
    }
}

pub fn encode(key: &RequestKey, response: &CachedResponse) -> Result<Vec<u8>> {
    let header = EntryHeader {
        method: key.method.clone(),
        url: key.url.clone(),
        status: response.status,
        headers: response.headers.clone(),
        size: response.len(),
        stored_at: Utc::now(),
    };
    let json = serde_json::to_vec(&header)?;
    let len = u32::try_from(json.len())
        .map_err(|_| CacheError::CorruptEntry("entry header too large".to_string()))?;

    let mut out = Vec::with_capacity(LEN_PREFIX + json.len() + response.body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(&response.body);
    Ok(out)
}

pub fn decode(raw: Bytes) -> Result<(EntryHeader, CachedResponse)> {
    if raw.len() < LEN_PREFIX {
        return Err(CacheError::CorruptEntry("missing length prefix".to_string()));
    }
    let len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let body_start = LEN_PREFIX + len;
    if raw.len() < body_start {
        return Err(CacheError::CorruptEntry("truncated header".to_string()));
    }

    let header: EntryHeader = serde_json::from_slice(&raw[LEN_PREFIX..body_start])?;
    let body = raw.slice(body_start..);
    if body.len() as u64 != header.size {
        return Err(CacheError::CorruptEntry(format!(
            "body is {} bytes, header says {}",
            body.len(),
            header.size
        )));
    }

    let response = CachedResponse {
        status: header.status,
        headers: header.headers.clone(),
        body,
    };
    Ok((header, response))
}

/// Read only the header of an entry file, leaving the body on disk
pub async fn read_header(path: &Path) -> Result<EntryHeader> {
    let mut file = File::open(path).await?;
    let mut prefix = [0u8; LEN_PREFIX];
    file.read_exact(&mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as u64;
    let available = file.metadata().await?.len().saturating_sub(LEN_PREFIX as u64);
    if len > available {
        return Err(CacheError::CorruptEntry(format!(
            "header length {} exceeds {} remaining bytes",
            len, available
        )));
    }

    let mut json = vec![0u8; len as usize];
    file.read_exact(&mut json).await?;

    Ok(serde_json::from_slice(&json)?)
}
