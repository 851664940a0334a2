//! Fetching and parsing of changelog directory listings and changeset
//! files.

use crate::core::Triple;
use crate::error::{Error, Result};
use crate::parsing::parse_triple_line;
use flate2::read::GzDecoder;
use futures_util::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

use super::cursor::ChangeCursor;

/// The kind of operation a changeset file describes, recognized from a
/// marker substring in its filename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Added,
    Removed,
}

impl OperationKind {
    pub fn as_marker(&self) -> &'static str {
        match self {
            OperationKind::Added => "added",
            OperationKind::Removed => "removed",
        }
    }
}

/// One downloaded changeset: a batch of triples tagged with the
/// operation they describe and the cursor of the file they came from.
#[derive(Clone, Debug)]
pub struct ChangeBatch {
    pub kind: OperationKind,
    pub triples: Vec<Triple>,
    pub source: ChangeCursor,
}

/// A changeset filename accepted for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedFile {
    pub name: String,
    pub sequence: u32,
    pub kind: OperationKind,
}

/// Downloads changelog directory listings and changeset files.
///
/// Every fetch failure here is local: an unreachable hour degrades to
/// zero files and a malformed changeset line is skipped, so one bad
/// hour never aborts a polling cycle.
pub struct ChangelogFetcher {
    client: reqwest::Client,
    base_url: String,
    accepted_kinds: Vec<OperationKind>,
    anchor_re: Regex,
    sequence_re: Regex,
}

impl ChangelogFetcher {
    pub fn new(base_url: &str, accepted_kinds: Vec<OperationKind>) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url,
            accepted_kinds,
            anchor_re: Regex::new(r"<a[^>]*>([^<]+)</a>").unwrap(),
            sequence_re: Regex::new(r"^(\d+)").unwrap(),
        }
    }

    /// List the changeset filenames published for one hour.
    ///
    /// The upstream feed serves plain HTML directory listings; the
    /// anchor text entries are the filenames.
    pub async fn list_hour(&self, hour_path: &str) -> Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, hour_path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "status {} listing {}",
                response.status(),
                url
            )));
        }
        let body = response.text().await?;
        Ok(self.extract_filenames(&body))
    }

    /// Pull the anchor text entries out of a directory listing body.
    pub fn extract_filenames(&self, body: &str) -> Vec<String> {
        self.anchor_re
            .captures_iter(body)
            .map(|c| c[1].trim().to_string())
            .filter(|name| !name.is_empty() && self.sequence_of(name).is_some())
            .collect()
    }

    /// Keep the filenames whose sequence number lies in
    /// `[min_seq, max_seq)` and whose name carries an accepted kind
    /// marker. A `max_seq` of zero means no upper bound.
    pub fn filter_accepted(
        &self,
        filenames: &[String],
        min_seq: u32,
        max_seq: u32,
    ) -> Vec<AcceptedFile> {
        let mut accepted: Vec<AcceptedFile> = filenames
            .iter()
            .filter_map(|name| {
                let sequence = self.sequence_of(name)?;
                if sequence < min_seq || (max_seq != 0 && sequence >= max_seq) {
                    return None;
                }
                let kind = self.classify(name)?;
                Some(AcceptedFile { name: name.clone(), sequence, kind })
            })
            .collect();
        accepted.sort_by_key(|file| file.sequence);
        accepted
    }

    /// Classify a filename by the first matching kind marker in the
    /// configured priority order.
    pub fn classify(&self, filename: &str) -> Option<OperationKind> {
        self.accepted_kinds
            .iter()
            .copied()
            .find(|kind| filename.contains(kind.as_marker()))
    }

    fn sequence_of(&self, filename: &str) -> Option<u32> {
        self.sequence_re
            .captures(filename)
            .and_then(|c| c[1].parse().ok())
    }

    /// Download one changeset file and parse it into a batch.
    pub async fn download(&self, hour: &ChangeCursor, file: &AcceptedFile) -> Result<ChangeBatch> {
        let hour_path = hour.hour_path();
        let url = format!("{}{}{}", self.base_url, hour_path, file.name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "status {} downloading {}",
                response.status(),
                url
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Download(format!("{}: {}", url, e)))?;
        let text = decompress(&bytes)
            .map_err(|e| Error::Download(format!("{}: {}", url, e)))?;

        let mut source = *hour;
        source.set_sequence(file.sequence);
        Ok(parse_changeset(&text, file.kind, source))
    }

    /// List and download every accepted changeset of one hour, in
    /// parallel. Failures are logged and degrade to fewer (or zero)
    /// batches; the returned batches are in sequence order.
    pub async fn fetch_hour(
        &self,
        hour: &ChangeCursor,
        min_seq: u32,
        max_seq: u32,
    ) -> Vec<ChangeBatch> {
        let hour_path = hour.hour_path();
        let filenames = match self.list_hour(&hour_path).await {
            Ok(filenames) => filenames,
            Err(e) => {
                tracing::warn!("no changesets for hour {}: {}", hour_path, e);
                return Vec::new();
            }
        };

        let accepted = self.filter_accepted(&filenames, min_seq, max_seq);
        let downloads = join_all(accepted.iter().map(|file| self.download(hour, file))).await;

        let mut batches = Vec::new();
        for result in downloads {
            match result {
                Ok(batch) => batches.push(batch),
                Err(e) => tracing::warn!("skipping changeset: {}", e),
            }
        }
        batches
    }
}

/// Gunzip a downloaded changeset body.
pub fn decompress(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

/// Parse a decompressed changeset body into a batch.
///
/// Comment lines start with `#`. A malformed line is logged and
/// skipped; one bad line must never drop a whole hour of changes.
pub fn parse_changeset(text: &str, kind: OperationKind, source: ChangeCursor) -> ChangeBatch {
    let mut triples = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_triple_line(line) {
            Ok(triple) => triples.push(triple),
            Err(e) => tracing::warn!("skipping malformed changeset line: {}", e),
        }
    }
    ChangeBatch { kind, triples, source }
}
