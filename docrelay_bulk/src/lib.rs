//! This crate contains a pure rust implementation of a decoder for the
//! newline-delimited bulk write protocol spoken on the `/_bulk` endpoint.
//!
//! The wire format alternates metadata and body lines: each operation is one
//! JSON metadata line naming the action and target collection, followed by
//! exactly one raw body line for every action except `delete`. The decoder
//! makes no attempt to resynchronize a corrupt stream; the alternating
//! cadence is the only framing there is, so the first bad record poisons the
//! remainder.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use bytes::Bytes;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};
use std::fmt;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("metadata on line {line} is not a JSON object: {source}"))]
    InvalidMetadata {
        line: usize,
        source: serde_json::Error,
    },

    #[snafu(display(
        "metadata on line {line} does not resolve to an action with a target collection"
    ))]
    MalformedMetadata { line: usize },

    #[snafu(display("stream ended before the document body for the operation on line {line}"))]
    TruncatedStream { line: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The four bulk write actions.
///
/// A metadata line may populate more than one action sub-object; which one
/// wins is a fixed policy, not an accident of field order. See
/// [`BulkAction::RESOLUTION_PRIORITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkAction {
    Index,
    Create,
    Delete,
    Update,
}

impl BulkAction {
    /// The order in which populated action sub-objects are considered, both
    /// for resolving the action and for extracting its target payload. The
    /// first entry with a non-empty `_index` wins.
    pub const RESOLUTION_PRIORITY: [Self; 4] = [Self::Index, Self::Create, Self::Delete, Self::Update];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }

    /// `delete` is the only action carried entirely by its metadata line.
    pub fn expects_body(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOperation {
    pub action: BulkAction,
    /// Target collection; always non-empty for a decoded operation.
    pub collection: String,
    /// String form of the `_id` value, which may arrive as a JSON string or
    /// number.
    pub document_id: Option<String>,
    /// Legacy `_type` discriminator, carried through to the backend verbatim.
    pub document_type: Option<String>,
    /// Raw body line; `None` for `delete`.
    pub body: Option<Bytes>,
}

impl WriteOperation {
    /// Re-encodes the metadata line as sent to the backend.
    pub fn encode_metadata(&self) -> String {
        let mut target = serde_json::Map::new();
        target.insert("_index".to_string(), self.collection.clone().into());
        if let Some(ty) = &self.document_type {
            target.insert("_type".to_string(), ty.clone().into());
        }
        if let Some(id) = &self.document_id {
            target.insert("_id".to_string(), id.clone().into());
        }
        let mut outer = serde_json::Map::new();
        outer.insert(self.action.as_str().to_string(), target.into());
        serde_json::to_string(&serde_json::Value::Object(outer)).unwrap()
    }

    /// Appends the operation's wire form (metadata line, then body line if
    /// any) to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.encode_metadata().as_bytes());
        out.push(b'\n');
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
            out.push(b'\n');
        }
    }

    /// The number of bytes this operation contributes to a buffer, i.e. the
    /// size of its wire form including newlines.
    pub fn encoded_len(&self) -> usize {
        let body_len = self.body.as_ref().map(|b| b.len() + 1).unwrap_or_default();
        self.encode_metadata().len() + 1 + body_len
    }
}

/// `_id` values arrive as either a JSON string or a bare number; both are
/// carried as their string form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentId {
    String(String),
    Number(serde_json::Number),
}

impl DocumentId {
    fn into_string(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ActionTarget {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_type", default)]
    ty: Option<String>,
    #[serde(rename = "_id", default)]
    id: Option<DocumentId>,
}

/// The raw shape of a metadata line. Unknown keys are ignored; absent action
/// sub-objects deserialize to `None`.
#[derive(Debug, Default, Deserialize)]
struct BulkMetadata {
    #[serde(default)]
    index: Option<ActionTarget>,
    #[serde(default)]
    create: Option<ActionTarget>,
    #[serde(default)]
    delete: Option<ActionTarget>,
    #[serde(default)]
    update: Option<ActionTarget>,
}

impl BulkMetadata {
    /// Resolves the action by [`BulkAction::RESOLUTION_PRIORITY`], returning
    /// the winning action together with its target payload, or `None` when no
    /// sub-object carries a non-empty `_index`.
    fn resolve(mut self) -> Option<(BulkAction, ActionTarget)> {
        for action in BulkAction::RESOLUTION_PRIORITY {
            let slot = match action {
                BulkAction::Index => &mut self.index,
                BulkAction::Create => &mut self.create,
                BulkAction::Delete => &mut self.delete,
                BulkAction::Update => &mut self.update,
            };
            match slot.take() {
                Some(target) if !target.index.is_empty() => return Some((action, target)),
                _ => {}
            }
        }
        None
    }
}

/// Returns a lazy iterator of the operations encoded in `input`.
///
/// The iterator is fused on the first error: the stream cannot be safely
/// resynchronized past a corrupt record, so everything after it is
/// undecodable by definition. Operations yielded before the error are valid
/// and may be used.
pub fn decode_operations(input: &str) -> Operations<'_> {
    Operations {
        lines: input.lines(),
        line_number: 0,
        failed: false,
    }
}

/// Iterator state for [`decode_operations`].
#[derive(Debug)]
pub struct Operations<'a> {
    lines: std::str::Lines<'a>,
    line_number: usize,
    failed: bool,
}

impl Operations<'_> {
    fn decode_one(&mut self, metadata_line: &str) -> Result<WriteOperation> {
        let metadata_line_number = self.line_number;
        let metadata: BulkMetadata = serde_json::from_str(metadata_line).context(InvalidMetadataSnafu {
            line: metadata_line_number,
        })?;

        let (action, target) = metadata.resolve().context(MalformedMetadataSnafu {
            line: metadata_line_number,
        })?;

        let body = if action.expects_body() {
            let body_line = self.lines.next().context(TruncatedStreamSnafu {
                line: metadata_line_number,
            })?;
            self.line_number += 1;
            Some(Bytes::copy_from_slice(body_line.as_bytes()))
        } else {
            None
        };

        Ok(WriteOperation {
            action,
            collection: target.index,
            document_id: target.id.map(DocumentId::into_string),
            document_type: target.ty,
            body,
        })
    }
}

impl Iterator for Operations<'_> {
    type Item = Result<WriteOperation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(self.decode_one(line).inspect_err(|_| {
            self.failed = true;
        }))
    }
}
