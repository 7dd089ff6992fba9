//! Per-path metadata produced by a probe batch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Short flags emitted by the probe script, in test order.
pub const FLAG_EXISTS: &str = "e";
pub const FLAG_REGULAR: &str = "f";
pub const FLAG_READABLE: &str = "r";
pub const FLAG_WRITABLE: &str = "w";
pub const FLAG_DIRECTORY: &str = "d";
pub const FLAG_SYMLINK: &str = "l";

/// Results of the `test` predicates run against one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeFlags {
	pub exists: bool,
	pub regular: bool,
	pub readable: bool,
	pub writable: bool,
	pub directory: bool,
	pub symlink: bool,
}

impl AttributeFlags {
	/// Parses a space-joined flag line such as `e f r w `.
	pub fn parse(line: &str) -> Result<Self> {
		let mut flags = Self::default();
		for token in line.split_whitespace() {
			match token {
				FLAG_EXISTS => flags.exists = true,
				FLAG_REGULAR => flags.regular = true,
				FLAG_READABLE => flags.readable = true,
				FLAG_WRITABLE => flags.writable = true,
				FLAG_DIRECTORY => flags.directory = true,
				FLAG_SYMLINK => flags.symlink = true,
				other => return Err(ProtocolError::UnknownFlag(other.to_string())),
			}
		}
		Ok(flags)
	}

	/// Whether the probe emits this path's content.
	pub fn is_readable_file(&self) -> bool {
		self.regular && self.readable
	}
}

/// Fields of the stat line the probe script requests
/// (`%s %Y %a %u %g %i %h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatFields {
	pub size: u64,
	/// Modification time, seconds since the epoch.
	pub mtime: i64,
	/// Permission bits.
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub inode: u64,
	pub nlink: u64,
}

impl StatFields {
	/// Parses a raw stat line; `None` when the remote `stat` printed something else.
	pub fn parse(raw: &str) -> Option<Self> {
		let mut fields = raw.split_whitespace();
		let stat = Self {
			size: fields.next()?.parse().ok()?,
			mtime: fields.next()?.parse().ok()?,
			mode: u32::from_str_radix(fields.next()?, 8).ok()?,
			uid: fields.next()?.parse().ok()?,
			gid: fields.next()?.parse().ok()?,
			inode: fields.next()?.parse().ok()?,
			nlink: fields.next()?.parse().ok()?,
		};
		fields.next().is_none().then_some(stat)
	}
}

/// Everything one probe learned about one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataRecord {
	pub path: PathBuf,
	#[serde(flatten)]
	pub flags: AttributeFlags,
	/// Canonical path, present for existing paths.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub truename: Option<PathBuf>,
	/// Raw stat line, present for existing paths.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stat: Option<String>,
	/// Full content, present only for readable regular files.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Vec<u8>>,
}

impl FileMetadataRecord {
	pub fn missing(path: PathBuf) -> Self {
		Self {
			path,
			flags: AttributeFlags::default(),
			truename: None,
			stat: None,
			content: None,
		}
	}

	pub fn stat_fields(&self) -> Option<StatFields> {
		self.stat.as_deref().and_then(StatFields::parse)
	}
}
