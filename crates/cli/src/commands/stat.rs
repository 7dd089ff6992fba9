use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;
use shellmux::{AttributeFlags, FileMetadataRecord, HostIdentity, RemotePath, StatFields};

use super::Context;
use crate::error::{CliError, Result};
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEntry {
	pub location: String,
	#[serde(flatten)]
	pub flags: AttributeFlags,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub truename: Option<PathBuf>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stat: Option<StatFields>,
	/// Bytes of content loaded into the cache.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content_bytes: Option<usize>,
}

impl StatEntry {
	fn from_record(host: &HostIdentity, record: &FileMetadataRecord) -> Self {
		Self {
			location: RemotePath::new(host.clone(), &record.path).to_string(),
			flags: record.flags,
			truename: record.truename.clone(),
			stat: record.stat_fields(),
			content_bytes: record.content.as_ref().map(Vec::len),
		}
	}

	/// `ls`-style type and access letters, `-` where a test failed.
	fn mode_string(&self) -> String {
		let f = &self.flags;
		let kind = if !f.exists {
			'?'
		} else if f.symlink {
			'l'
		} else if f.directory {
			'd'
		} else if f.regular {
			'f'
		} else {
			'o'
		};
		let r = if f.readable { 'r' } else { '-' };
		let w = if f.writable { 'w' } else { '-' };
		format!("{kind}{r}{w}")
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatData {
	pub entries: Vec<StatEntry>,
}

impl TextOutput for StatData {
	fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
		for entry in &self.entries {
			let size = entry
				.stat
				.map_or_else(|| "-".to_string(), |stat| stat.size.to_string());
			writeln!(out, "{} {:>10} {}", entry.mode_string(), size, entry.location)?;
		}
		Ok(())
	}
}

/// Groups locations by host, keeping first-seen host order and path order.
pub(super) fn group_by_host(remotes: Vec<RemotePath>) -> Vec<(HostIdentity, Vec<PathBuf>)> {
	let mut groups: Vec<(HostIdentity, Vec<PathBuf>)> = Vec::new();
	for remote in remotes {
		match groups.iter_mut().find(|(host, _)| *host == remote.host) {
			Some((_, paths)) => paths.push(remote.path),
			None => groups.push((remote.host, vec![remote.path])),
		}
	}
	groups
}

pub(super) async fn execute(ctx: &Context, locations: &[String]) -> Result<StatData> {
	if !ctx.accelerate {
		return Err(CliError::InvalidInput("stat needs the session pool; drop --no-accel".into()));
	}

	let remotes = locations
		.iter()
		.map(|location| ctx.remote(location))
		.collect::<Result<Vec<_>>>()?;

	let files = ctx.files();
	let mut entries = Vec::with_capacity(remotes.len());
	for (host, paths) in group_by_host(remotes) {
		let records = files.prefetch(&host, &paths).await?;
		entries.extend(records.iter().map(|record| StatEntry::from_record(&host, record)));
	}
	Ok(StatData { entries })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn groups_keep_host_and_path_order() {
		let a = HostIdentity::new("a");
		let b = HostIdentity::new("b");
		let groups = group_by_host(vec![
			RemotePath::new(a.clone(), "/1"),
			RemotePath::new(b.clone(), "/2"),
			RemotePath::new(a.clone(), "/3"),
		]);
		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].0, a);
		assert_eq!(groups[0].1, [PathBuf::from("/1"), PathBuf::from("/3")]);
		assert_eq!(groups[1].0, b);
	}

	#[test]
	fn text_lines_show_kind_access_and_size() {
		let host = HostIdentity::new("h");
		let mut record = FileMetadataRecord::missing(PathBuf::from("/srv/a"));
		record.flags = AttributeFlags::parse("e f r w").unwrap();
		record.stat = Some("12 1700000000 644 0 0 1 1".into());
		record.content = Some(b"hello world\n".to_vec());
		let data = StatData {
			entries: vec![
				StatEntry::from_record(&host, &record),
				StatEntry::from_record(&host, &FileMetadataRecord::missing(PathBuf::from("/srv/b"))),
			],
		};

		let mut buf = Vec::new();
		data.write_text(&mut buf).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines[0], "frw         12 ssh://h/srv/a");
		assert_eq!(lines[1], "?--          - ssh://h/srv/b");
		assert_eq!(data.entries[0].content_bytes, Some(12));
	}
}
