//! Batch attribute loading: one probe round trip fills the cache for many paths.

use std::path::PathBuf;
use std::sync::Arc;

use shellmux_protocol::{FileMetadataRecord, ProbeScript};
use shellmux_runtime::{Command, Session};
use tracing::{debug, warn};

use crate::cache::{CacheGateway, record_entries};
use crate::error::{Error, Result};
use crate::host::HostIdentity;

/// Runs probe scripts and writes their records into a [`CacheGateway`].
#[derive(Clone)]
pub struct BatchAttributeLoader {
	cache: Arc<dyn CacheGateway>,
}

impl BatchAttributeLoader {
	pub fn new(cache: Arc<dyn CacheGateway>) -> Self {
		Self { cache }
	}

	/// Probes `paths` over `session` and caches one record per path.
	///
	/// Paths inside the session's git directory are added to its tracked set
	/// so commands that rewrite repository state flush them.
	///
	/// # Errors
	///
	/// Returns `Error::AttributesUnavailable` when the probe exits non-zero and
	/// `Error::Protocol` when its output cannot be parsed. Nothing is cached in
	/// either case.
	pub async fn load(
		&self,
		host: &HostIdentity,
		session: &Session,
		paths: &[PathBuf],
	) -> Result<Vec<FileMetadataRecord>> {
		if paths.is_empty() {
			return Ok(Vec::new());
		}

		let layout = session.layout();
		let script = ProbeScript::build(paths, session.markers());
		let output = session
			.run(&Command::new(&layout.work_dir, script.text()))
			.await?;

		if !output.success() {
			warn!(
				target = "shellmux.loader",
				host = %host,
				session = session.id(),
				exit_code = output.exit_code,
				"probe failed"
			);
			return Err(Error::AttributesUnavailable {
				exit_code: output.exit_code,
			});
		}

		let records = script.parse(&output.stdout, session.markers())?;

		for record in &records {
			for (property, value) in record_entries(record) {
				self.cache.set(host, &record.path, property, value);
			}
		}

		session.track_paths(
			records
				.iter()
				.filter(|record| layout.is_internal(&record.path))
				.map(|record| record.path.clone()),
		);

		debug!(
			target = "shellmux.loader",
			host = %host,
			session = session.id(),
			paths = records.len(),
			bytes = output.stdout.len(),
			"probe loaded"
		);
		Ok(records)
	}
}
