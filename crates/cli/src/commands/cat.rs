use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;
use shellmux::{CachedFileReader, FileReader};

use super::Context;
use crate::error::Result;
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatData {
	pub location: String,
	pub bytes: usize,
	/// Content decoded as UTF-8, lossily.
	pub content: String,
	#[serde(skip)]
	pub raw: Vec<u8>,
}

impl TextOutput for CatData {
	fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
		out.write_all(&self.raw)
	}
}

pub(super) async fn execute(ctx: &Context, location: &str) -> Result<CatData> {
	let raw = if ctx.accelerate {
		CachedFileReader::new(
			Arc::clone(&ctx.baseline),
			Arc::clone(ctx.accelerator.cache()),
			Arc::clone(&ctx.resolver),
		)
		.with_prefetch(ctx.files())
		.read(location)
		.await?
	} else {
		ctx.baseline.read(location).await?
	};

	Ok(CatData {
		location: location.to_string(),
		bytes: raw.len(),
		content: String::from_utf8_lossy(&raw).into_owned(),
		raw,
	})
}
