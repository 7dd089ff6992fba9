//! Wire text for shellmux.
//!
//! Everything in this crate is pure: it renders the text written to a remote
//! shell and decodes the bytes that come back, without doing any I/O.
//!
//! - [`Frame`]: wraps a command with a cd prefix, optional piped input, stderr
//!   redirection and the completion marker
//! - [`find_completion`]: locates a command's result in accumulated output
//! - [`ProbeScript`]: builds and parses the batch attribute probe
//! - [`Markers`]: the in-band tokens shared by all of the above

pub mod error;
pub mod frame;
pub mod markers;
pub mod probe;
pub mod quote;
pub mod record;
pub mod scan;

pub use error::{ProtocolError, Result};
pub use frame::{Frame, stderr_cleanup};
pub use markers::Markers;
pub use probe::{ProbeScript, STAT_FORMAT, parse_probe_output};
pub use quote::{join_args, quote_arg, quote_path};
pub use record::{AttributeFlags, FileMetadataRecord, StatFields};
pub use scan::{Completion, find_completion};
