//! Wire format of the vMix TCP API
//!
//! This module implements the line-oriented protocol spoken on port 8099:
//! command serialization, stream framing (including the length-prefixed
//! `XML` sub-protocol) and tally summaries.

pub mod command;
pub mod framing;
pub mod tally;

pub use command::{Command, FunctionCommand, IntoCommands};
pub use framing::{Frame, VmixCodec};
pub use tally::{summarize, TallyError, TallyState, TallySummary};

/// Line terminator used in both directions
pub const LINE_TERMINATOR: &str = "\r\n";

/// Byte length of [`LINE_TERMINATOR`]
pub const LINE_TERMINATOR_LEN: usize = 2;

/// Status token marking an error response
pub const STATUS_ERROR: &str = "ER";

/// Message type of the length-prefixed XML response
pub const XML_MESSAGE_TYPE: &str = "XML";

/// Largest `XML` payload accepted; longer declared lengths are framed as a line
pub const MAX_XML_LENGTH: usize = 64 * 1024 * 1024;

/// Prefix stripped from tally lines before summarizing
pub const TALLY_PREFIX: &str = "TALLY OK ";

/// Command sent on shutdown so the endpoint closes its side
pub const QUIT_COMMAND: &str = "QUIT";
