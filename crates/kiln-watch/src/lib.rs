//! Watch-and-rebuild loop for kiln.
//!
//! [`RebuildTrigger`] owns an [`EventSource`], filters changes through an
//! [`IgnorePolicy`], maps them to a [`Target`] with a [`HandlerIndex`] and
//! re-runs a caller-supplied pipeline once changes have been quiet for the
//! debounce window. A newer batch cancels the running pipeline through its
//! [`RebuildContext::cancel`] token.

pub mod error;
pub mod event;
pub mod filter;
pub mod source;
pub mod target;
pub mod trigger;

pub use error::{PipelineError, WatchError};
pub use event::{WatchEvent, WatchOp};
pub use filter::IgnorePolicy;
pub use source::{EventSource, NotifySource};
pub use target::{HandlerIndex, Target};
pub use trigger::{DEFAULT_DEBOUNCE, RebuildContext, RebuildTrigger};
