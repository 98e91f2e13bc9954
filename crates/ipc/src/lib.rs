mod event;
mod method;
mod protocol;
mod request;
mod source;

pub use event::{Event, WorkerKind};
pub use method::Method;
pub use protocol::{Response, RpcError, SessionDescriptor, codes};
pub use request::*;
pub use source::{Language, SourceFile};
