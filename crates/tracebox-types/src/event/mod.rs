mod line;
mod raw;
mod trace;

pub use line::{
    CausedBy, ExceptionHeader, Frame, LineId, Navigable, SymbolQuery, TraceLine,
};
pub use raw::{ChannelTag, RawEvent};
pub use trace::TraceEvent;
