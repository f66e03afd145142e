mod feed;
mod indicator;
mod source;

pub use feed::*;
pub use indicator::*;
pub use source::*;
