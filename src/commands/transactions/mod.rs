mod discard;
mod exec;
mod multi;
mod watch;

pub use discard::discard;
pub use exec::exec;
pub use multi::multi;
pub use watch::{unwatch, watch};
