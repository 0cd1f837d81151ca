mod publish;
mod subscribe;
mod unsubscribe;

pub use publish::publish;
pub use subscribe::{psubscribe, subscribe};
pub use unsubscribe::{punsubscribe, unsubscribe};
