pub mod blocking;
pub mod command_dispatcher;
mod command_error;
pub mod command_item;
pub mod command_registry;
pub mod signature;

mod connection;
mod hashes;
mod hyperloglog;
mod keys;
mod lists;
mod pub_sub;
pub mod scripting;
mod server_admin;
mod sets;
mod sorted_sets;
mod strings;
mod transactions;

pub use command_error::CommandError;
