//! courier-net: the symmetric transport runtime
//!
//! Both roles of the protocol run the same machinery: a [`Connection`]
//! owning one read loop and one serialized writer per socket, a
//! [`Dispatcher`] routing inbound requests to registered handlers, and a
//! chunked file-transfer table with a directory-traversal guard. Servers
//! add a [`Listener`] accept loop on top.

pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod transfer;

pub use connection::Connection;
pub use dispatcher::Dispatcher;
pub use listener::Listener;
pub use transfer::resolve_within;
