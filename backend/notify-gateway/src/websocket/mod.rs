pub mod registry;
pub mod session;

pub use registry::{ClientSender, ConnectionRegistry};
pub use session::WsSession;
