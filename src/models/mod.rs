pub mod account;
pub mod event;
pub mod proxy;

pub use account::*;
pub use event::*;
pub use proxy::*;
