pub mod click;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod interval;
pub mod script;
pub mod session;

pub use click::{ClickExecutor, CommandClicker, LogClicker, ScrollDirection};
pub use config::{AppConfig, ScrollConfig, TierConfig};
pub use error::{Error, Result};
pub use event::{Button, EventKind, PointerEvent};
pub use session::{Coordinator, Signal};
