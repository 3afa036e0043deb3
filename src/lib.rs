pub mod api;
pub mod board;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod logging;
pub mod race;
pub mod store;
pub mod time;
