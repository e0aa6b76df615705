#![forbid(unsafe_code)]

//! Pure core of the taskdeck console: snapshot model, view state, interval
//! policy and rendering. No I/O happens in this crate.

pub mod command;
pub mod error;
pub mod export;
pub mod filter;
pub mod gate;
pub mod interval;
pub mod model;
pub mod render;
pub mod time;
pub mod view_state;

pub use command::*;
pub use error::*;
pub use export::*;
pub use filter::*;
pub use gate::*;
pub use interval::*;
pub use model::*;
pub use render::*;
pub use time::*;
pub use view_state::*;
