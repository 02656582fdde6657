pub mod table;
pub mod ttt;

pub use table::{TravelTimeTable, NO_TIME};
pub use ttt::{PhaseRange, TravelTimeSet, MAX_TRAV};
