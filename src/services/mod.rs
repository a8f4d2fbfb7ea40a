pub mod ai;
pub mod booking;
pub mod calendar;
pub mod conversation;
pub mod dates;
pub mod nlu;
pub mod schedule;
pub mod session;
