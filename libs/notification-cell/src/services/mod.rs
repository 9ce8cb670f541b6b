pub mod calendar;
pub mod email;
pub mod notification;
