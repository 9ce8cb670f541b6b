pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod outbox;
pub mod side_effects;
pub mod store;
