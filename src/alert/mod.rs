//! Alert production and fan-out: per-source emitters, the cooldown filter,
//! and the always-attached `AlertManager` sink (spec §4.7–§4.9).

pub mod cooldown;
pub mod emitter;
pub mod manager;

pub use cooldown::Cooldown;
pub use emitter::VideoSourceAlertEmitter;
pub use manager::AlertManager;
