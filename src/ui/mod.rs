pub mod controls;
pub mod interactive;
