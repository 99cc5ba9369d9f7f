pub mod calendar;
pub mod notice;
pub mod profile;
pub mod settings;
pub mod task;
