mod controller;

pub use controller::{AttemptController, Tick};
