pub mod config;
pub mod hardware;
pub mod motor;
pub mod sequencer;
