pub mod app;
pub mod platform;
pub mod winit_event_adapter;
pub mod winit_event_source;
