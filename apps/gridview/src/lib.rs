pub mod config;
pub mod model;
pub mod pane;
pub mod protocol;
pub mod remote;
pub mod stream;
pub mod sync;
pub mod telemetry;
pub mod view;
