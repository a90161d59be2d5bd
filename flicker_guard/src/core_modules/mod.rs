pub mod alert_controller;
pub mod frame;
pub mod frame_source;
pub mod hysteresis;
pub mod metric_engine;
pub mod pixel;
