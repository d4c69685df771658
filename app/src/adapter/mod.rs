pub mod backend;
pub mod control_panel;
