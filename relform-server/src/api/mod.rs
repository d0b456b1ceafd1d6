//! HTTP handlers for relform-server

pub mod buildinfo;
pub mod health;
pub mod submission;
pub mod ui;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use submission::submission_routes;
pub use ui::serve_style_css;
