#[macro_use]
pub mod macros;

pub mod api;
pub mod chrono_util;
pub mod config;
pub mod cookie_store;
pub mod data_collector;
pub mod record_page;
pub mod report;
pub mod reporter;
pub mod schema;
pub mod style;
pub mod uid_map;
