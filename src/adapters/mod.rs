pub mod api;
pub mod db;
pub mod weatherxm_http;
