pub mod faa_api;
pub mod fixture;
pub mod notam_search;
