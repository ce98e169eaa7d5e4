pub mod data;
pub mod errors;
pub mod evaluation;
pub mod matching;
pub mod models;
pub mod utils;
