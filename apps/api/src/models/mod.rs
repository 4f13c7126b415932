pub mod rows;
pub mod webhook;
