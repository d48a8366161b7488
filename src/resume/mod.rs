pub mod builder;
pub mod document;
pub mod generator;
pub mod output;
