mod instance;
pub mod runner;
