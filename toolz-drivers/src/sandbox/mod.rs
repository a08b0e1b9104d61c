pub mod driver;
pub mod launch;
