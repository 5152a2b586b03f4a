// Business domains
pub mod automation;
