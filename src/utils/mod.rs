// Utility modules for common functionality
pub mod constants;
pub mod logger;
pub mod random;
