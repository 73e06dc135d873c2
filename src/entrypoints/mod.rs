pub(crate) mod launchsd;

pub use launchsd::run_launchsd;
