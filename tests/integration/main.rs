// Integration tests over real project trees in temporary directories
mod build_tests;
mod config_tests;
mod fixtures;
