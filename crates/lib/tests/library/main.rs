mod build_tests;
mod common;
mod graph_tests;
