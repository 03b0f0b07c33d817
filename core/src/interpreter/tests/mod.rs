//! Tests for the interpreter
//!
//! Organized by feature area

mod helpers;

mod stdlib_tests;
