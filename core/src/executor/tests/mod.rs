//! Tests for the feature-set executor
//!
//! Organized by statement family

mod helpers;

mod control_tests;
