//! Rollcall - authentication and session core for a school attendance system
//!
//! This library provides login, logout, session lifecycle and role-based
//! access checks, served over HTTP with session cookies.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
