//! Virtualized, filterable tree view for large hierarchical data sets.
//!
//! The engine lives in [`tree`]: a node arena with traversal, a row
//! virtualizing [`tree::viewport::Viewport`], and the filter engine. The
//! remaining modules are the terminal front end built on ratatui.

pub mod app;
pub mod components;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod theme;
pub mod tree;
pub mod tui;
pub mod ui;
