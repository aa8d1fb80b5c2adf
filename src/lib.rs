#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod commands;
pub mod error;
pub mod mock;
pub mod service;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
