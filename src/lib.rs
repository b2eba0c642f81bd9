#![allow(async_fn_in_trait)]
pub mod assets;
pub mod catalog;
pub mod client;
pub mod download_plan;
pub mod error;
pub mod landcovernet;
pub mod s3;
pub mod selection;
