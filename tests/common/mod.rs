#![allow(unused)]

pub mod mocks;
pub mod setup;
