// ABOUTME: Shared configuration vocabulary for Omnya services
// ABOUTME: Exposes environment variable names and their default values

pub mod constants;

pub use constants::defaults;
